//! Backfill: bulk catch-up from the REST API.
//!
//! A pass walks every repository of the configured organization and every
//! workflow run created inside the history window, upserting them as partial
//! views. Webhooks fill in the rest as they arrive; the two sources may
//! interleave in any order.
//!
//! A pass is not transactional. When a page fails the walk stops and reports
//! the error, and whatever was upserted before the failure stays. The next
//! scheduled pass starts again from the first page.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::github::payload::RepositoryPayload;
use crate::github::{ActionsProvider, ListPage, OctocrabClient};
use crate::store::EntityStore;
use crate::types::{Field, OwnerRef, RepoId, Repository};

/// Errors that end a backfill pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to {stage}: {source}")]
    Provider {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("backfill cancelled")]
    Cancelled,
}

/// What a completed pass stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub repository_pages: usize,
    pub repositories: usize,
    pub runs: usize,
}

/// Awaits `future` unless `cancel` fires first.
async fn unless_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, SyncError> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        output = future => Ok(output),
    }
}

fn advance(current: u32, next: Option<u32>) -> Option<u32> {
    next.filter(|&next| next > current)
}

/// Runs one backfill pass over `org`, storing runs created at or after `since`.
#[instrument(skip(store, provider, since, cancel), fields(since = %since))]
pub async fn sync_organization<P: ActionsProvider>(
    store: &EntityStore,
    provider: &P,
    org: &str,
    since: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();
    let mut page = 1;

    loop {
        let listing: ListPage<RepositoryPayload> =
            unless_cancelled(cancel, provider.list_repositories(org, page))
                .await?
                .map_err(|e| SyncError::Provider {
                    stage: format!("list repositories of {org} (page {page})"),
                    source: Box::new(e),
                })?;
        report.repository_pages += 1;
        debug!(page, count = listing.items.len(), "Fetched repository page");

        for payload in &listing.items {
            let Some((repo_id, name)) = store_repository(store, payload) else {
                warn!(page, "Skipping repository without id or name");
                continue;
            };
            report.repositories += 1;

            let owner = payload.owner_login().unwrap_or(org);
            report.runs += sync_repository_runs(store, provider, repo_id, owner, name, since, cancel).await?;
        }

        match advance(page, listing.next_page) {
            Some(next) => page = next,
            None => break,
        }
    }

    info!(
        repositories = report.repositories,
        runs = report.runs,
        "Backfill pass complete"
    );
    Ok(report)
}

/// Upserts a listed repository, owned by the organization it was listed under.
fn store_repository<'a>(
    store: &EntityStore,
    payload: &'a RepositoryPayload,
) -> Option<(RepoId, &'a str)> {
    let name = payload.name.value()?.as_str();

    let owner = payload.owner.as_ref().and_then(|owner| {
        let (org_id, org) = owner.to_organization()?;
        store.upsert_organization(org_id, org);
        Some(OwnerRef::Organization(org_id))
    });
    let (repo_id, repo) = payload.to_repository(owner)?;
    store.upsert_repository(repo_id, repo);
    Some((repo_id, name))
}

async fn sync_repository_runs<P: ActionsProvider>(
    store: &EntityStore,
    provider: &P,
    repo_id: RepoId,
    owner: &str,
    repo: &str,
    since: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<usize, SyncError> {
    let mut stored = 0;
    let mut page = 1;

    loop {
        let listing = unless_cancelled(cancel, provider.list_workflow_runs(owner, repo, since, page))
            .await?
            .map_err(|e| SyncError::Provider {
                stage: format!("list workflow runs of {owner}/{repo} (page {page})"),
                source: Box::new(e),
            })?;

        for payload in &listing.items {
            let Some((run_id, run)) = payload.to_run() else {
                warn!(repo_id = %repo_id, "Skipping workflow run without id");
                continue;
            };
            if let Some((workflow_id, workflow)) = payload.to_workflow_stub() {
                store.upsert_workflow(repo_id, workflow_id, workflow);
            }
            if let Field::Value(commit) = payload.head_commit.as_ref()
                && let Some(commit) = commit.to_commit()
            {
                let mut partial = Repository::stub(repo_id);
                partial.commits.insert(commit.sha.clone(), commit);
                store.upsert_repository(repo_id, partial);
            }
            if let Field::Value(actor) = payload.actor.as_ref()
                && let Some((user_id, user)) = actor.to_user()
            {
                store.upsert_user(user_id, user);
            }
            store.upsert_run(Some(repo_id), run_id, run);
            stored += 1;
        }

        match advance(page, listing.next_page) {
            Some(next) => page = next,
            None => return Ok(stored),
        }
    }
}

/// Runs a backfill pass now and then every `sync_interval` until cancelled.
///
/// Each pass reads the latest config snapshot, so a reloaded token, window or
/// interval applies from the next pass on. Passes are skipped while the API
/// is disabled, no token is configured or no organization is named.
pub async fn run_backfill_loop(
    store: Arc<EntityStore>,
    config: watch::Receiver<Arc<Config>>,
    cancel: CancellationToken,
) {
    info!("Backfill loop started");
    loop {
        let snapshot = config.borrow().clone();

        if snapshot.backfill_enabled() {
            match run_pass(&store, &snapshot, &cancel).await {
                Ok(_) => {}
                Err(SyncError::Cancelled) => break,
                Err(e) => error!(error = %e, "Backfill pass failed"),
            }
        } else {
            debug!("Backfill disabled, skipping pass");
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(snapshot.sync_interval) => {}
        }
    }
    info!("Backfill loop stopped");
}

async fn run_pass(
    store: &EntityStore,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError> {
    let client = OctocrabClient::from_token(config.github_token.as_str(), &config.github_api_url)
        .map_err(|e| SyncError::Provider {
            stage: "build GitHub client".to_string(),
            source: Box::new(e),
        })?;
    let since = history_start(Utc::now(), config.fetch_history);
    sync_organization(store, &client, &config.organization, since, cancel).await
}

/// The oldest creation time a pass starting at `now` looks at.
fn history_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::payload::WorkflowRunPayload;
    use crate::types::{OrgId, RunId, UserId, WorkflowId};
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Error)]
    #[error("provider failed on page {0}")]
    struct FakeError(u32);

    /// Serves canned pages and records every call.
    #[derive(Default)]
    struct FakeProvider {
        repo_pages: HashMap<u32, ListPage<RepositoryPayload>>,
        failing_repo_page: Option<u32>,
        /// Single-page run listings, by repository name.
        runs: HashMap<String, Vec<WorkflowRunPayload>>,
        run_pages: HashMap<(String, u32), ListPage<WorkflowRunPayload>>,
        failing_run_page: Option<(String, u32)>,
        hang: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn repo_calls(&self) -> usize {
            self.calls().iter().filter(|c| c.starts_with("repos")).count()
        }
    }

    impl ActionsProvider for FakeProvider {
        type Error = FakeError;

        fn list_repositories(
            &self,
            org: &str,
            page: u32,
        ) -> impl Future<Output = Result<ListPage<RepositoryPayload>, Self::Error>> + Send {
            self.calls.lock().unwrap().push(format!("repos {org} {page}"));
            async move {
                if self.hang {
                    std::future::pending::<()>().await;
                }
                if self.failing_repo_page == Some(page) {
                    return Err(FakeError(page));
                }
                Ok(self
                    .repo_pages
                    .get(&page)
                    .cloned()
                    .unwrap_or_else(|| ListPage::last(Vec::new())))
            }
        }

        fn list_workflow_runs(
            &self,
            owner: &str,
            repo: &str,
            _since: DateTime<Utc>,
            page: u32,
        ) -> impl Future<Output = Result<ListPage<WorkflowRunPayload>, Self::Error>> + Send {
            self.calls
                .lock()
                .unwrap()
                .push(format!("runs {owner}/{repo} {page}"));
            let key = (repo.to_string(), page);
            let result = if self.failing_run_page.as_ref() == Some(&key) {
                Err(FakeError(page))
            } else if let Some(listing) = self.run_pages.get(&key) {
                Ok(listing.clone())
            } else if page == 1 {
                Ok(ListPage::last(self.runs.get(repo).cloned().unwrap_or_default()))
            } else {
                Ok(ListPage::last(Vec::new()))
            };
            async move { result }
        }
    }

    fn repo(id: u64) -> RepositoryPayload {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("repo{id}"),
            "full_name": format!("acme/repo{id}"),
            "owner": {"id": 10, "login": "acme", "type": "Organization"}
        }))
        .unwrap()
    }

    fn page(ids: &[u64], next_page: Option<u32>) -> ListPage<RepositoryPayload> {
        ListPage {
            items: ids.iter().copied().map(repo).collect(),
            next_page,
        }
    }

    fn run(id: u64) -> WorkflowRunPayload {
        serde_json::from_value(json!({"id": id, "workflow_id": 7, "status": "completed"})).unwrap()
    }

    fn run_page(ids: &[u64], next_page: Option<u32>) -> ListPage<WorkflowRunPayload> {
        ListPage {
            items: ids.iter().copied().map(run).collect(),
            next_page,
        }
    }

    /// Repositories 1 and 2 on one page; repo1 has three pages of runs.
    fn paged_runs() -> FakeProvider {
        FakeProvider {
            repo_pages: HashMap::from([(1, page(&[1, 2], None))]),
            run_pages: HashMap::from([
                (("repo1".to_string(), 1), run_page(&[101, 102], Some(2))),
                (("repo1".to_string(), 2), run_page(&[103], Some(3))),
                (("repo1".to_string(), 3), run_page(&[104], None)),
            ]),
            runs: HashMap::from([("repo2".to_string(), vec![run(201)])]),
            ..Default::default()
        }
    }

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn three_pages() -> FakeProvider {
        FakeProvider {
            repo_pages: HashMap::from([
                (1, page(&[1, 2], Some(2))),
                (2, page(&[3, 4], Some(3))),
                (3, page(&[5], None)),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pagination_stops_when_no_next_page() {
        let store = EntityStore::new();
        let provider = three_pages();

        let report = sync_organization(&store, &provider, "acme", since(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.repo_calls(), 3);
        assert_eq!(report.repository_pages, 3);
        assert_eq!(report.repositories, 5);
        let org = store.get_organization(OrgId(10)).unwrap();
        assert_eq!(org.repositories.len(), 5);
        assert_eq!(org.login, Field::Value("acme".into()));
    }

    #[tokio::test]
    async fn zero_next_page_ends_the_walk() {
        let store = EntityStore::new();
        let provider = FakeProvider {
            repo_pages: HashMap::from([(1, page(&[1], Some(0)))]),
            ..Default::default()
        };

        sync_organization(&store, &provider, "acme", since(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.repo_calls(), 1);
    }

    #[tokio::test]
    async fn failed_page_aborts_but_keeps_earlier_pages() {
        let store = EntityStore::new();
        let provider = FakeProvider {
            failing_repo_page: Some(2),
            ..three_pages()
        };

        let result =
            sync_organization(&store, &provider, "acme", since(), &CancellationToken::new()).await;

        assert!(matches!(result, Err(SyncError::Provider { .. })));
        assert_eq!(provider.repo_calls(), 2);
        assert!(!provider.calls().contains(&"repos acme 3".to_string()));
        assert!(store.get_repository(RepoId(1)).is_some());
        assert!(store.get_repository(RepoId(2)).is_some());
        assert!(store.get_repository(RepoId(3)).is_none());
    }

    #[tokio::test]
    async fn cancellation_is_reported_distinctly() {
        let store = EntityStore::new();
        let provider = FakeProvider {
            hang: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            sync_organization(&store, &provider, "acme", since(), &cancel),
        )
        .await
        .expect("sync should stop promptly");

        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn runs_are_placed_under_repository_and_workflow() {
        let store = EntityStore::new();
        let run: WorkflowRunPayload = serde_json::from_value(json!({
            "id": 100,
            "workflow_id": 7,
            "path": ".github/workflows/ci.yml",
            "run_number": 3,
            "status": "queued",
            "head_commit": {"id": "abc", "message": "Fix"},
            "actor": {"id": 42, "login": "octocat"}
        }))
        .unwrap();
        let provider = FakeProvider {
            repo_pages: HashMap::from([(1, page(&[1], None))]),
            runs: HashMap::from([("repo1".to_string(), vec![run])]),
            ..Default::default()
        };

        let report = sync_organization(&store, &provider, "acme", since(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.runs, 1);
        assert!(provider.calls().contains(&"runs acme/repo1 1".to_string()));
        let repo = store.get_repository(RepoId(1)).unwrap();
        let workflow = &repo.workflows[&WorkflowId(7)];
        assert_eq!(workflow.path, Field::Value(".github/workflows/ci.yml".into()));
        assert_eq!(workflow.runs[&RunId(100)].status, Field::Value("queued".into()));
        assert!(repo.commits.contains_key("abc"));
        assert!(store.get_user(UserId(42)).is_some());
    }

    #[tokio::test]
    async fn run_pages_are_walked_until_no_next_page() {
        let store = EntityStore::new();
        let provider = paged_runs();

        let report = sync_organization(&store, &provider, "acme", since(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            provider.calls(),
            vec![
                "repos acme 1",
                "runs acme/repo1 1",
                "runs acme/repo1 2",
                "runs acme/repo1 3",
                "runs acme/repo2 1",
            ]
        );
        assert_eq!(report.runs, 5);
        let runs: Vec<_> = store.all_runs().into_keys().collect();
        assert_eq!(
            runs,
            vec![RunId(101), RunId(102), RunId(103), RunId(104), RunId(201)]
        );
    }

    #[tokio::test]
    async fn failed_run_page_aborts_remaining_repositories() {
        let store = EntityStore::new();
        let provider = FakeProvider {
            failing_run_page: Some(("repo1".to_string(), 2)),
            ..paged_runs()
        };

        let result =
            sync_organization(&store, &provider, "acme", since(), &CancellationToken::new()).await;

        let Err(SyncError::Provider { stage, .. }) = result else {
            panic!("expected a provider error, got {result:?}");
        };
        assert_eq!(stage, "list workflow runs of acme/repo1 (page 2)");
        assert_eq!(
            provider.calls(),
            vec!["repos acme 1", "runs acme/repo1 1", "runs acme/repo1 2"]
        );
        // Page 1 of repo1 stays; repo2 is never reached.
        assert!(store.get_run(RunId(101)).is_some());
        assert!(store.get_run(RunId(102)).is_some());
        assert!(store.get_run(RunId(103)).is_none());
        assert!(store.get_repository(RepoId(2)).is_none());
        assert!(store.get_run(RunId(201)).is_none());
    }

    #[test]
    fn history_start_subtracts_window() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            history_start(now, Duration::from_secs(15 * 60)),
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 45, 0).unwrap()
        );
        assert_eq!(history_start(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
