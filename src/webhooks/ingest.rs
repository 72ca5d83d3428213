//! Applies verified webhook deliveries to the entity store.
//!
//! A delivery is verified, then parsed completely, then applied. Nothing is
//! written to the store unless the first two steps succeed.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::store::EntityStore;
use crate::types::{Owner, RepoId, Repository};

use super::events::{
    GitHubEvent, MemberAddedEvent, ReleaseEvent, RepositoryContext, WorkflowJobEvent,
    WorkflowRunEvent,
};
use super::parser::{ParseError, parse_webhook};
use super::signature::verify_signature;

/// Why a delivery was rejected.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed payload: {0}")]
    Parse(#[from] ParseError),
}

/// What happened to an accepted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// The store was updated.
    Applied,
    /// Recognized and logged, nothing to store.
    Acknowledged,
    /// An event type or action the watcher does not model.
    Ignored,
}

/// Verifies, parses and applies webhook deliveries.
#[derive(Debug, Clone)]
pub struct WebhookIngester {
    store: Arc<EntityStore>,
    config: watch::Receiver<Arc<Config>>,
}

impl WebhookIngester {
    pub fn new(store: Arc<EntityStore>, config: watch::Receiver<Arc<Config>>) -> Self {
        WebhookIngester { store, config }
    }

    /// Handles one delivery.
    ///
    /// The signature is checked against the secret of the current config
    /// snapshot, so a reloaded secret applies to the next delivery.
    pub fn handle(
        &self,
        event_type: &str,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Ingested, IngestError> {
        let signature = signature.ok_or(IngestError::MissingSignature)?;
        let secret = self.config.borrow().webhook_secret.clone();
        if !verify_signature(payload, signature, secret.as_bytes()) {
            return Err(IngestError::InvalidSignature);
        }

        let Some(event) = parse_webhook(event_type, payload)? else {
            debug!(event_type, "Ignoring unhandled webhook event");
            return Ok(Ingested::Ignored);
        };

        Ok(self.apply(event))
    }

    fn apply(&self, event: GitHubEvent) -> Ingested {
        match event {
            GitHubEvent::WorkflowRun(event) => {
                self.apply_workflow_run(event);
                Ingested::Applied
            }
            GitHubEvent::WorkflowJob(event) => {
                self.apply_workflow_job(event);
                Ingested::Applied
            }
            GitHubEvent::Release(event) => {
                self.apply_release(event);
                Ingested::Applied
            }
            GitHubEvent::MemberAdded(event) => {
                self.apply_member_added(event);
                Ingested::Applied
            }
            GitHubEvent::WorkflowDispatch(event) => {
                info!(
                    workflow = event.workflow.as_deref().unwrap_or_default(),
                    git_ref = event.git_ref.as_deref().unwrap_or_default(),
                    repository = event.repository.as_deref().unwrap_or_default(),
                    "Workflow dispatched"
                );
                Ingested::Acknowledged
            }
            GitHubEvent::Ping(event) => {
                info!(
                    hook_id = event.hook_id,
                    zen = event.zen.as_deref().unwrap_or_default(),
                    "Webhook ping"
                );
                Ingested::Acknowledged
            }
        }
    }

    /// Upserts organization, owner and repository, in that order.
    ///
    /// Returns the repository ID when the delivery named one.
    fn apply_context(&self, context: RepositoryContext) -> Option<RepoId> {
        if let Some(org) = context.organization {
            self.store.upsert_organization(org.id, org);
        }
        match context.owner {
            Some(Owner::Organization(org)) => self.store.upsert_organization(org.id, org),
            Some(Owner::User(user)) => self.store.upsert_user(user.id, user),
            None => {}
        }
        let repo = context.repository?;
        let repo_id = repo.id;
        self.store.upsert_repository(repo_id, repo);
        Some(repo_id)
    }

    fn apply_workflow_run(&self, event: WorkflowRunEvent) {
        let run_id = event.run.id;
        let repo_id = self.apply_context(event.context);

        if let Some(repo_id) = repo_id {
            if let Some(workflow) = event.workflow {
                self.store.upsert_workflow(repo_id, workflow.id, workflow);
            }
            if let Some(commit) = event.head_commit {
                let mut partial = Repository::stub(repo_id);
                partial.commits.insert(commit.sha.clone(), commit);
                self.store.upsert_repository(repo_id, partial);
            }
        } else if event.workflow.is_some() {
            warn!(run_id = %run_id, "Workflow reported without a repository, not stored");
        }

        if let Some(actor) = event.actor {
            self.store.upsert_user(actor.id, actor);
        }

        self.store.upsert_run(repo_id, run_id, event.run);
        debug!(
            run_id = %run_id,
            action = event.action.as_deref().unwrap_or_default(),
            "Applied workflow_run"
        );
    }

    fn apply_workflow_job(&self, event: WorkflowJobEvent) {
        self.apply_context(event.context);

        let job = event.job;
        let job_id = job.id;
        let Some(run_id) = job.run_id.value().copied() else {
            // The parser rejects jobs without a run.
            return;
        };
        self.store.upsert_job(run_id, job_id, job);
        debug!(
            job_id = %job_id,
            run_id = %run_id,
            action = event.action.as_deref().unwrap_or_default(),
            "Applied workflow_job"
        );
    }

    fn apply_release(&self, event: ReleaseEvent) {
        let Some(repo_id) = self.apply_context(event.context) else {
            return;
        };
        let tag = event.release.tag_name.clone();
        let mut partial = Repository::stub(repo_id);
        partial.releases.insert(tag.clone(), event.release);
        self.store.upsert_repository(repo_id, partial);
        info!(repo_id = %repo_id, tag = %tag, "Recorded release");
    }

    fn apply_member_added(&self, event: MemberAddedEvent) {
        let org_id = event.organization.id;
        let user_id = event.user.id;
        self.store.upsert_organization(org_id, event.organization);
        self.store.upsert_user(user_id, event.user);
        self.store.add_member(org_id, user_id);
        info!(org_id = %org_id, user_id = %user_id, "Recorded organization member");
    }
}
