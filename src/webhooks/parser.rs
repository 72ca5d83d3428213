//! Webhook payload parser.
//!
//! 1. The event type comes from the `X-GitHub-Event` header
//! 2. The payload is decoded into GitHub's shapes and converted to partial
//!    entities
//! 3. Unknown event types, and actions the watcher does not model, return
//!    `Ok(None)`
//! 4. Malformed payloads, or payloads missing an identifier the update needs,
//!    return `Err`

use serde::Deserialize;
use thiserror::Error;

use crate::github::payload::{
    AccountPayload, ReleasePayload, RepositoryPayload, WorkflowJobPayload, WorkflowPayload,
    WorkflowRunPayload,
};
use crate::types::{Field, Owner};

use super::events::{
    GitHubEvent, MemberAddedEvent, PingEvent, ReleaseEvent, RepositoryContext,
    WorkflowDispatchEvent, WorkflowJobEvent, WorkflowRunEvent,
};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required objects).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An identifier needed to place the update is missing.
    #[error("missing required field {0}")]
    MissingField(&'static str),
}

/// Parses a webhook payload into a typed event.
///
/// # Examples
///
/// ```
/// use ant_watcher::webhooks::parse_webhook;
///
/// let payload = br#"{
///     "action": "completed",
///     "workflow_run": {"id": 100, "run_number": 3, "status": "completed"}
/// }"#;
/// assert!(parse_webhook("workflow_run", payload).unwrap().is_some());
/// assert!(parse_webhook("star", b"{}").unwrap().is_none());
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<Option<GitHubEvent>, ParseError> {
    match event_type {
        "workflow_run" => parse_workflow_run(payload).map(|e| Some(GitHubEvent::WorkflowRun(e))),
        "workflow_job" => parse_workflow_job(payload).map(|e| Some(GitHubEvent::WorkflowJob(e))),
        "workflow_dispatch" => {
            parse_workflow_dispatch(payload).map(|e| Some(GitHubEvent::WorkflowDispatch(e)))
        }
        "ping" => parse_ping(payload).map(|e| Some(GitHubEvent::Ping(e))),
        "release" => parse_release(payload).map(|opt| opt.map(GitHubEvent::Release)),
        "organization" => parse_organization(payload).map(|opt| opt.map(GitHubEvent::MemberAdded)),
        _ => Ok(None),
    }
}

// ─── Shared context ──────────────────────────────────────────────────────────

/// Resolves the envelope's `organization` and `repository` objects.
///
/// The repository owner is an organization when GitHub says so, or when it is
/// the organization the delivery was sent for.
fn repository_context(
    repository: Option<&RepositoryPayload>,
    organization: Option<&AccountPayload>,
) -> RepositoryContext {
    let organization = organization
        .and_then(AccountPayload::to_organization)
        .map(|(_, org)| org);

    let owner = repository
        .and_then(|repo| repo.owner.as_ref())
        .and_then(|account| {
            let is_delivering_org = organization
                .as_ref()
                .is_some_and(|org| account.id == Some(org.id.0));
            if account.is_organization() || is_delivering_org {
                account.to_organization().map(|(_, org)| Owner::Organization(org))
            } else {
                account.to_user().map(|(_, user)| Owner::User(user))
            }
        });

    let repository = repository
        .and_then(|repo| repo.to_repository(owner.as_ref().map(Owner::id)))
        .map(|(_, repo)| repo);

    RepositoryContext {
        organization,
        owner,
        repository,
    }
}

// ─── workflow_run ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawWorkflowRunPayload {
    action: Option<String>,
    workflow_run: WorkflowRunPayload,
    workflow: Option<WorkflowPayload>,
    repository: Option<RepositoryPayload>,
    organization: Option<AccountPayload>,
}

fn parse_workflow_run(payload: &[u8]) -> Result<WorkflowRunEvent, ParseError> {
    let raw: RawWorkflowRunPayload = serde_json::from_slice(payload)?;
    let run_payload = &raw.workflow_run;

    let (_, run) = run_payload
        .to_run()
        .ok_or(ParseError::MissingField("workflow_run.id"))?;

    let repository = raw.repository.as_ref().or(run_payload.repository.as_ref());
    let context = repository_context(repository, raw.organization.as_ref());

    let workflow = raw
        .workflow
        .as_ref()
        .and_then(WorkflowPayload::to_workflow)
        .or_else(|| run_payload.to_workflow_stub())
        .map(|(_, workflow)| workflow);

    let head_commit = match &run_payload.head_commit {
        Field::Value(commit) => commit.to_commit(),
        Field::Null | Field::Absent => None,
    };
    let actor = match &run_payload.actor {
        Field::Value(actor) => actor.to_user().map(|(_, user)| user),
        Field::Null | Field::Absent => None,
    };

    Ok(WorkflowRunEvent {
        action: raw.action,
        context,
        workflow,
        head_commit,
        actor,
        run,
    })
}

// ─── workflow_job ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawWorkflowJobPayload {
    action: Option<String>,
    workflow_job: WorkflowJobPayload,
    repository: Option<RepositoryPayload>,
    organization: Option<AccountPayload>,
}

fn parse_workflow_job(payload: &[u8]) -> Result<WorkflowJobEvent, ParseError> {
    let raw: RawWorkflowJobPayload = serde_json::from_slice(payload)?;

    if raw.workflow_job.run_id.is_none() {
        return Err(ParseError::MissingField("workflow_job.run_id"));
    }
    let (_, job) = raw
        .workflow_job
        .to_job()
        .ok_or(ParseError::MissingField("workflow_job.id"))?;

    Ok(WorkflowJobEvent {
        action: raw.action,
        context: repository_context(raw.repository.as_ref(), raw.organization.as_ref()),
        job,
    })
}

// ─── workflow_dispatch / ping ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawWorkflowDispatchPayload {
    workflow: Option<String>,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    repository: Option<RepositoryPayload>,
}

fn parse_workflow_dispatch(payload: &[u8]) -> Result<WorkflowDispatchEvent, ParseError> {
    let raw: RawWorkflowDispatchPayload = serde_json::from_slice(payload)?;
    Ok(WorkflowDispatchEvent {
        workflow: raw.workflow,
        git_ref: raw.git_ref,
        repository: raw
            .repository
            .and_then(|repo| repo.full_name.into_value()),
    })
}

#[derive(Debug, Deserialize)]
struct RawPingPayload {
    zen: Option<String>,
    hook_id: Option<u64>,
}

fn parse_ping(payload: &[u8]) -> Result<PingEvent, ParseError> {
    let raw: RawPingPayload = serde_json::from_slice(payload)?;
    Ok(PingEvent {
        hook_id: raw.hook_id,
        zen: raw.zen,
    })
}

// ─── release ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawReleasePayload {
    action: Option<String>,
    release: ReleasePayload,
    repository: RepositoryPayload,
    organization: Option<AccountPayload>,
}

fn parse_release(payload: &[u8]) -> Result<Option<ReleaseEvent>, ParseError> {
    let raw: RawReleasePayload = serde_json::from_slice(payload)?;

    // A deleted release is not removed from the mirror.
    if raw.action.as_deref() == Some("deleted") {
        return Ok(None);
    }

    let release = raw
        .release
        .to_release()
        .ok_or(ParseError::MissingField("release.tag_name"))?;
    let context = repository_context(Some(&raw.repository), raw.organization.as_ref());
    if context.repository.is_none() {
        return Err(ParseError::MissingField("repository.id"));
    }

    Ok(Some(ReleaseEvent {
        action: raw.action,
        context,
        release,
    }))
}

// ─── organization ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawOrganizationPayload {
    action: String,
    membership: Option<RawMembership>,
    organization: AccountPayload,
}

#[derive(Debug, Deserialize)]
struct RawMembership {
    user: AccountPayload,
}

fn parse_organization(payload: &[u8]) -> Result<Option<MemberAddedEvent>, ParseError> {
    let raw: RawOrganizationPayload = serde_json::from_slice(payload)?;

    if raw.action != "member_added" {
        return Ok(None);
    }

    let (_, organization) = raw
        .organization
        .to_organization()
        .ok_or(ParseError::MissingField("organization.id"))?;
    let (_, user) = raw
        .membership
        .as_ref()
        .and_then(|membership| membership.user.to_user())
        .ok_or(ParseError::MissingField("membership.user.id"))?;

    Ok(Some(MemberAddedEvent { organization, user }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobId, OrgId, OwnerRef, RepoId, RunId, UserId, WorkflowId};
    use serde_json::json;

    fn bytes(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn minimal_workflow_run() {
        let payload = bytes(json!({
            "action": "completed",
            "workflow_run": {
                "id": 100,
                "run_number": 3,
                "status": "completed",
                "conclusion": "success"
            }
        }));

        let Some(GitHubEvent::WorkflowRun(event)) = parse_webhook("workflow_run", &payload).unwrap()
        else {
            panic!("expected a workflow_run event");
        };
        assert_eq!(event.run.id, RunId(100));
        assert_eq!(event.run.run_number, Field::Value(3));
        assert_eq!(event.context, RepositoryContext::default());
        assert!(event.workflow.is_none());
        assert!(event.head_commit.is_none());
    }

    #[test]
    fn full_workflow_run_resolves_context() {
        let payload = bytes(json!({
            "action": "requested",
            "workflow_run": {
                "id": 100,
                "workflow_id": 7,
                "path": ".github/workflows/ci.yml",
                "head_commit": {"id": "abc", "message": "Fix"},
                "actor": {"id": 42, "login": "octocat", "type": "User"}
            },
            "workflow": {"id": 7, "name": "CI", "path": ".github/workflows/ci.yml"},
            "repository": {
                "id": 1,
                "name": "widgets",
                "owner": {"id": 10, "login": "acme"}
            },
            "organization": {"id": 10, "login": "acme"}
        }));

        let Some(GitHubEvent::WorkflowRun(event)) = parse_webhook("workflow_run", &payload).unwrap()
        else {
            panic!("expected a workflow_run event");
        };
        let repo = event.context.repository.unwrap();
        assert_eq!(repo.id, RepoId(1));
        // Owner type missing, but it is the delivering organization.
        assert_eq!(repo.owner, Field::Value(OwnerRef::Organization(OrgId(10))));
        assert_eq!(event.workflow.unwrap().name, Field::Value("CI".into()));
        assert_eq!(event.head_commit.unwrap().sha, "abc");
        assert_eq!(event.actor.unwrap().id, UserId(42));
        assert_eq!(event.run.workflow_id, Field::Value(WorkflowId(7)));
    }

    #[test]
    fn user_owned_repository() {
        let payload = bytes(json!({
            "workflow_run": {"id": 1},
            "repository": {"id": 2, "owner": {"id": 3, "login": "mona", "type": "User"}}
        }));
        let Some(GitHubEvent::WorkflowRun(event)) = parse_webhook("workflow_run", &payload).unwrap()
        else {
            panic!("expected a workflow_run event");
        };
        assert!(matches!(event.context.owner, Some(Owner::User(_))));
        assert_eq!(
            event.context.repository.unwrap().owner,
            Field::Value(OwnerRef::User(UserId(3)))
        );
    }

    #[test]
    fn workflow_run_requires_an_id() {
        let payload = bytes(json!({"workflow_run": {"status": "queued"}}));
        assert!(matches!(
            parse_webhook("workflow_run", &payload),
            Err(ParseError::MissingField("workflow_run.id"))
        ));
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(
            parse_webhook("workflow_run", b"not json"),
            Err(ParseError::JsonError(_))
        ));
        assert!(matches!(
            parse_webhook("workflow_run", b"{}"),
            Err(ParseError::JsonError(_))
        ));
        assert!(matches!(
            parse_webhook("workflow_job", br#"{"workflow_job": {"id": "seven"}}"#),
            Err(ParseError::JsonError(_))
        ));
    }

    #[test]
    fn workflow_job_requires_run_id() {
        let payload = bytes(json!({"workflow_job": {"id": 7}}));
        assert!(matches!(
            parse_webhook("workflow_job", &payload),
            Err(ParseError::MissingField("workflow_job.run_id"))
        ));
    }

    #[test]
    fn workflow_job_event() {
        let payload = bytes(json!({
            "action": "in_progress",
            "workflow_job": {"id": 7, "run_id": 100, "runner_name": "runner-1"}
        }));
        let Some(GitHubEvent::WorkflowJob(event)) = parse_webhook("workflow_job", &payload).unwrap()
        else {
            panic!("expected a workflow_job event");
        };
        assert_eq!(event.job.id, JobId(7));
        assert_eq!(event.job.run_id, Field::Value(RunId(100)));
        assert_eq!(event.job.runner_name, Field::Value("runner-1".into()));
    }

    #[test]
    fn acknowledged_events() {
        let ping = parse_webhook("ping", br#"{"zen": "Keep it simple.", "hook_id": 9}"#).unwrap();
        assert_eq!(
            ping,
            Some(GitHubEvent::Ping(PingEvent {
                hook_id: Some(9),
                zen: Some("Keep it simple.".into())
            }))
        );

        let dispatch = parse_webhook(
            "workflow_dispatch",
            br#"{"ref": "refs/heads/main", "workflow": ".github/workflows/ci.yml"}"#,
        )
        .unwrap();
        assert!(matches!(dispatch, Some(GitHubEvent::WorkflowDispatch(_))));
    }

    #[test]
    fn release_event() {
        let payload = bytes(json!({
            "action": "published",
            "release": {"tag_name": "v1.2.0", "published_at": "2024-05-02T10:00:00Z"},
            "repository": {"id": 1, "owner": {"id": 10, "type": "Organization"}}
        }));
        let Some(GitHubEvent::Release(event)) = parse_webhook("release", &payload).unwrap() else {
            panic!("expected a release event");
        };
        assert_eq!(event.release.tag_name, "v1.2.0");
        assert!(event.context.repository.is_some());

        let deleted = bytes(json!({
            "action": "deleted",
            "release": {"tag_name": "v1.2.0"},
            "repository": {"id": 1}
        }));
        assert!(parse_webhook("release", &deleted).unwrap().is_none());
    }

    #[test]
    fn organization_member_added_only() {
        let added = bytes(json!({
            "action": "member_added",
            "membership": {"user": {"id": 42, "login": "octocat"}},
            "organization": {"id": 10, "login": "acme"}
        }));
        let Some(GitHubEvent::MemberAdded(event)) = parse_webhook("organization", &added).unwrap()
        else {
            panic!("expected member_added");
        };
        assert_eq!(event.organization.id, OrgId(10));
        assert_eq!(event.user.id, UserId(42));

        let renamed = bytes(json!({"action": "renamed", "organization": {"id": 10}}));
        assert!(parse_webhook("organization", &renamed).unwrap().is_none());
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert!(parse_webhook("check_suite", b"{}").unwrap().is_none());
        assert!(parse_webhook("push", b"not even json").unwrap().is_none());
    }
}
