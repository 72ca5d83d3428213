//! Typed webhook events.
//!
//! Parsing turns a delivery into one of these values completely before the
//! store is touched, so a malformed payload never leaves a half-applied
//! update behind. Every entity below is a partial view with its `id` set.

use crate::types::{Commit, Job, Organization, Owner, Release, Repository, User, Workflow, WorkflowRun};

/// A parsed delivery of an event type the watcher handles.
#[derive(Debug, Clone, PartialEq)]
pub enum GitHubEvent {
    WorkflowRun(WorkflowRunEvent),
    WorkflowJob(WorkflowJobEvent),
    /// Acknowledged and logged; the resulting run arrives as `workflow_run`.
    WorkflowDispatch(WorkflowDispatchEvent),
    Ping(PingEvent),
    Release(ReleaseEvent),
    MemberAdded(MemberAddedEvent),
}

impl GitHubEvent {
    /// The `X-GitHub-Event` name this event was delivered under.
    pub fn name(&self) -> &'static str {
        match self {
            GitHubEvent::WorkflowRun(_) => "workflow_run",
            GitHubEvent::WorkflowJob(_) => "workflow_job",
            GitHubEvent::WorkflowDispatch(_) => "workflow_dispatch",
            GitHubEvent::Ping(_) => "ping",
            GitHubEvent::Release(_) => "release",
            GitHubEvent::MemberAdded(_) => "organization",
        }
    }
}

/// The organization, owner and repository a delivery was sent for.
///
/// `repository.owner` is already set from `owner` when both are known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryContext {
    pub organization: Option<Organization>,
    pub owner: Option<Owner>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRunEvent {
    pub action: Option<String>,
    pub context: RepositoryContext,
    /// From the `workflow` object, or a stub from the run's `workflow_id`.
    pub workflow: Option<Workflow>,
    pub head_commit: Option<Commit>,
    /// The triggering user, for the flat users map.
    pub actor: Option<User>,
    pub run: WorkflowRun,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowJobEvent {
    pub action: Option<String>,
    pub context: RepositoryContext,
    /// `job.run_id` is always a value.
    pub job: Job,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowDispatchEvent {
    pub workflow: Option<String>,
    pub git_ref: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingEvent {
    pub hook_id: Option<u64>,
    pub zen: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseEvent {
    pub action: Option<String>,
    /// `context.repository` is always present.
    pub context: RepositoryContext,
    pub release: Release,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberAddedEvent {
    pub organization: Organization,
    pub user: User,
}
