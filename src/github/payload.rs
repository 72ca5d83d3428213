//! GitHub's JSON shapes, shared by the REST listing and webhook payloads.
//!
//! These mirror the subset of GitHub's objects the watcher keeps. Attributes
//! are [`Field`]s so that a key GitHub left out stays `Absent` all the way
//! into the merge. Identifiers are `Option`s: an object without an `id`
//! cannot be placed and is rejected by the caller.
//!
//! The `to_*` conversions produce partial entities ready for the store. They
//! never set child maps; callers upsert children separately.

use serde::Deserialize;

use crate::types::{
    Actor, Commit, Field, Job, JobId, OrgId, Organization, OwnerRef, Release, RepoId, Repository,
    RunId, Step, StepNumber, Timestamp, User, UserId, Workflow, WorkflowId, WorkflowRun,
};

/// `Some` becomes a value, `None` stays unreported.
fn reported<T>(value: Option<T>) -> Field<T> {
    match value {
        Some(v) => Field::Value(v),
        None => Field::Absent,
    }
}

/// A user or organization account (`owner`, `sender`, `actor`, `organization`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountPayload {
    pub id: Option<u64>,
    pub login: Field<String>,
    /// `"User"` or `"Organization"`.
    #[serde(rename = "type")]
    pub account_type: Field<String>,
    pub name: Field<String>,
    pub email: Field<String>,
    pub description: Field<String>,
    pub url: Field<String>,
    pub html_url: Field<String>,
}

impl AccountPayload {
    pub fn is_organization(&self) -> bool {
        self.account_type
            .value()
            .is_some_and(|t| t.eq_ignore_ascii_case("organization"))
    }

    pub fn owner_ref(&self) -> Option<OwnerRef> {
        let id = self.id?;
        let account_type = self.account_type.value().map(String::as_str).unwrap_or("");
        Some(OwnerRef::from_account_type(account_type, id))
    }

    pub fn to_organization(&self) -> Option<(OrgId, Organization)> {
        let id = OrgId(self.id?);
        Some((
            id,
            Organization {
                id,
                login: self.login.clone(),
                name: self.name.clone(),
                description: self.description.clone(),
                url: self.url.clone(),
                html_url: self.html_url.clone(),
                ..Default::default()
            },
        ))
    }

    pub fn to_user(&self) -> Option<(UserId, User)> {
        let id = UserId(self.id?);
        Some((
            id,
            User {
                id,
                login: self.login.clone(),
                name: self.name.clone(),
                email: self.email.clone(),
                ..Default::default()
            },
        ))
    }

    fn to_actor(&self) -> Actor {
        Actor {
            id: reported(self.id.map(UserId)),
            login: self.login.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryPayload {
    pub id: Option<u64>,
    pub name: Field<String>,
    pub full_name: Field<String>,
    pub owner: Option<AccountPayload>,
    pub private: Field<bool>,
    pub fork: Field<bool>,
    pub description: Field<String>,
    pub url: Field<String>,
    pub html_url: Field<String>,
}

impl RepositoryPayload {
    /// Converts to a partial repository owned by `owner`, if one is known.
    pub fn to_repository(&self, owner: Option<OwnerRef>) -> Option<(RepoId, Repository)> {
        let id = RepoId(self.id?);
        Some((
            id,
            Repository {
                id,
                name: self.name.clone(),
                full_name: self.full_name.clone(),
                owner: reported(owner),
                private: self.private,
                fork: self.fork,
                description: self.description.clone(),
                url: self.url.clone(),
                html_url: self.html_url.clone(),
                ..Default::default()
            },
        ))
    }

    pub fn owner_login(&self) -> Option<&str> {
        self.owner.as_ref()?.login.value().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowPayload {
    pub id: Option<u64>,
    pub name: Field<String>,
    pub path: Field<String>,
    pub state: Field<String>,
    pub created_at: Field<Timestamp>,
    pub updated_at: Field<Timestamp>,
    pub url: Field<String>,
    pub html_url: Field<String>,
    pub badge_url: Field<String>,
}

impl WorkflowPayload {
    pub fn to_workflow(&self) -> Option<(WorkflowId, Workflow)> {
        let id = WorkflowId(self.id?);
        Some((
            id,
            Workflow {
                id,
                name: self.name.clone(),
                path: self.path.clone(),
                state: self.state.clone(),
                created_at: self.created_at,
                updated_at: self.updated_at,
                url: self.url.clone(),
                html_url: self.html_url.clone(),
                badge_url: self.badge_url.clone(),
                ..Default::default()
            },
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitAuthorPayload {
    pub name: Field<String>,
    pub email: Field<String>,
}

/// The `head_commit` object embedded in a run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeadCommitPayload {
    pub id: Option<String>,
    pub message: Field<String>,
    pub timestamp: Field<Timestamp>,
    pub author: Field<CommitAuthorPayload>,
}

impl HeadCommitPayload {
    pub fn to_commit(&self) -> Option<Commit> {
        let sha = self.id.clone()?;
        let author = match &self.author {
            Field::Value(author) => author.name.clone(),
            Field::Null => Field::Null,
            Field::Absent => Field::Absent,
        };
        Some(Commit {
            sha,
            message: self.message.clone(),
            author,
            date: self.timestamp,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowRunPayload {
    pub id: Option<u64>,
    pub workflow_id: Field<u64>,
    pub name: Field<String>,
    /// Workflow file path, e.g. `.github/workflows/ci.yml`.
    pub path: Field<String>,
    pub run_number: Field<u64>,
    pub run_attempt: Field<u32>,
    pub event: Field<String>,
    pub status: Field<String>,
    pub conclusion: Field<String>,
    pub head_branch: Field<String>,
    pub head_sha: Field<String>,
    pub created_at: Field<Timestamp>,
    pub updated_at: Field<Timestamp>,
    pub run_started_at: Field<Timestamp>,
    pub actor: Field<AccountPayload>,
    pub head_commit: Field<HeadCommitPayload>,
    pub repository: Option<RepositoryPayload>,
}

impl WorkflowRunPayload {
    pub fn to_run(&self) -> Option<(RunId, WorkflowRun)> {
        let id = RunId(self.id?);
        Some((
            id,
            WorkflowRun {
                id,
                workflow_id: self.workflow_id.map(WorkflowId),
                name: self.name.clone(),
                run_number: self.run_number,
                attempt: self.run_attempt,
                event: self.event.clone(),
                status: self.status.clone(),
                conclusion: self.conclusion.clone(),
                head_branch: self.head_branch.clone(),
                head_sha: self.head_sha.clone(),
                created_at: self.created_at,
                updated_at: self.updated_at,
                run_started_at: self.run_started_at,
                triggered_by: self.actor.as_ref().map(AccountPayload::to_actor),
                ..Default::default()
            },
        ))
    }

    /// A workflow stub carrying what the run knows about its workflow.
    pub fn to_workflow_stub(&self) -> Option<(WorkflowId, Workflow)> {
        let id = WorkflowId(*self.workflow_id.value()?);
        Some((
            id,
            Workflow {
                id,
                path: self.path.clone(),
                ..Default::default()
            },
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StepPayload {
    pub number: Option<u64>,
    pub name: Field<String>,
    pub status: Field<String>,
    pub conclusion: Field<String>,
    pub started_at: Field<Timestamp>,
    pub completed_at: Field<Timestamp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowJobPayload {
    pub id: Option<u64>,
    pub run_id: Option<u64>,
    pub name: Field<String>,
    pub status: Field<String>,
    pub conclusion: Field<String>,
    pub created_at: Field<Timestamp>,
    pub started_at: Field<Timestamp>,
    pub completed_at: Field<Timestamp>,
    pub runner_id: Field<u64>,
    pub runner_name: Field<String>,
    pub runner_group_id: Field<u64>,
    pub runner_group_name: Field<String>,
    pub labels: Field<Vec<String>>,
    pub steps: Field<Vec<StepPayload>>,
}

impl WorkflowJobPayload {
    /// Converts to a partial job. Steps without a number are dropped.
    pub fn to_job(&self) -> Option<(JobId, Job)> {
        let id = JobId(self.id?);
        let steps = self
            .steps
            .value()
            .into_iter()
            .flatten()
            .filter_map(|step| {
                let number = StepNumber(step.number?);
                Some((
                    number,
                    Step {
                        number,
                        name: step.name.clone(),
                        status: step.status.clone(),
                        conclusion: step.conclusion.clone(),
                        started_at: step.started_at,
                        completed_at: step.completed_at,
                    },
                ))
            })
            .collect();

        Some((
            id,
            Job {
                id,
                run_id: reported(self.run_id.map(RunId)),
                name: self.name.clone(),
                status: self.status.clone(),
                conclusion: self.conclusion.clone(),
                created_at: self.created_at,
                started_at: self.started_at,
                completed_at: self.completed_at,
                runner_id: self.runner_id,
                runner_name: self.runner_name.clone(),
                runner_group_id: self.runner_group_id,
                runner_group_name: self.runner_group_name.clone(),
                labels: self.labels.clone(),
                steps,
            },
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReleasePayload {
    pub tag_name: Option<String>,
    pub created_at: Field<Timestamp>,
    pub published_at: Field<Timestamp>,
}

impl ReleasePayload {
    /// Converts to a release. The publication time wins over creation time.
    pub fn to_release(&self) -> Option<Release> {
        let released_at = match self.published_at {
            Field::Value(at) => Field::Value(at),
            _ => self.created_at,
        };
        Some(Release {
            tag_name: self.tag_name.clone()?,
            released_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_keeps_only_reported_fields() {
        let payload: WorkflowRunPayload = serde_json::from_value(json!({
            "id": 100,
            "run_number": 3,
            "status": "completed",
            "conclusion": "success"
        }))
        .unwrap();

        let (id, run) = payload.to_run().unwrap();
        assert_eq!(id, RunId(100));
        assert_eq!(
            run,
            WorkflowRun {
                id: RunId(100),
                run_number: Field::Value(3),
                status: Field::Value("completed".into()),
                conclusion: Field::Value("success".into()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn explicit_null_is_reported() {
        let payload: WorkflowRunPayload = serde_json::from_value(json!({
            "id": 1,
            "status": "in_progress",
            "conclusion": null
        }))
        .unwrap();
        let (_, run) = payload.to_run().unwrap();
        assert_eq!(run.conclusion, Field::Null);
        assert_eq!(run.head_sha, Field::Absent);
    }

    #[test]
    fn run_without_id_is_rejected() {
        let payload: WorkflowRunPayload =
            serde_json::from_value(json!({"status": "queued"})).unwrap();
        assert!(payload.to_run().is_none());
    }

    #[test]
    fn actor_becomes_triggered_by() {
        let payload: WorkflowRunPayload = serde_json::from_value(json!({
            "id": 1,
            "actor": {"id": 42, "login": "octocat", "type": "User"}
        }))
        .unwrap();
        let (_, run) = payload.to_run().unwrap();
        assert_eq!(
            run.triggered_by,
            Field::Value(Actor {
                id: Field::Value(UserId(42)),
                login: Field::Value("octocat".into()),
            })
        );
    }

    #[test]
    fn job_steps_are_keyed_by_number() {
        let payload: WorkflowJobPayload = serde_json::from_value(json!({
            "id": 7,
            "run_id": 100,
            "status": "completed",
            "runner_id": null,
            "labels": ["ubuntu-latest"],
            "steps": [
                {"number": 1, "name": "Set up job", "status": "completed"},
                {"name": "no number"},
                {"number": 2, "name": "Run tests", "conclusion": "failure"}
            ]
        }))
        .unwrap();

        let (id, job) = payload.to_job().unwrap();
        assert_eq!(id, JobId(7));
        assert_eq!(job.run_id, Field::Value(RunId(100)));
        assert_eq!(job.runner_id, Field::Null);
        assert_eq!(job.labels, Field::Value(vec!["ubuntu-latest".to_string()]));
        assert_eq!(job.steps.len(), 2);
        assert_eq!(
            job.steps[&StepNumber(2)].conclusion,
            Field::Value("failure".into())
        );
    }

    #[test]
    fn owner_type_decides_owner_kind() {
        let org: AccountPayload =
            serde_json::from_value(json!({"id": 5, "type": "Organization"})).unwrap();
        let user: AccountPayload = serde_json::from_value(json!({"id": 6, "type": "User"})).unwrap();
        assert_eq!(org.owner_ref(), Some(OwnerRef::Organization(OrgId(5))));
        assert_eq!(user.owner_ref(), Some(OwnerRef::User(UserId(6))));
    }

    #[test]
    fn head_commit_uses_author_name() {
        let payload: HeadCommitPayload = serde_json::from_value(json!({
            "id": "abc123",
            "message": "Fix build",
            "timestamp": "2024-05-01T10:00:00Z",
            "author": {"name": "Mona", "email": "mona@example.com"}
        }))
        .unwrap();
        let commit = payload.to_commit().unwrap();
        assert_eq!(commit.sha, "abc123");
        assert_eq!(commit.author, Field::Value("Mona".into()));
        assert!(commit.date.is_reported());
    }

    #[test]
    fn release_prefers_publication_time() {
        let payload: ReleasePayload = serde_json::from_value(json!({
            "tag_name": "v1.0.0",
            "created_at": "2024-05-01T10:00:00Z",
            "published_at": "2024-05-02T10:00:00Z"
        }))
        .unwrap();
        let release = payload.to_release().unwrap();
        assert_eq!(
            release.released_at.value().map(|t| t.to_rfc3339()),
            Some("2024-05-02T10:00:00+00:00".to_string())
        );
    }
}
