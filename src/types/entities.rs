//! The mirrored GitHub Actions hierarchy.
//!
//! ```text
//! Organization ─┐
//!               ├─ Repository ── Workflow ── WorkflowRun ── Job ── Step
//! User ─────────┘        ├─ Commit
//!                        └─ Release
//! ```
//!
//! Every scalar attribute is a [`Field`] so that a partial view (one webhook,
//! one REST page) can be merged without clobbering what is already known.
//! The `id` of each entity is always set by the store before merging.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::field::Field;
use super::ids::{JobId, OrgId, RepoId, RunId, StepNumber, UserId, WorkflowId};
use super::owner::OwnerRef;

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    pub id: OrgId,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub login: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub description: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub url: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub html_url: Field<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub members: BTreeSet<UserId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub repositories: BTreeMap<RepoId, Repository>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: UserId,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub login: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub email: Field<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub repositories: BTreeMap<RepoId, Repository>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub id: RepoId,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub full_name: Field<String>,
    /// Which account the repository lives under. Decides its place in the tree.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub owner: Field<OwnerRef>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub private: Field<bool>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub fork: Field<bool>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub description: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub url: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub html_url: Field<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub workflows: BTreeMap<WorkflowId, Workflow>,
    /// Keyed by commit SHA.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub commits: BTreeMap<String, Commit>,
    /// Keyed by tag name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub releases: BTreeMap<String, Release>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workflow {
    pub id: WorkflowId,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub path: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub state: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub created_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub updated_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub url: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub html_url: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub badge_url: Field<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub runs: BTreeMap<RunId, WorkflowRun>,
}

/// The user that triggered a run, as embedded in the run itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Actor {
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub id: Field<UserId>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub login: Field<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowRun {
    pub id: RunId,
    /// The workflow this run belongs to. Decides its place in the tree.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub workflow_id: Field<WorkflowId>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub run_number: Field<u64>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub attempt: Field<u32>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub event: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub status: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub conclusion: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub head_branch: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub head_sha: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub created_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub updated_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub run_started_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub triggered_by: Field<Actor>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub jobs: BTreeMap<JobId, Job>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: JobId,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub run_id: Field<RunId>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub status: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub conclusion: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub created_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub started_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub completed_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub runner_id: Field<u64>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub runner_name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub runner_group_id: Field<u64>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub runner_group_name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub labels: Field<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub steps: BTreeMap<StepNumber, Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub number: StepNumber,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub status: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub conclusion: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub started_at: Field<Timestamp>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub completed_at: Field<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commit {
    pub sha: String,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub message: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub author: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub date: Field<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    pub tag_name: String,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub released_at: Field<Timestamp>,
}

// ─── Stubs ───────────────────────────────────────────────────────────────────
//
// A stub is an entity known only by its key. Stubs are what the store creates
// when a child arrives before its parent.

impl Organization {
    pub fn stub(id: OrgId) -> Self {
        Organization {
            id,
            ..Default::default()
        }
    }
}

impl User {
    pub fn stub(id: UserId) -> Self {
        User {
            id,
            ..Default::default()
        }
    }
}

impl Repository {
    pub fn stub(id: RepoId) -> Self {
        Repository {
            id,
            ..Default::default()
        }
    }
}

impl Workflow {
    pub fn stub(id: WorkflowId) -> Self {
        Workflow {
            id,
            ..Default::default()
        }
    }
}

impl WorkflowRun {
    pub fn stub(id: RunId) -> Self {
        WorkflowRun {
            id,
            ..Default::default()
        }
    }
}

impl Job {
    pub fn stub(id: JobId) -> Self {
        Job {
            id,
            ..Default::default()
        }
    }
}
