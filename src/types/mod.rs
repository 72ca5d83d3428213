//! Domain types for the mirrored GitHub Actions hierarchy.

pub mod entities;
pub mod field;
pub mod ids;
pub mod owner;

pub use entities::{
    Actor, Commit, Job, Organization, Release, Repository, Step, Timestamp, User, Workflow,
    WorkflowRun,
};
pub use field::Field;
pub use ids::{JobId, OrgId, RepoId, RunId, StepNumber, UserId, WorkflowId};
pub use owner::{Owner, OwnerRef};
