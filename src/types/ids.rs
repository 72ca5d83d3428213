//! Newtype wrappers for GitHub numeric identifiers.
//!
//! GitHub hands out plain integers for every entity in the Actions hierarchy.
//! Wrapping each kind keeps a run ID from being passed where a job ID is
//! expected, and the transparent serde representation keeps the JSON identical
//! to what GitHub sends.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                $name(n)
            }
        }
    };
}

numeric_id!(
    /// A GitHub organization account ID.
    OrgId
);

numeric_id!(
    /// A GitHub user account ID.
    UserId
);

numeric_id!(
    /// A repository ID (the numeric `id`, not `owner/name`).
    RepoId
);

numeric_id!(
    /// A workflow definition ID.
    WorkflowId
);

numeric_id!(
    /// A workflow run ID.
    RunId
);

numeric_id!(
    /// A job ID within a workflow run.
    JobId
);

numeric_id!(
    /// A step's 1-based position within its job.
    StepNumber
);
