//! GitHub REST access for backfill.
//!
//! - [`OctocrabClient`]: token-authenticated client
//! - [`ActionsProvider`]: paginated repository and workflow run listing
//! - [`payload`]: GitHub's JSON objects, also used by webhook decoding
//! - transient failures are retried with exponential backoff

mod client;
mod error;
pub mod payload;
mod provider;
mod retry;

pub use client::OctocrabClient;
pub use error::{GitHubApiError, GitHubErrorKind};
pub use provider::{ActionsProvider, ListPage, PER_PAGE};
pub use retry::{RetryConfig, retry_with_backoff};
