//! Paginated listing of repositories and workflow runs.
//!
//! [`ActionsProvider`] is the seam between backfill and the network: the
//! octocrab implementation below talks to GitHub, tests substitute a fake
//! that serves canned pages.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::client::OctocrabClient;
use super::error::GitHubApiError;
use super::payload::{RepositoryPayload, WorkflowRunPayload};
use super::retry::{RetryConfig, retry_with_backoff};

/// Page size for every listing request.
pub const PER_PAGE: u8 = 50;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    /// The next page number, if GitHub advertised one. `Some(0)` is treated
    /// like `None`.
    pub next_page: Option<u32>,
}

impl<T> ListPage<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Source of organization repositories and their workflow runs.
///
/// Pages are numbered from 1.
pub trait ActionsProvider {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `GET /orgs/{org}/repos`
    fn list_repositories(
        &self,
        org: &str,
        page: u32,
    ) -> impl Future<Output = Result<ListPage<RepositoryPayload>, Self::Error>> + Send;

    /// `GET /repos/{owner}/{repo}/actions/runs`, limited to runs created at or
    /// after `since`.
    fn list_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
        page: u32,
    ) -> impl Future<Output = Result<ListPage<WorkflowRunPayload>, Self::Error>> + Send;
}

#[derive(Debug, Serialize)]
struct ListParams {
    per_page: u8,
    page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<String>,
}

impl ActionsProvider for OctocrabClient {
    type Error = GitHubApiError;

    fn list_repositories(
        &self,
        org: &str,
        page: u32,
    ) -> impl Future<Output = Result<ListPage<RepositoryPayload>, Self::Error>> + Send {
        let route = format!("/orgs/{org}/repos");
        let params = ListParams {
            per_page: PER_PAGE,
            page,
            created: None,
        };
        async move { fetch_page(self, &route, &params).await }
    }

    fn list_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
        page: u32,
    ) -> impl Future<Output = Result<ListPage<WorkflowRunPayload>, Self::Error>> + Send {
        let route = format!("/repos/{owner}/{repo}/actions/runs");
        let params = ListParams {
            per_page: PER_PAGE,
            page,
            created: Some(created_filter(since)),
        };
        async move { fetch_page(self, &route, &params).await }
    }
}

async fn fetch_page<T>(
    client: &OctocrabClient,
    route: &str,
    params: &ListParams,
) -> Result<ListPage<T>, GitHubApiError>
where
    T: DeserializeOwned + Send,
{
    let page: octocrab::Page<T> = retry_with_backoff(RetryConfig::DEFAULT, move || async move {
        client
            .inner()
            .get(route, Some(params))
            .await
            .map_err(GitHubApiError::from_octocrab)
    })
    .await?;

    let next_page = page
        .next
        .as_ref()
        .and_then(|uri| uri.query())
        .and_then(page_number_from_query);
    Ok(ListPage {
        items: page.items,
        next_page,
    })
}

/// The `created` search qualifier for runs created at or after `since`.
fn created_filter(since: DateTime<Utc>) -> String {
    format!(">={}", since.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Reads the `page` parameter from the query of a `Link: rel="next"` URL.
fn page_number_from_query(query: &str) -> Option<u32> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|value| value.parse().ok())
}
