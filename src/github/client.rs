//! Octocrab client for the REST API.

use octocrab::Octocrab;

/// A GitHub API client authenticated with a personal or installation token.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
}

impl OctocrabClient {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Creates a client with token authentication against `base_uri`
    /// (`https://api.github.com`, or a GitHub Enterprise `/api/v3` root).
    pub fn from_token(
        token: impl Into<String>,
        base_uri: &str,
    ) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder()
            .personal_token(token.into())
            .base_uri(base_uri)?
            .build()?;
        Ok(Self::new(client))
    }

    pub fn inner(&self) -> &Octocrab {
        &self.client
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient").finish_non_exhaustive()
    }
}
