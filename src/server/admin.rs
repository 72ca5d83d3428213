//! Admin endpoints: liveness, config reload and print, store dumps.
//!
//! Everything here is read-only with respect to the store.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use super::AppState;
use crate::config::ConfigError;

/// Errors returned by admin endpoints.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("failed to reload configuration: {0}")]
    Reload(#[from] ConfigError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        error!(error = %self, "Admin request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Encodes `value` as a JSON response.
fn json_response<T: Serialize>(value: &T) -> Result<Response, AdminError> {
    let body = serde_json::to_vec(value)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// `GET /status`
pub async fn status_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// `GET|POST /admin/reload-config`
///
/// Rebuilds the configuration from the file and environment and publishes it.
/// On failure the running configuration is kept.
pub async fn reload_config_handler(
    State(app_state): State<AppState>,
) -> Result<(StatusCode, &'static str), AdminError> {
    app_state.config().reload()?;
    Ok((StatusCode::OK, "Configuration reloaded"))
}

/// `GET /admin/print-config`, secrets redacted.
pub async fn print_config_handler(
    State(app_state): State<AppState>,
) -> Result<Response, AdminError> {
    let config = app_state.config().current();
    json_response(&config.redacted())
}

/// `GET /admin/get-store`
pub async fn get_store_handler(State(app_state): State<AppState>) -> Result<Response, AdminError> {
    let snapshot = app_state.store().snapshot();
    debug!(
        organizations = snapshot.organizations.len(),
        users = snapshot.users.len(),
        "Dumping store"
    );
    json_response(&snapshot)
}

/// `GET /admin/organizations`
pub async fn organizations_handler(
    State(app_state): State<AppState>,
) -> Result<Response, AdminError> {
    json_response(&app_state.store().all_organizations())
}

/// `GET /admin/repositories`
pub async fn repositories_handler(
    State(app_state): State<AppState>,
) -> Result<Response, AdminError> {
    json_response(&app_state.store().all_repositories())
}
