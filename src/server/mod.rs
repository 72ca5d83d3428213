//! HTTP servers for the watcher.
//!
//! Two routers, served on separate listeners:
//!
//! # Webhook endpoints
//!
//! - `POST /` and `POST /webhook` - Accept GitHub webhook deliveries
//!
//! # Admin endpoints
//!
//! - `GET /status` - Returns 200 if the server is running
//! - `GET|POST /admin/reload-config` - Reloads configuration
//! - `GET /admin/print-config` - Current configuration, secrets redacted
//! - `GET /admin/get-store` - The whole store as JSON
//! - `GET /admin/organizations` - Organizations keyed by ID
//! - `GET /admin/repositories` - Repositories keyed by ID

use std::sync::Arc;

pub mod admin;
pub mod webhook;

pub use admin::{
    get_store_handler, organizations_handler, print_config_handler, reload_config_handler,
    repositories_handler, status_handler,
};
pub use webhook::webhook_handler;

use crate::config::ConfigHandle;
use crate::store::EntityStore;
use crate::webhooks::WebhookIngester;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<EntityStore>,
    config: ConfigHandle,
    ingester: WebhookIngester,
}

impl AppState {
    /// Creates the state shared by both routers.
    ///
    /// The ingester follows `config`, so a reloaded webhook secret is used
    /// from the next delivery on.
    pub fn new(store: Arc<EntityStore>, config: ConfigHandle) -> Self {
        let ingester = WebhookIngester::new(store.clone(), config.subscribe());
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                config,
                ingester,
            }),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.inner.store
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.inner.config
    }

    pub fn ingester(&self) -> &WebhookIngester {
        &self.inner.ingester
    }
}

/// Builds the router served on the webhook listener.
pub fn build_webhook_router(app_state: AppState) -> axum::Router {
    use axum::routing::post;

    axum::Router::new()
        .route("/", post(webhook_handler))
        .route("/webhook", post(webhook_handler))
        .with_state(app_state)
}

/// Builds the router served on the admin listener.
pub fn build_admin_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/status", get(status_handler))
        .route(
            "/admin/reload-config",
            get(reload_config_handler).post(reload_config_handler),
        )
        .route("/admin/print-config", get(print_config_handler))
        .route("/admin/get-store", get(get_store_handler))
        .route("/admin/organizations", get(organizations_handler))
        .route("/admin/repositories", get(repositories_handler))
        .with_state(app_state)
}
