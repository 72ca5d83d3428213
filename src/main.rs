use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ant_watcher::backfill::run_backfill_loop;
use ant_watcher::config::{Config, ConfigHandle};
use ant_watcher::logging;
use ant_watcher::server::{AppState, build_admin_router, build_webhook_router};
use ant_watcher::store::EntityStore;
use ant_watcher::store::eviction::{EVICTION_INTERVAL, run_eviction_loop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let log_handle = logging::init(config.log_level);

    let webhook_addr = config.webhook_addr;
    let admin_addr = (!config.disable_admin_server).then_some(config.admin_addr);
    let config = ConfigHandle::from_env(config);
    let store = Arc::new(EntityStore::new());
    let app_state = AppState::new(store.clone(), config.clone());
    let cancel = CancellationToken::new();

    let mut tasks = tokio::task::JoinSet::new();

    tasks.spawn(logging::follow_config(
        log_handle,
        config.subscribe(),
        cancel.clone(),
    ));
    tasks.spawn(run_backfill_loop(
        store.clone(),
        config.subscribe(),
        cancel.clone(),
    ));
    tasks.spawn(run_eviction_loop(
        store,
        config.subscribe(),
        EVICTION_INTERVAL,
        cancel.clone(),
    ));

    let listener = TcpListener::bind(webhook_addr)
        .await
        .with_context(|| format!("failed to bind webhook listener on {webhook_addr}"))?;
    info!(addr = %webhook_addr, "Webhook server listening");
    let shutdown = cancel.clone();
    let webhook_app = build_webhook_router(app_state.clone());
    tasks.spawn(async move {
        if let Err(e) = axum::serve(listener, webhook_app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!(error = %e, "Webhook server failed");
        }
    });

    if let Some(admin_addr) = admin_addr {
        let listener = TcpListener::bind(admin_addr)
            .await
            .with_context(|| format!("failed to bind admin listener on {admin_addr}"))?;
        info!(addr = %admin_addr, "Admin server listening");
        let shutdown = cancel.clone();
        let admin_app = build_admin_router(app_state);
        tasks.spawn(async move {
            if let Err(e) = axum::serve(listener, admin_app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!(error = %e, "Admin server failed");
            }
        });
    } else {
        info!("Admin server disabled");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down");
    cancel.cancel();

    while tasks.join_next().await.is_some() {}
    Ok(())
}
