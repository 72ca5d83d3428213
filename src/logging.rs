//! Logging setup.
//!
//! Logs go through `tracing` with a `fmt` layer. The filter sits behind a
//! `reload` layer so the configured level can change at runtime: the
//! [`LogHandle`] returned by [`init`] is passed to whoever applies config
//! reloads, rather than being a process-wide mutable level.
//!
//! `RUST_LOG`, when set at startup, takes precedence over the configured level
//! for the lifetime of the process.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt};

use crate::config::Config;

/// Configured verbosity, in the spelling used by deployment files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Kept for compatibility with existing files; filters like `Error`.
    Fatal,
}

impl LogLevel {
    /// Parses `DEBUG`, `INFO`, `WARN`/`WARNING`, `ERROR` or `FATAL`, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            "FATAL" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    fn as_tracing(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }

    /// The filter directive applied for this level: dependencies stay at
    /// `warn`, this crate follows the configured level.
    pub fn directive(self) -> String {
        format!("warn,ant_watcher={}", self.as_tracing())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// Handle for changing the log level after startup.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    /// Set when `RUST_LOG` chose the filter; configured levels are then ignored.
    pinned_by_env: bool,
}

impl LogHandle {
    pub fn set_level(&self, level: LogLevel) {
        if self.pinned_by_env {
            debug!(%level, "RUST_LOG is set; ignoring configured log level");
            return;
        }
        match self.filter.reload(EnvFilter::new(level.directive())) {
            Ok(()) => info!(%level, "Log level changed"),
            Err(e) => warn!(%level, error = %e, "Failed to change log level"),
        }
    }
}

/// Installs the global subscriber and returns a handle to its filter.
pub fn init(initial: LogLevel) -> LogHandle {
    let (filter, pinned_by_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(initial.directive()), false),
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    LogHandle {
        filter: handle,
        pinned_by_env,
    }
}

/// Re-applies the log level whenever a new config snapshot is published.
pub async fn follow_config(
    handle: LogHandle,
    mut config: watch::Receiver<Arc<Config>>,
    cancel: CancellationToken,
) {
    let mut current = config.borrow().log_level;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return,
            changed = config.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let level = config.borrow_and_update().log_level;
        if level != current {
            handle.set_level(level);
            current = level;
        }
    }
}
