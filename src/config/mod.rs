//! Service configuration.
//!
//! Configuration is read in three layers:
//!
//! 1. built-in defaults
//! 2. a JSON file at `$CONFIG_FILE_PATH` (default `config/config.json`); a
//!    missing file is not an error
//! 3. environment variables named after the keys in upper case
//!    (`WEBHOOK_SECRET`, `MEMORY_TTL`, ...)
//!
//! Values are strings in both the file and the environment, then validated
//! into a typed [`Config`]. A webhook secret is mandatory: deliveries are
//! never accepted unsigned.
//!
//! # Hot reload
//!
//! [`ConfigHandle`] publishes immutable `Arc<Config>` snapshots through a
//! `tokio::sync::watch` channel. A reload builds and validates a complete new
//! config, carries over the settings that only apply at startup (listener
//! addresses, the admin server switch) and swaps it in atomically. Readers
//! always see one whole snapshot.

mod parse;

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use parse::{parse_bool, parse_duration, parse_size};

use crate::logging::LogLevel;

/// Environment variable naming the config file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE_PATH";

/// Config file used when `CONFIG_FILE_PATH` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config/config.json";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {key} {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("webhook_secret must be set; unsigned deliveries are not accepted")]
    MissingWebhookSecret,
}

/// Validated service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listener for the admin endpoints.
    pub admin_addr: SocketAddr,
    /// Skip the admin listener entirely. Read at startup only.
    pub disable_admin_server: bool,
    /// Listener for GitHub webhook deliveries.
    pub webhook_addr: SocketAddr,
    /// Shared secret for `X-Hub-Signature-256` verification.
    pub webhook_secret: String,
    /// REST token. Backfill is disabled when empty.
    pub github_token: String,
    pub github_api_url: String,
    /// Organization whose repositories are backfilled.
    pub organization: String,
    /// Disable backfill even when a token is configured.
    pub disable_api: bool,
    pub log_level: LogLevel,
    /// How far back each backfill pass looks.
    pub fetch_history: Duration,
    /// Time between backfill passes.
    pub sync_interval: Duration,
    /// Runs untouched for this long are evicted. Zero disables.
    pub memory_ttl: Duration,
    /// Approximate byte budget for stored runs. Zero disables.
    pub memory_limit: u64,
}

/// Raw string values, as spelled in the file and the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawConfig {
    admin_address: String,
    admin_port: String,
    disable_admin_server: String,
    webhook_address: String,
    webhook_port: String,
    webhook_secret: String,
    github_token: String,
    github_api_url: String,
    organization: String,
    disable_api: String,
    log_level: String,
    fetch_history: String,
    sync_interval: String,
    memory_ttl: String,
    memory_limit: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            admin_address: "127.0.0.1".into(),
            admin_port: "8081".into(),
            disable_admin_server: "false".into(),
            webhook_address: "0.0.0.0".into(),
            webhook_port: "8080".into(),
            webhook_secret: String::new(),
            github_token: String::new(),
            github_api_url: "https://api.github.com".into(),
            organization: String::new(),
            disable_api: "false".into(),
            log_level: "INFO".into(),
            fetch_history: "15m".into(),
            sync_interval: "5m".into(),
            memory_ttl: "15m".into(),
            memory_limit: "0".into(),
        }
    }
}

impl RawConfig {
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 15] = [
            ("ADMIN_ADDRESS", &mut self.admin_address),
            ("ADMIN_PORT", &mut self.admin_port),
            ("DISABLE_ADMIN_SERVER", &mut self.disable_admin_server),
            ("WEBHOOK_ADDRESS", &mut self.webhook_address),
            ("WEBHOOK_PORT", &mut self.webhook_port),
            ("WEBHOOK_SECRET", &mut self.webhook_secret),
            ("GITHUB_TOKEN", &mut self.github_token),
            ("GITHUB_API_URL", &mut self.github_api_url),
            ("GITHUB_ORGANIZATION", &mut self.organization),
            ("DISABLE_API", &mut self.disable_api),
            ("LOG_LEVEL", &mut self.log_level),
            ("FETCH_HISTORY", &mut self.fetch_history),
            ("SYNC_INTERVAL", &mut self.sync_interval),
            ("MEMORY_TTL", &mut self.memory_ttl),
            ("MEMORY_LIMIT", &mut self.memory_limit),
        ];
        for (key, slot) in overrides {
            if let Some(value) = env(key) {
                *slot = value;
            }
        }
    }

    fn validate(self) -> Result<Config, ConfigError> {
        fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
            ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: reason.to_string(),
            }
        }
        fn socket(
            addr_key: &'static str,
            addr: &str,
            port_key: &'static str,
            port: &str,
        ) -> Result<SocketAddr, ConfigError> {
            let ip: IpAddr = addr.trim().parse().map_err(|e| invalid(addr_key, addr, e))?;
            let port: u16 = port.trim().parse().map_err(|e| invalid(port_key, port, e))?;
            Ok(SocketAddr::new(ip, port))
        }

        let admin_addr = socket("admin_address", &self.admin_address, "admin_port", &self.admin_port)?;
        let webhook_addr = socket(
            "webhook_address",
            &self.webhook_address,
            "webhook_port",
            &self.webhook_port,
        )?;

        let uri: axum::http::Uri = self
            .github_api_url
            .parse()
            .map_err(|e| invalid("github_api_url", &self.github_api_url, e))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(invalid(
                "github_api_url",
                &self.github_api_url,
                "expected an absolute URL",
            ));
        }

        let log_level = match LogLevel::parse(&self.log_level) {
            Some(level) => level,
            None => {
                warn!(log_level = %self.log_level, "Unknown log level, using INFO");
                LogLevel::Info
            }
        };

        if self.webhook_secret.is_empty() {
            return Err(ConfigError::MissingWebhookSecret);
        }

        let sync_interval = parse_duration(&self.sync_interval)
            .map_err(|e| invalid("sync_interval", &self.sync_interval, e))?;
        if sync_interval.is_zero() {
            return Err(invalid("sync_interval", &self.sync_interval, "must be positive"));
        }

        Ok(Config {
            admin_addr,
            disable_admin_server: parse_bool(&self.disable_admin_server)
                .map_err(|e| invalid("disable_admin_server", &self.disable_admin_server, e))?,
            webhook_addr,
            github_token: self.github_token.trim().to_string(),
            github_api_url: self.github_api_url.trim_end_matches('/').to_string(),
            organization: self.organization.trim().to_string(),
            disable_api: parse_bool(&self.disable_api)
                .map_err(|e| invalid("disable_api", &self.disable_api, e))?,
            log_level,
            fetch_history: parse_duration(&self.fetch_history)
                .map_err(|e| invalid("fetch_history", &self.fetch_history, e))?,
            sync_interval,
            memory_ttl: parse_duration(&self.memory_ttl)
                .map_err(|e| invalid("memory_ttl", &self.memory_ttl, e))?,
            memory_limit: parse_size(&self.memory_limit)
                .map_err(|e| invalid("memory_limit", &self.memory_limit, e))?,
            webhook_secret: self.webhook_secret,
        })
    }
}

impl Config {
    /// Loads configuration from `path` with overrides from `env`.
    ///
    /// `env` is the variable lookup; pass `|k| std::env::var(k).ok()` for the
    /// process environment.
    pub fn load(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut raw = match std::fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "Parsing config file");
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults and environment");
                RawConfig::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        raw.apply_env(env);
        raw.validate()
    }

    /// Loads configuration from the file named by `CONFIG_FILE_PATH` and the
    /// process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load(Path::new(&path), |key| std::env::var(key).ok())
    }

    /// Whether the backfill loop should run with this configuration.
    pub fn backfill_enabled(&self) -> bool {
        !self.disable_api && !self.github_token.is_empty() && !self.organization.is_empty()
    }

    /// A printable view with credentials masked.
    pub fn redacted(&self) -> RedactedConfig<'_> {
        RedactedConfig {
            admin_addr: self.admin_addr,
            disable_admin_server: self.disable_admin_server,
            webhook_addr: self.webhook_addr,
            webhook_secret: mask(&self.webhook_secret),
            github_token: mask(&self.github_token),
            github_api_url: &self.github_api_url,
            organization: &self.organization,
            disable_api: self.disable_api,
            log_level: self.log_level,
            fetch_history_secs: self.fetch_history.as_secs(),
            sync_interval_secs: self.sync_interval.as_secs(),
            memory_ttl_secs: self.memory_ttl.as_secs(),
            memory_limit_bytes: self.memory_limit,
        }
    }

    /// A valid configuration with a fixed secret, for tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let env = |key: &str| (key == "WEBHOOK_SECRET").then(|| "test-secret".to_string());
        RawConfig::default()
            .tap_env(env)
            .validate()
            .unwrap_or_else(|e| panic!("test config must be valid: {e}"))
    }
}

#[cfg(test)]
impl RawConfig {
    fn tap_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        self.apply_env(env);
        self
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "********" }
}

/// Serializable view of a [`Config`] with secrets masked.
#[derive(Debug, Serialize)]
pub struct RedactedConfig<'a> {
    pub admin_addr: SocketAddr,
    pub disable_admin_server: bool,
    pub webhook_addr: SocketAddr,
    pub webhook_secret: &'static str,
    pub github_token: &'static str,
    pub github_api_url: &'a str,
    pub organization: &'a str,
    pub disable_api: bool,
    pub log_level: LogLevel,
    pub fetch_history_secs: u64,
    pub sync_interval_secs: u64,
    pub memory_ttl_secs: u64,
    pub memory_limit_bytes: u64,
}

type Loader = dyn Fn() -> Result<Config, ConfigError> + Send + Sync;

/// Shared, reloadable configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    sender: Arc<watch::Sender<Arc<Config>>>,
    loader: Arc<Loader>,
}

impl ConfigHandle {
    /// Creates a handle publishing `initial`, reloading through `loader`.
    pub fn new(
        initial: Config,
        loader: impl Fn() -> Result<Config, ConfigError> + Send + Sync + 'static,
    ) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        ConfigHandle {
            sender: Arc::new(sender),
            loader: Arc::new(loader),
        }
    }

    /// Creates a handle that reloads from `CONFIG_FILE_PATH` and the environment.
    pub fn from_env(initial: Config) -> Self {
        Self::new(initial, Config::from_env)
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Arc<Config> {
        self.sender.borrow().clone()
    }

    /// Subscribes to future snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.sender.subscribe()
    }

    /// Loads a fresh configuration and publishes it.
    ///
    /// Settings that only take effect at startup keep their running values.
    /// On error the current snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        let mut next = (self.loader)()?;
        let current = self.current();

        if next.admin_addr != current.admin_addr || next.webhook_addr != current.webhook_addr {
            warn!("Listener addresses changed; restart to apply");
        }
        next.admin_addr = current.admin_addr;
        next.webhook_addr = current.webhook_addr;
        next.disable_admin_server = current.disable_admin_server;

        log_changes(&current, &next);
        let next = Arc::new(next);
        self.sender.send_replace(next.clone());
        info!("Configuration reloaded");
        Ok(next)
    }
}

fn log_changes(old: &Config, new: &Config) {
    if old.github_token != new.github_token {
        info!("GitHub token changed");
    }
    if old.webhook_secret != new.webhook_secret {
        info!("Webhook secret changed");
    }
    if old.log_level != new.log_level {
        info!(from = %old.log_level, to = %new.log_level, "Log level changed");
    }
    if old.memory_ttl != new.memory_ttl {
        info!(from = ?old.memory_ttl, to = ?new.memory_ttl, "Memory TTL changed");
    }
    if old.memory_limit != new.memory_limit {
        info!(from = old.memory_limit, to = new.memory_limit, "Memory limit changed");
    }
    if old.fetch_history != new.fetch_history || old.sync_interval != new.sync_interval {
        info!(
            fetch_history = ?new.fetch_history,
            sync_interval = ?new.sync_interval,
            "Backfill schedule changed"
        );
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
