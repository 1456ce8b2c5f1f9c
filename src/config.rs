use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::watch;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    50051
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which metric kinds a streaming session collects. Disabled kinds are absent from snapshots.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub load_avg: bool,
    #[serde(default)]
    pub cpu: bool,
    #[serde(default)]
    pub disk: bool,
    #[serde(default)]
    pub filesystem: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            load_avg: true,
            cpu: false,
            disk: false,
            filesystem: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Log file, appended to and created if missing. Empty means stderr.
    #[serde(default)]
    pub path: String,
}

fn default_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            path: String::new(),
        }
    }
}

impl LoggingConfig {
    /// Opens the configured log file for appending; `None` when logging goes to stderr.
    pub fn open_log_file(&self) -> anyhow::Result<Option<File>> {
        if self.path.trim().is_empty() {
            return Ok(None);
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening log file {}", self.path))?;
        Ok(Some(file))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReloadConfig {
    /// How often the config file is re-read; 0 disables reloading.
    #[serde(default = "default_reload_interval_secs")]
    pub interval_secs: u64,
}

fn default_reload_interval_secs() -> u64 {
    300
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reload_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Config path: explicit flag, then CONFIG_FILE, then ./config.toml.
    pub fn resolve_path(flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| std::env::var_os("CONFIG_FILE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::load_from_str(&s)
    }

    /// Like `load_from_path`, but a missing file yields `None` instead of an error.
    pub fn load_optional(path: &Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::load_from_str(&s).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        anyhow::ensure!(
            LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()),
            "logging.level must be one of {:?}, got {:?}",
            LOG_LEVELS,
            self.logging.level
        );
        Ok(())
    }
}

/// Re-reads `path` every `interval` and publishes changed values. Sessions read the
/// current value once at start, so a reload only affects sessions opened afterwards.
/// A failed reload keeps the previous value. Exits when every receiver is gone.
pub fn spawn_reloader(
    path: PathBuf,
    interval: Duration,
    tx: watch::Sender<Arc<AppConfig>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = tx.closed() => break,
            }
            match AppConfig::load_from_path(&path) {
                Ok(config) => {
                    if **tx.borrow() != config {
                        tracing::info!(
                            path = %path.display(),
                            metrics = ?config.metrics,
                            "configuration reloaded"
                        );
                        tx.send_replace(Arc::new(config));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %path.display(),
                        operation = "reload_config",
                        "config reload failed; keeping previous configuration"
                    );
                }
            }
        }
        tracing::debug!("Config reloader shutting down");
    })
}
