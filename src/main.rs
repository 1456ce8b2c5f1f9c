use anyhow::Result;
use clap::Parser;
use hostpulse::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::AtomicUsize;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// How often to log active session count at INFO level.
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "hostpulse", version, about = "Host telemetry agent")]
struct Cli {
    /// Path to the TOML configuration file (default: $CONFIG_FILE or ./config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen port; overrides server.port from the file.
    #[arg(long)]
    port: Option<u16>,
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = config::AppConfig::resolve_path(cli.config);
    let loaded = config::AppConfig::load_optional(&config_path)?;
    let config_missing = loaded.is_none();
    let mut app_config = loaded.unwrap_or_default();
    if let Some(port) = cli.port {
        anyhow::ensure!(port > 0, "--port must be between 1 and 65535");
        app_config.server.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(app_config.logging.level.as_str()));
    let log_file = app_config.logging.open_log_file()?;
    let to_file = log_file.is_some();
    let writer = match log_file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(!to_file)
        .init();

    if config_missing {
        tracing::warn!(
            path = %config_path.display(),
            "config file not found; using defaults"
        );
    }
    tracing::info!(metrics = ?app_config.metrics, "Starting hostpulse");

    let host_info = Arc::new(probe::host_info().await?);
    let reload_interval_secs = app_config.reload.interval_secs;
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let (config_tx, config_rx) = watch::channel(Arc::new(app_config));

    if reload_interval_secs > 0 {
        config::spawn_reloader(
            config_path,
            Duration::from_secs(reload_interval_secs),
            config_tx,
        );
    }

    let active_sessions = Arc::new(AtomicUsize::new(0));
    let stats_sessions = active_sessions.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(STATS_LOG_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tick.tick().await;
        loop {
            tick.tick().await;
            tracing::info!(
                active_sessions = stats_sessions.load(std::sync::atomic::Ordering::Relaxed),
                "app stats"
            );
        }
    });

    let app = routes::app(config_rx, host_info, active_sessions);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}
