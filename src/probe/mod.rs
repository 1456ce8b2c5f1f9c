// Metric sources: one probe per metric kind, plus static host identity.
// Text parsing lives in pure functions next to each source so it can be tested on fixtures.

mod cpu;
mod disk;
mod filesystem;
mod host;
mod load;

use std::future::Future;
use std::process::ExitStatus;

use crate::config::MetricsConfig;
use crate::models::MetricKind;
use crate::pipeline::Pipeline;

pub use cpu::{CpuSource, CpuTimes, parse_proc_stat};
pub use disk::{DiskCounters, DiskSource, disk_rates, parse_diskstats};
pub use filesystem::{FilesystemSource, parse_df};
pub use host::host_info;
pub use load::{LoadAvgSource, parse_loadavg};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("no {0} entries found")]
    Empty(&'static str),
}

impl ProbeError {
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        ProbeError::Malformed {
            what,
            detail: detail.into(),
        }
    }
}

/// Produces one raw sample per call. Called once per collector tick.
pub trait MetricSource: Send + 'static {
    type Sample: Send + 'static;

    fn kind(&self) -> MetricKind;

    fn probe(&mut self) -> impl Future<Output = Result<Self::Sample, ProbeError>> + Send;
}

/// Parses a decimal that may use a comma separator (locale-dependent tool output).
pub(crate) fn parse_decimal(field: &str, what: &'static str) -> Result<f64, ProbeError> {
    field
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|e| ProbeError::malformed(what, format!("{field:?}: {e}")))
}

async fn read_file(path: &str) -> Result<String, ProbeError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ProbeError::Io {
            path: path.to_string(),
            source,
        })
}

/// Registers a collector for every kind enabled in `metrics`, backed by the host's own probes.
pub fn spawn_enabled(pipeline: &mut Pipeline, metrics: &MetricsConfig) {
    if metrics.load_avg {
        pipeline.spawn_scalar(LoadAvgSource::default());
    }
    if metrics.cpu {
        pipeline.spawn_scalar(CpuSource::default());
    }
    if metrics.disk {
        pipeline.spawn_keyed(DiskSource::default());
    }
    if metrics.filesystem {
        pipeline.spawn_keyed(FilesystemSource::default());
    }
}
