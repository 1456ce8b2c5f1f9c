// CPU time split from /proc/stat deltas

use std::time::Duration;

use super::{MetricSource, ProbeError, read_file};
use crate::models::{CpuUsage, MetricKind};

/// Delay between the two reads of a session's first probe.
const FIRST_PROBE_SETTLE: Duration = Duration::from_secs(1);

/// Aggregate jiffy counters from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Percent split of the time elapsed since `earlier`; `None` if the counters did not move.
    pub fn usage_since(&self, earlier: &CpuTimes) -> Option<CpuUsage> {
        let total = self.total().saturating_sub(earlier.total());
        if total == 0 {
            return None;
        }
        let pct = |now: u64, then: u64| now.saturating_sub(then) as f64 * 100.0 / total as f64;
        Some(CpuUsage {
            user: pct(self.user + self.nice, earlier.user + earlier.nice),
            system: pct(
                self.system + self.irq + self.softirq,
                earlier.system + earlier.irq + earlier.softirq,
            ),
            idle: pct(self.idle + self.iowait, earlier.idle + earlier.iowait),
        })
    }
}

/// Parses the aggregate `cpu` line. Kernels older than 2.6.11 omit steal; missing trailing
/// columns read as zero.
pub fn parse_proc_stat(content: &str) -> Result<CpuTimes, ProbeError> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or(ProbeError::Empty("cpu"))?;

    let values = line
        .split_whitespace()
        .skip(1)
        .map(|f| {
            f.parse::<u64>()
                .map_err(|e| ProbeError::malformed("/proc/stat", format!("{f:?}: {e}")))
        })
        .collect::<Result<Vec<u64>, _>>()?;
    if values.len() < 4 {
        return Err(ProbeError::malformed(
            "/proc/stat",
            format!("expected at least 4 cpu columns, got {}", values.len()),
        ));
    }
    let at = |i: usize| values.get(i).copied().unwrap_or(0);
    Ok(CpuTimes {
        user: at(0),
        nice: at(1),
        system: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
    })
}

/// Reports the CPU split over the interval since its previous probe.
pub struct CpuSource {
    path: String,
    previous: Option<CpuTimes>,
    settle: Duration,
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new("/proc/stat")
    }
}

impl CpuSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            previous: None,
            settle: FIRST_PROBE_SETTLE,
        }
    }

    async fn read(&self) -> Result<CpuTimes, ProbeError> {
        parse_proc_stat(&read_file(&self.path).await?)
    }
}

impl MetricSource for CpuSource {
    type Sample = CpuUsage;

    fn kind(&self) -> MetricKind {
        MetricKind::Cpu
    }

    async fn probe(&mut self) -> Result<CpuUsage, ProbeError> {
        let earlier = match self.previous {
            Some(times) => times,
            None => {
                let baseline = self.read().await?;
                tokio::time::sleep(self.settle).await;
                baseline
            }
        };
        let now = self.read().await?;
        self.previous = Some(now);
        now.usage_since(&earlier)
            .ok_or_else(|| ProbeError::malformed("/proc/stat", "cpu counters did not advance"))
    }
}
