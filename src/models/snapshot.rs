// Fragment (one kind's averaged output) and Snapshot (all enabled kinds for one tick)

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{CpuUsage, DiskStat, FilesystemStat, LoadAverage};

/// The closed set of metric kinds the agent collects.
/// Declaration order is the order the combiner waits on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    LoadAverage,
    Cpu,
    Disk,
    Filesystem,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::LoadAverage,
        MetricKind::Cpu,
        MetricKind::Disk,
        MetricKind::Filesystem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::LoadAverage => "load_avg",
            MetricKind::Cpu => "cpu",
            MetricKind::Disk => "disk",
            MetricKind::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Averaged output of one kind collector for one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    LoadAverage(LoadAverage),
    Cpu(CpuUsage),
    Disk(Vec<DiskStat>),
    Filesystem(Vec<FilesystemStat>),
}

impl Fragment {
    pub fn kind(&self) -> MetricKind {
        match self {
            Fragment::LoadAverage(_) => MetricKind::LoadAverage,
            Fragment::Cpu(_) => MetricKind::Cpu,
            Fragment::Disk(_) => MetricKind::Disk,
            Fragment::Filesystem(_) => MetricKind::Filesystem,
        }
    }
}

impl From<LoadAverage> for Fragment {
    fn from(v: LoadAverage) -> Self {
        Fragment::LoadAverage(v)
    }
}

impl From<CpuUsage> for Fragment {
    fn from(v: CpuUsage) -> Self {
        Fragment::Cpu(v)
    }
}

impl From<Vec<DiskStat>> for Fragment {
    fn from(v: Vec<DiskStat>) -> Self {
        Fragment::Disk(v)
    }
}

impl From<Vec<FilesystemStat>> for Fragment {
    fn from(v: Vec<FilesystemStat>) -> Self {
        Fragment::Filesystem(v)
    }
}

/// One tick-aligned set of fragments. Kinds that are disabled stay `None`
/// and are omitted from the wire format entirely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Assembly time, epoch milliseconds.
    pub timestamp: u64,
    #[serde(flatten)]
    pub load_average: Option<LoadAverage>,
    #[serde(flatten)]
    pub cpu: Option<CpuUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_stats: Option<Vec<DiskStat>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_stats: Option<Vec<FilesystemStat>>,
}

impl Snapshot {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    /// Places a fragment into its slot. A second fragment of the same kind replaces the first.
    pub fn merge(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::LoadAverage(v) => self.load_average = Some(v),
            Fragment::Cpu(v) => self.cpu = Some(v),
            Fragment::Disk(v) => self.disk_stats = Some(v),
            Fragment::Filesystem(v) => self.filesystem_stats = Some(v),
        }
    }

    pub fn contains(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::LoadAverage => self.load_average.is_some(),
            MetricKind::Cpu => self.cpu.is_some(),
            MetricKind::Disk => self.disk_stats.is_some(),
            MetricKind::Filesystem => self.filesystem_stats.is_some(),
        }
    }
}
