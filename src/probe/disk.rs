// Per-device throughput from /proc/diskstats deltas

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::{MetricSource, ProbeError, read_file};
use crate::models::{DiskStat, MetricKind};

const FIRST_PROBE_SETTLE: Duration = Duration::from_secs(1);
/// /proc/diskstats counts sectors of 512 bytes regardless of the device's block size.
const SECTOR_BYTES: f64 = 512.0;

/// Cumulative I/O counters for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskCounters {
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
}

fn is_virtual(name: &str) -> bool {
    name.starts_with("loop") || name.starts_with("ram")
}

/// Parses `/proc/diskstats`, skipping loop/ram devices and devices that never did I/O.
pub fn parse_diskstats(content: &str) -> Result<HashMap<String, DiskCounters>, ProbeError> {
    let mut devices = HashMap::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 10 {
            return Err(ProbeError::malformed(
                "/proc/diskstats",
                format!("expected at least 10 columns, got {}", fields.len()),
            ));
        }
        let name = fields[2];
        if is_virtual(name) {
            continue;
        }
        let counter = |i: usize| {
            fields[i].parse::<u64>().map_err(|e| {
                ProbeError::malformed("/proc/diskstats", format!("{name} {:?}: {e}", fields[i]))
            })
        };
        let counters = DiskCounters {
            reads_completed: counter(3)?,
            sectors_read: counter(5)?,
            writes_completed: counter(7)?,
            sectors_written: counter(9)?,
        };
        if counters.reads_completed == 0 && counters.writes_completed == 0 {
            continue;
        }
        devices.insert(name.to_string(), counters);
    }
    if devices.is_empty() {
        return Err(ProbeError::Empty("disk"));
    }
    Ok(devices)
}

/// Rates between two reads `elapsed` apart. Devices absent from `earlier` are skipped;
/// counter wraps read as zero.
pub fn disk_rates(
    earlier: &HashMap<String, DiskCounters>,
    now: &HashMap<String, DiskCounters>,
    elapsed: Duration,
) -> Vec<DiskStat> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return Vec::new();
    }
    let mut stats: Vec<DiskStat> = now
        .iter()
        .filter_map(|(device, n)| {
            let e = earlier.get(device)?;
            let transfers = n.reads_completed.saturating_sub(e.reads_completed)
                + n.writes_completed.saturating_sub(e.writes_completed);
            let sectors = n.sectors_read.saturating_sub(e.sectors_read)
                + n.sectors_written.saturating_sub(e.sectors_written);
            Some(DiskStat {
                device: device.clone(),
                tps: transfers as f64 / secs,
                kb_total: sectors as f64 * SECTOR_BYTES / 1024.0 / secs,
            })
        })
        .collect();
    stats.sort_by(|a, b| a.device.cmp(&b.device));
    stats
}

pub struct DiskSource {
    path: String,
    previous: Option<(Instant, HashMap<String, DiskCounters>)>,
    settle: Duration,
}

impl Default for DiskSource {
    fn default() -> Self {
        Self::new("/proc/diskstats")
    }
}

impl DiskSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            previous: None,
            settle: FIRST_PROBE_SETTLE,
        }
    }

    async fn read(&self) -> Result<(Instant, HashMap<String, DiskCounters>), ProbeError> {
        let content = read_file(&self.path).await?;
        Ok((Instant::now(), parse_diskstats(&content)?))
    }
}

impl MetricSource for DiskSource {
    type Sample = Vec<DiskStat>;

    fn kind(&self) -> MetricKind {
        MetricKind::Disk
    }

    async fn probe(&mut self) -> Result<Vec<DiskStat>, ProbeError> {
        let (then, earlier) = match self.previous.take() {
            Some(previous) => previous,
            None => {
                let baseline = self.read().await?;
                tokio::time::sleep(self.settle).await;
                baseline
            }
        };
        let (now, current) = match self.read().await {
            Ok(read) => read,
            Err(e) => {
                self.previous = Some((then, earlier));
                return Err(e);
            }
        };
        let stats = disk_rates(&earlier, &current, now.duration_since(then));
        self.previous = Some((now, current));
        if stats.is_empty() {
            return Err(ProbeError::Empty("disk"));
        }
        Ok(stats)
    }
}
