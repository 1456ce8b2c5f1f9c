// Per-kind sample models. A probe produces one of these; a window's mean is the same type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadAverage {
    #[serde(rename = "load_average_1min")]
    pub one: f64,
    #[serde(rename = "load_average_5min")]
    pub five: f64,
    #[serde(rename = "load_average_15min")]
    pub fifteen: f64,
}

/// CPU time split in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    #[serde(rename = "cpu_user")]
    pub user: f64,
    #[serde(rename = "cpu_system")]
    pub system: f64,
    #[serde(rename = "cpu_idle")]
    pub idle: f64,
}

/// Throughput for one block device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStat {
    pub device: String,
    /// Completed transfers (reads + writes) per second.
    pub tps: f64,
    /// KiB read + written per second.
    pub kb_total: f64,
}

/// Space and inode usage for one mount point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemStat {
    pub filesystem: String,
    pub mountpoint: String,
    pub used_mb: f64,
    pub used_percent: f64,
    pub inodes_used: f64,
    pub inodes_percent: f64,
}
