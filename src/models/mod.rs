// Domain models

mod host;
mod metrics;
mod snapshot;

pub use host::HostInfo;
pub use metrics::{CpuUsage, DiskStat, FilesystemStat, LoadAverage};
pub use snapshot::{Fragment, MetricKind, Snapshot};
