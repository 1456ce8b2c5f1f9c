// Static host identity via sysinfo

use sysinfo::System;
use tracing::instrument;

use crate::models::HostInfo;

#[instrument(fields(operation = "host_info"))]
pub async fn host_info() -> anyhow::Result<HostInfo> {
    tokio::task::spawn_blocking(|| {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        HostInfo {
            host_name: System::host_name().unwrap_or_default(),
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.into()),
            os_version: System::os_version().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            cpu_count: sys.cpus().len() as u32,
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))
}
