// Static host identity

use serde::{Deserialize, Serialize};

/// Read once at startup; sent in the session welcome and via GET /api/info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub host_name: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub cpu_count: u32,
}
