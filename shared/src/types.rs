use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Point-in-time view of the host and the managed proxy process.
/// Produced by the status collector on every active poll and served verbatim to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// When the snapshot was collected
    pub taken_at: DateTime<Utc>,

    pub cpu: CpuStatus,
    pub mem: Usage,
    pub swap: Usage,
    /// Usage of the filesystem mounted at `/`
    pub disk: Usage,
    pub load: LoadAverage,

    /// Host uptime in seconds
    pub uptime_secs: u64,

    /// Network throughput in bytes per second, derived from the previous snapshot
    pub net_io: NetRate,

    /// Total bytes moved across all interfaces since boot
    pub net_traffic: NetTraffic,

    pub proxy: ProxyStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStatus {
    /// Global usage in percent (0-100)
    pub usage: f32,
    pub cores: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub current: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetRate {
    pub up: u64,
    pub down: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetTraffic {
    pub sent: u64,
    pub recv: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyStatus {
    pub state: ProcessState,

    /// Last error reported by the supervisor, if the process is in the error state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Version string reported by the proxy binary, "Unknown" when it cannot be queried
    pub version: String,
}

/// Run state of the managed proxy process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Stopped,
    Error,
}
