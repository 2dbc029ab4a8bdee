use std::path::Path;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Disks, Networks, System};
use shared::types::{
    CpuStatus, LoadAverage, NetRate, NetTraffic, ProcessState, ProxyStatus, StatusSnapshot, Usage,
};
use crate::collaborators::{StatusCollector, Supervisor};

/// Host readings taken in one blocking pass
struct HostReadings {
    cpu: CpuStatus,
    mem: Usage,
    swap: Usage,
    disk: Usage,
    load: LoadAverage,
    uptime_secs: u64,
    net_traffic: NetTraffic,
}

/// Collects host metrics with sysinfo and asks the supervisor about the proxy.
pub struct SystemCollector {
    // CPU usage is a delta between refreshes, so the same System is kept across polls
    system: Arc<Mutex<System>>,
    supervisor: Arc<dyn Supervisor>,
}

impl SystemCollector {
    pub fn new(supervisor: Arc<dyn Supervisor>) -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            supervisor,
        }
    }

    fn read_host(system: &Mutex<System>) -> HostReadings {
        let mut sys = system.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu = CpuStatus {
            usage: sys.global_cpu_info().cpu_usage(),
            cores: sys.cpus().len(),
        };
        let mem = Usage {
            current: sys.used_memory(),
            total: sys.total_memory(),
        };
        let swap = Usage {
            current: sys.used_swap(),
            total: sys.total_swap(),
        };
        drop(sys);

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .map(|d| Usage {
                current: d.total_space().saturating_sub(d.available_space()),
                total: d.total_space(),
            })
            .unwrap_or_default();

        let networks = Networks::new_with_refreshed_list();
        let net_traffic = networks
            .iter()
            .filter(|(name, _)| name.as_str() != "lo")
            .fold(NetTraffic::default(), |acc, (_, data)| NetTraffic {
                sent: acc.sent + data.total_transmitted(),
                recv: acc.recv + data.total_received(),
            });

        let load = System::load_average();

        HostReadings {
            cpu,
            mem,
            swap,
            disk,
            load: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            uptime_secs: System::uptime(),
            net_traffic,
        }
    }
}

/// Bytes per second between two snapshots. Counter resets yield zero.
fn net_rate(previous: Option<&StatusSnapshot>, traffic: NetTraffic, now: chrono::DateTime<Utc>) -> NetRate {
    let Some(prev) = previous else {
        return NetRate::default();
    };

    let elapsed_ms = (now - prev.taken_at).num_milliseconds();
    if elapsed_ms <= 0 {
        return NetRate::default();
    }

    let per_sec = |current: u64, before: u64| current.saturating_sub(before) * 1000 / elapsed_ms as u64;
    NetRate {
        up: per_sec(traffic.sent, prev.net_traffic.sent),
        down: per_sec(traffic.recv, prev.net_traffic.recv),
    }
}

#[async_trait]
impl StatusCollector for SystemCollector {
    async fn collect_status(&self, previous: Option<&StatusSnapshot>) -> StatusSnapshot {
        let system = self.system.clone();
        let host = match tokio::task::spawn_blocking(move || Self::read_host(&system)).await {
            Ok(host) => Some(host),
            Err(e) => {
                tracing::error!("Failed to read host metrics: {}", e);
                None
            }
        };

        let (state, error) = self.supervisor.state().await;
        let version = self
            .supervisor
            .version()
            .await
            .unwrap_or_else(|| "Unknown".to_string());

        let now = Utc::now();
        let proxy = ProxyStatus {
            error: error.filter(|_| state == ProcessState::Error),
            state,
            version,
        };

        match host {
            Some(host) => StatusSnapshot {
                taken_at: now,
                net_io: net_rate(previous, host.net_traffic, now),
                cpu: host.cpu,
                mem: host.mem,
                swap: host.swap,
                disk: host.disk,
                load: host.load,
                uptime_secs: host.uptime_secs,
                net_traffic: host.net_traffic,
                proxy,
            },
            None => StatusSnapshot {
                taken_at: now,
                cpu: CpuStatus::default(),
                mem: Usage::default(),
                swap: Usage::default(),
                disk: Usage::default(),
                load: LoadAverage::default(),
                uptime_secs: 0,
                net_io: NetRate::default(),
                net_traffic: NetTraffic::default(),
                proxy,
            },
        }
    }
}
