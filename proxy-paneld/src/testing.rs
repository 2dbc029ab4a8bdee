//! In-memory collaborators with call counters for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::types::{
    CpuStatus, LoadAverage, NetRate, NetTraffic, ProcessState, ProxyStatus, StatusSnapshot, Usage,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::collaborators::{
    ConfigSource, DatabaseStore, KeyGenerator, LogSelector, LogSource, StatusCollector, Supervisor,
    VersionSource,
};
use crate::controller::{Collaborators, ControllerSettings, ServerController};

/// Snapshot tagged with `generation` in its uptime field
pub fn snapshot(generation: u64) -> StatusSnapshot {
    StatusSnapshot {
        taken_at: Utc::now(),
        cpu: CpuStatus { usage: 12.5, cores: 4 },
        mem: Usage { current: 512, total: 2048 },
        swap: Usage::default(),
        disk: Usage { current: 10, total: 100 },
        load: LoadAverage::default(),
        uptime_secs: generation,
        net_io: NetRate::default(),
        net_traffic: NetTraffic::default(),
        proxy: ProxyStatus {
            state: ProcessState::Running,
            error: None,
            version: "1.8.4".to_string(),
        },
    }
}

#[derive(Default)]
pub struct FakeCollector {
    calls: AtomicUsize,
    hints: Mutex<Vec<Option<u64>>>,
}

impl FakeCollector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generation of the previous snapshot handed to each call
    pub fn hints(&self) -> Vec<Option<u64>> {
        self.hints.lock().unwrap().clone()
    }

    pub fn generation(&self, snapshot: &Option<StatusSnapshot>) -> Option<u64> {
        snapshot.as_ref().map(|s| s.uptime_secs)
    }
}

#[async_trait]
impl StatusCollector for FakeCollector {
    async fn collect_status(&self, previous: Option<&StatusSnapshot>) -> StatusSnapshot {
        self.hints.lock().unwrap().push(previous.map(|s| s.uptime_secs));
        let generation = self.calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        snapshot(generation)
    }
}

pub struct FakeSupervisor {
    stops: AtomicUsize,
    restarts: AtomicUsize,
    installs: Mutex<Vec<String>>,
    fail_stop: AtomicBool,
    fail_restart: AtomicBool,
    state: Mutex<(ProcessState, Option<String>)>,
}

impl Default for FakeSupervisor {
    fn default() -> Self {
        Self {
            stops: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            installs: Mutex::new(Vec::new()),
            fail_stop: AtomicBool::new(false),
            fail_restart: AtomicBool::new(false),
            state: Mutex::new((ProcessState::Running, None)),
        }
    }
}

impl FakeSupervisor {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }

    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn fail_restart(&self) {
        self.fail_restart.store(true, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: ProcessState, error: Option<&str>) {
        *self.state.lock().unwrap() = (state, error.map(str::to_string));
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(anyhow!("stop failed"));
        }
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        if self.fail_restart.load(Ordering::SeqCst) {
            return Err(anyhow!("restart failed"));
        }
        Ok(())
    }

    async fn install(&self, version: &str) -> Result<()> {
        self.installs.lock().unwrap().push(version.to_string());
        Ok(())
    }

    async fn state(&self) -> (ProcessState, Option<String>) {
        self.state.lock().unwrap().clone()
    }

    async fn version(&self) -> Option<String> {
        Some("1.8.4".to_string())
    }
}

pub struct FakeVersions {
    versions: Vec<String>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl FakeVersions {
    pub fn new(versions: &[&str]) -> Self {
        Self {
            versions: versions.iter().map(|v| v.to_string()).collect(),
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionSource for FakeVersions {
    async fn list_versions(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("feed unavailable"));
        }
        Ok(self.versions.clone())
    }
}

#[derive(Default)]
pub struct FakeStore {
    image: Mutex<Vec<u8>>,
    imported: Mutex<Option<Vec<u8>>>,
    exports: AtomicUsize,
    fail_export: AtomicBool,
    fail_import: AtomicBool,
    panic_on_import: AtomicBool,
    import_delay: Mutex<Option<Duration>>,
}

impl FakeStore {
    pub fn set_image(&self, image: Vec<u8>) {
        *self.image.lock().unwrap() = image;
    }

    pub fn exports(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    pub fn imported(&self) -> Option<Vec<u8>> {
        self.imported.lock().unwrap().clone()
    }

    pub fn fail_export(&self) {
        self.fail_export.store(true, Ordering::SeqCst);
    }

    pub fn fail_import(&self) {
        self.fail_import.store(true, Ordering::SeqCst);
    }

    pub fn panic_on_import(&self) {
        self.panic_on_import.store(true, Ordering::SeqCst);
    }

    pub fn set_import_delay(&self, delay: Duration) {
        *self.import_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl DatabaseStore for FakeStore {
    async fn export_database(&self) -> Result<Vec<u8>> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        if self.fail_export.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"));
        }
        Ok(self.image.lock().unwrap().clone())
    }

    async fn import_database(&self, image: Vec<u8>) -> Result<()> {
        let delay = *self.import_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_import.load(Ordering::SeqCst) {
            panic!("store blew up");
        }
        if self.fail_import.load(Ordering::SeqCst) {
            return Err(anyhow!("file is not a database"));
        }
        *self.imported.lock().unwrap() = Some(image);
        Ok(())
    }
}

/// Returns `count` canned lines tagged with the requested level and source
#[derive(Default)]
pub struct FakeLogs;

#[async_trait]
impl LogSource for FakeLogs {
    async fn read_logs(&self, count: usize, level: &str, selector: LogSelector) -> Vec<String> {
        (0..count)
            .map(|i| format!("{:?} [{}] line {}", selector, level, i))
            .collect()
    }
}

pub struct FakeConfig(pub serde_json::Value);

#[async_trait]
impl ConfigSource for FakeConfig {
    async fn read_config(&self) -> Result<serde_json::Value> {
        Ok(self.0.clone())
    }
}

/// Canned key material; records each request as "<command>[ <sni>]"
#[derive(Default)]
pub struct FakeKeys {
    requests: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeKeys {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn record(&self, request: String) -> Result<()> {
        self.requests.lock().unwrap().push(request);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("proxy binary not found"));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyGenerator for FakeKeys {
    async fn x25519(&self) -> Result<serde_json::Value> {
        self.record("x25519".to_string())?;
        Ok(serde_json::json!({"privateKey": "x25519-private", "publicKey": "x25519-public"}))
    }

    async fn mldsa65(&self) -> Result<serde_json::Value> {
        self.record("mldsa65".to_string())?;
        Ok(serde_json::json!({"seed": "mldsa65-seed", "verify": "mldsa65-verify"}))
    }

    async fn ech_cert(&self, sni: &str) -> Result<serde_json::Value> {
        self.record(format!("ech {}", sni))?;
        Ok(serde_json::json!({"sni": sni, "echConfigList": "list", "echServerKeys": "keys"}))
    }

    async fn vless_enc(&self) -> Result<serde_json::Value> {
        self.record("vlessenc".to_string())?;
        Ok(serde_json::json!({"auths": [{"label": "X25519", "decryption": "d", "encryption": "e"}]}))
    }
}

/// A controller wired to fakes, with handles on the fakes kept for assertions
pub struct Harness {
    pub supervisor: Arc<FakeSupervisor>,
    pub collector: Arc<FakeCollector>,
    pub versions: Arc<FakeVersions>,
    pub store: Arc<FakeStore>,
    pub keys: Arc<FakeKeys>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            supervisor: Arc::new(FakeSupervisor::default()),
            collector: Arc::new(FakeCollector::default()),
            versions: Arc::new(FakeVersions::new(&["v1.8.24", "v1.8.23"])),
            store: Arc::new(FakeStore::default()),
            keys: Arc::new(FakeKeys::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn start(&self) -> (Arc<ServerController>, JoinHandle<()>) {
        let collaborators = Collaborators {
            supervisor: self.supervisor.clone(),
            collector: self.collector.clone(),
            versions: self.versions.clone(),
            store: self.store.clone(),
            logs: Arc::new(FakeLogs),
            proxy_config: Arc::new(FakeConfig(serde_json::json!({"log": {"loglevel": "warning"}}))),
            keys: self.keys.clone(),
        };
        let settings = ControllerSettings {
            tick: Duration::from_secs(2),
            idle_threshold: Duration::from_secs(180),
            versions_ttl: Duration::from_secs(60),
            export_filename: "panel.db".to_string(),
            escalate_restart_failure: false,
        };
        ServerController::start(collaborators, settings, self.cancel.clone())
    }
}
