use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use shared::types::StatusSnapshot;
use crate::backup::{BackupManager, DatabaseExport};
use crate::collaborators::{
    ConfigSource, DatabaseStore, KeyGenerator, LogSelector, LogSource, StatusCollector, Supervisor,
    VersionSource,
};
use crate::config::Config;
use crate::error::PanelResult;
use crate::lifecycle::LifecycleGateway;
use crate::status::{Liveness, StatusHandle, StatusPoller};
use crate::versions::VersionCatalog;

/// External collaborators the controller drives
pub struct Collaborators {
    pub supervisor: Arc<dyn Supervisor>,
    pub collector: Arc<dyn StatusCollector>,
    pub versions: Arc<dyn VersionSource>,
    pub store: Arc<dyn DatabaseStore>,
    pub logs: Arc<dyn LogSource>,
    pub proxy_config: Arc<dyn ConfigSource>,
    pub keys: Arc<dyn KeyGenerator>,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub tick: Duration,
    pub idle_threshold: Duration,
    pub versions_ttl: Duration,
    pub export_filename: String,
    pub escalate_restart_failure: bool,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: config.status.tick(),
            idle_threshold: config.status.idle_threshold(),
            versions_ttl: config.versions.ttl(),
            export_filename: config.backup.export_filename.clone(),
            escalate_restart_failure: config.backup.escalate_restart_failure,
        }
    }
}

/// The server control surface: status, versions, lifecycle, backup, logs and key generation.
pub struct ServerController {
    status: StatusHandle,
    versions: VersionCatalog,
    lifecycle: LifecycleGateway,
    backup: BackupManager,
    logs: Arc<dyn LogSource>,
    proxy_config: Arc<dyn ConfigSource>,
    keys: Arc<dyn KeyGenerator>,
}

impl ServerController {
    /// Build the controller and spawn its status poller, which runs until `cancel` fires.
    pub fn start(
        collaborators: Collaborators,
        settings: ControllerSettings,
        cancel: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let liveness = Arc::new(Liveness::new());

        let (poller, status) = StatusPoller::new(
            collaborators.collector,
            liveness.clone(),
            settings.idle_threshold,
        );
        let poller_handle = tokio::spawn(poller.run(settings.tick, cancel));

        let lifecycle = LifecycleGateway::new(collaborators.supervisor, liveness.clone());
        let backup = BackupManager::new(
            collaborators.store,
            lifecycle.clone(),
            liveness,
            settings.export_filename,
            settings.escalate_restart_failure,
        );

        let controller = Self {
            status,
            versions: VersionCatalog::new(collaborators.versions, settings.versions_ttl),
            lifecycle,
            backup,
            logs: collaborators.logs,
            proxy_config: collaborators.proxy_config,
            keys: collaborators.keys,
        };

        (Arc::new(controller), poller_handle)
    }

    pub fn status(&self) -> Option<StatusSnapshot> {
        self.status.current()
    }

    pub async fn versions(&self) -> PanelResult<Vec<String>> {
        self.versions.versions().await
    }

    pub async fn stop(&self) -> PanelResult<()> {
        self.lifecycle.stop().await
    }

    pub async fn restart(&self) -> PanelResult<()> {
        self.lifecycle.restart().await
    }

    pub async fn install(&self, version: &str) -> PanelResult<()> {
        self.lifecycle.install(version).await
    }

    pub async fn export_database(&self) -> PanelResult<DatabaseExport> {
        self.backup.export().await
    }

    pub async fn import_database(&self, image: Vec<u8>) -> PanelResult<()> {
        self.backup.import(image).await
    }

    pub async fn logs(&self, count: usize, level: &str, selector: LogSelector) -> Vec<String> {
        self.logs.read_logs(count, level, selector).await
    }

    pub async fn config_json(&self) -> PanelResult<serde_json::Value> {
        Ok(self.proxy_config.read_config().await?)
    }

    pub async fn x25519_keys(&self) -> PanelResult<serde_json::Value> {
        Ok(self.keys.x25519().await?)
    }

    pub async fn mldsa65_keys(&self) -> PanelResult<serde_json::Value> {
        Ok(self.keys.mldsa65().await?)
    }

    pub async fn ech_cert(&self, sni: &str) -> PanelResult<serde_json::Value> {
        Ok(self.keys.ech_cert(sni).await?)
    }

    pub async fn vless_enc(&self) -> PanelResult<serde_json::Value> {
        Ok(self.keys.vless_enc().await?)
    }
}
