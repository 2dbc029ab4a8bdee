use std::sync::{Arc, OnceLock};
use regex::Regex;
use crate::collaborators::DatabaseStore;
use crate::error::{PanelError, PanelResult};
use crate::lifecycle::LifecycleGateway;
use crate::status::Liveness;

/// Database image ready to be sent as a download
#[derive(Debug)]
pub struct DatabaseExport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("filename pattern is valid"))
}

/// Restarts the proxy when dropped unless `finish` ran first.
///
/// Armed before an import starts so that a panic inside the store still
/// restarts the proxy.
struct RestartGuard {
    lifecycle: Option<LifecycleGateway>,
    liveness: Arc<Liveness>,
}

impl RestartGuard {
    fn arm(lifecycle: LifecycleGateway, liveness: Arc<Liveness>) -> Self {
        Self {
            lifecycle: Some(lifecycle),
            liveness,
        }
    }

    async fn finish(mut self) -> PanelResult<()> {
        self.liveness.touch();
        match self.lifecycle.take() {
            Some(lifecycle) => lifecycle.restart().await,
            None => Ok(()),
        }
    }
}

impl Drop for RestartGuard {
    fn drop(&mut self) {
        let Some(lifecycle) = self.lifecycle.take() else {
            return;
        };

        self.liveness.touch();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lifecycle.restart().await {
                        tracing::error!("Failed to restart proxy after aborted import: {}", e);
                    }
                });
            }
            Err(_) => tracing::error!("No runtime available to restart proxy after aborted import"),
        }
    }
}

/// Database export and import. Every import is followed by a proxy restart.
pub struct BackupManager {
    store: Arc<dyn DatabaseStore>,
    lifecycle: LifecycleGateway,
    liveness: Arc<Liveness>,
    export_filename: String,
    escalate_restart_failure: bool,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn DatabaseStore>,
        lifecycle: LifecycleGateway,
        liveness: Arc<Liveness>,
        export_filename: String,
        escalate_restart_failure: bool,
    ) -> Self {
        Self {
            store,
            lifecycle,
            liveness,
            export_filename,
            escalate_restart_failure,
        }
    }

    pub async fn export(&self) -> PanelResult<DatabaseExport> {
        if !filename_pattern().is_match(&self.export_filename) {
            return Err(PanelError::InvalidFilename(self.export_filename.clone()));
        }

        let bytes = self.store.export_database().await?;
        tracing::info!("Exported database ({} bytes)", bytes.len());

        Ok(DatabaseExport {
            filename: self.export_filename.clone(),
            bytes,
        })
    }

    /// Replace the live database with `image`, then restart the proxy whatever the outcome.
    ///
    /// Runs on its own task: a caller that goes away does not interrupt the
    /// import or the restart that follows it.
    pub async fn import(&self, image: Vec<u8>) -> PanelResult<()> {
        let store = self.store.clone();
        let guard = RestartGuard::arm(self.lifecycle.clone(), self.liveness.clone());
        let escalate = self.escalate_restart_failure;

        let task = tokio::spawn(async move {
            let imported = store.import_database(image).await;
            let restarted = guard.finish().await;

            match (imported, restarted) {
                (Ok(()), Ok(())) => {
                    tracing::info!("Database imported");
                    Ok(())
                }
                (Ok(()), Err(e)) if escalate => Err(PanelError::InconsistentState {
                    restart: anyhow::Error::from(e),
                }),
                (Ok(()), Err(e)) => {
                    tracing::warn!("Database imported but proxy restart failed: {}", e);
                    Ok(())
                }
                (Err(e), restarted) => {
                    if let Err(r) = restarted {
                        tracing::warn!("Proxy restart after failed import also failed: {}", r);
                    }
                    tracing::error!("Database import failed: {:#}", e);
                    Err(PanelError::Upstream(e))
                }
            }
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(PanelError::TaskFailed(e.to_string())),
        }
    }
}
