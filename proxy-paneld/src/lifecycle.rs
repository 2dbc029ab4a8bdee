use std::sync::Arc;
use crate::collaborators::Supervisor;
use crate::error::PanelResult;
use crate::status::Liveness;

/// Forwards lifecycle requests to the supervisor. Failures pass through unchanged.
#[derive(Clone)]
pub struct LifecycleGateway {
    supervisor: Arc<dyn Supervisor>,
    liveness: Arc<Liveness>,
}

impl LifecycleGateway {
    pub fn new(supervisor: Arc<dyn Supervisor>, liveness: Arc<Liveness>) -> Self {
        Self { supervisor, liveness }
    }

    /// Stop the proxy. Counts as interest in the status so polling picks the change up.
    pub async fn stop(&self) -> PanelResult<()> {
        self.liveness.touch();
        self.supervisor.stop().await?;
        tracing::info!("Proxy stopped");
        Ok(())
    }

    pub async fn restart(&self) -> PanelResult<()> {
        self.supervisor.restart().await?;
        tracing::info!("Proxy restarted");
        Ok(())
    }

    pub async fn install(&self, version: &str) -> PanelResult<()> {
        self.supervisor.install(version).await?;
        tracing::info!("Installed proxy {}", version);
        Ok(())
    }
}
