use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use shared::types::ProcessState;
use crate::collaborators::Supervisor;
use crate::config::ProxyConfig;

#[derive(Default)]
struct ProcessSlot {
    child: Option<Child>,
    last_error: Option<String>,
}

/// Runs the proxy binary as a child process of the daemon.
pub struct ProcessSupervisor {
    binary: PathBuf,
    config: PathBuf,
    installer: Vec<String>,
    slot: Mutex<ProcessSlot>,
    // Read when the binary starts or is replaced, not on every status poll
    version: StdMutex<Option<String>>,
}

impl ProcessSupervisor {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            config: config.config.clone(),
            installer: config.installer.clone(),
            slot: Mutex::new(ProcessSlot::default()),
            version: StdMutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.spawn(&mut slot)?;
        drop(slot);

        self.refresh_version().await;
        Ok(())
    }

    /// Shut the proxy down on daemon exit
    pub async fn shutdown(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        Self::kill(&mut slot).await
    }

    fn spawn(&self, slot: &mut ProcessSlot) -> Result<()> {
        if let Some(child) = slot.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                return Ok(());
            }
        }

        let spawned = Command::new(&self.binary)
            .arg("run")
            .arg("-c")
            .arg(&self.config)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary.display()));

        match spawned {
            Ok(child) => {
                tracing::info!("Started proxy (pid {:?})", child.id());
                slot.child = Some(child);
                slot.last_error = None;
                Ok(())
            }
            Err(e) => {
                slot.last_error = Some(format!("{:#}", e));
                Err(e)
            }
        }
    }

    /// Ask the binary for its version and remember the answer
    async fn refresh_version(&self) -> Option<String> {
        let version = self.query_version().await;
        *self.version.lock().unwrap_or_else(|e| e.into_inner()) = version.clone();
        version
    }

    async fn query_version(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        parse_version_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn kill(slot: &mut ProcessSlot) -> Result<()> {
        if let Some(mut child) = slot.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                child.kill().await.context("Failed to stop proxy")?;
            }
        }
        slot.last_error = None;
        Ok(())
    }
}

/// Second token of the first line, e.g. "Xray 1.8.4 (Xray, Penetrates Everything.)" -> "1.8.4"
fn parse_version_output(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn stop(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        Self::kill(&mut slot).await
    }

    async fn restart(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        Self::kill(&mut slot).await?;
        self.spawn(&mut slot)?;
        drop(slot);

        self.refresh_version().await;
        Ok(())
    }

    async fn install(&self, version: &str) -> Result<()> {
        let Some((program, args)) = self.installer.split_first() else {
            bail!("No installer configured");
        };

        tracing::info!("Installing proxy {}", version);
        let output = Command::new(program)
            .args(args)
            .arg(version)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run installer {}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Installer exited with {}: {}", output.status, stderr.trim());
        }

        // Pick up the new binary if the proxy was running
        let mut slot = self.slot.lock().await;
        let running = slot
            .child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)));
        if running {
            Self::kill(&mut slot).await?;
            self.spawn(&mut slot)?;
        }
        drop(slot);

        self.refresh_version().await;
        Ok(())
    }

    async fn state(&self) -> (ProcessState, Option<String>) {
        let mut slot = self.slot.lock().await;

        let exited = match slot.child.as_mut() {
            None => None,
            Some(child) => match child.try_wait() {
                Ok(None) => return (ProcessState::Running, None),
                Ok(Some(status)) => Some(Ok(status)),
                Err(e) => Some(Err(e)),
            },
        };

        match exited {
            Some(Ok(status)) => {
                slot.child = None;
                if !status.success() {
                    slot.last_error = Some(format!("proxy exited with {}", status));
                }
            }
            Some(Err(e)) => {
                slot.child = None;
                slot.last_error = Some(format!("failed to poll proxy: {}", e));
            }
            None => {}
        }

        match &slot.last_error {
            Some(error) => (ProcessState::Error, Some(error.clone())),
            None => (ProcessState::Stopped, None),
        }
    }

    async fn version(&self) -> Option<String> {
        let cached = self.version.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match cached {
            Some(version) => Some(version),
            None => self.refresh_version().await,
        }
    }
}
