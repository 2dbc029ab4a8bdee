use std::path::PathBuf;
use anyhow::{Context, Result};
use async_trait::async_trait;
use crate::collaborators::ConfigSource;

/// The proxy's JSON configuration file on disk.
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ConfigSource for ConfigFile {
    async fn read_config(&self) -> Result<serde_json::Value> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read proxy config: {}", self.path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse proxy config: {}", self.path.display()))
    }
}
