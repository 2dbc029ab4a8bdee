//! Narrow interfaces to everything the control surface drives but does not own.
//!
//! The core components only ever hold these as `Arc<dyn Trait>`; the concrete
//! implementations live in `proxy`, `db`, `status::collector` and
//! `versions::feed`.

use anyhow::Result;
use async_trait::async_trait;
use shared::types::{ProcessState, StatusSnapshot};

/// Starts, stops and upgrades the managed proxy process.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn stop(&self) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    /// Fetch and activate `version`. The identifier is validated by the installer.
    async fn install(&self, version: &str) -> Result<()>;

    /// Current run state plus the last error message, if any
    async fn state(&self) -> (ProcessState, Option<String>);

    /// Version reported by the proxy binary
    async fn version(&self) -> Option<String>;
}

/// Produces status snapshots. Never fails: problems are logged and reflected in the snapshot.
#[async_trait]
pub trait StatusCollector: Send + Sync {
    async fn collect_status(&self, previous: Option<&StatusSnapshot>) -> StatusSnapshot;
}

/// Lists proxy versions available for installation, newest first.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn list_versions(&self) -> Result<Vec<String>>;
}

/// Full-database export and validated, atomic replacement.
#[async_trait]
pub trait DatabaseStore: Send + Sync {
    async fn export_database(&self) -> Result<Vec<u8>>;

    async fn import_database(&self, image: Vec<u8>) -> Result<()>;
}

/// Where log lines are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSelector {
    File,
    Journal,
}

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn read_logs(&self, count: usize, level: &str, selector: LogSelector) -> Vec<String>;
}

/// Reads the proxy's own configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn read_config(&self) -> Result<serde_json::Value>;
}

/// Fresh key material for proxy inbounds, returned as JSON objects.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// X25519 key pair for REALITY
    async fn x25519(&self) -> Result<serde_json::Value>;

    /// ML-DSA-65 seed and verification key
    async fn mldsa65(&self) -> Result<serde_json::Value>;

    /// ECH config list and server keys for `sni`
    async fn ech_cert(&self, sni: &str) -> Result<serde_json::Value>;

    /// VLESS encryption/decryption pairs, one per authentication method
    async fn vless_enc(&self) -> Result<serde_json::Value>;
}
