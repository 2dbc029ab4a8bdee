use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_EXPORT_FILENAME;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub versions: VersionsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Path to the proxy binary
    pub binary: PathBuf,
    /// Proxy configuration file, passed as `run -c <config>`
    pub config: PathBuf,
    /// Log file the proxy writes to
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Systemd unit queried when logs are read from the journal
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Installer invoked as `<installer...> <version>`
    #[serde(default)]
    pub installer: Vec<String>,
    /// Start the proxy when the daemon starts
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Polling stops once nobody has read the status for this long
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionsConfig {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_versions_ttl")]
    pub ttl_secs: u64,
    /// Oldest release offered for installation, e.g. "1.8.0"
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_export_filename")]
    pub export_filename: String,
    /// Report a failed restart after a successful import instead of only logging it
    #[serde(default)]
    pub escalate_restart_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/var/log/proxy-panel/proxy.log")
}

fn default_unit() -> String {
    "proxy-panel".to_string()
}

fn default_autostart() -> bool {
    true
}

fn default_tick_millis() -> u64 {
    2000
}

fn default_idle_secs() -> u64 {
    180
}

fn default_feed_url() -> String {
    "https://api.github.com/repos/XTLS/Xray-core/releases".to_string()
}

fn default_versions_ttl() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    10
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/etc/proxy-panel/panel.db")
}

fn default_export_filename() -> String {
    DEFAULT_EXPORT_FILENAME.to_string()
}

fn default_listen() -> String {
    "[::]:2053".to_string()
}

impl StatusConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl VersionsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            idle_secs: default_idle_secs(),
        }
    }
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            ttl_secs: default_versions_ttl(),
            min_version: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            export_filename: default_export_filename(),
            escalate_restart_failure: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
