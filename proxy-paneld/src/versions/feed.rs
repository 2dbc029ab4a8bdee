use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use crate::collaborators::VersionSource;
use crate::config::VersionsConfig;

#[derive(Deserialize)]
struct Release {
    tag_name: String,
}

/// Reads proxy releases from a GitHub-style releases endpoint.
pub struct ReleaseFeed {
    client: reqwest::Client,
    url: String,
    min_version: Option<Vec<u64>>,
}

impl ReleaseFeed {
    pub fn new(config: &VersionsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("proxy-paneld/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let min_version = match &config.min_version {
            Some(v) => Some(
                parse_version(v).with_context(|| format!("Invalid min_version: {}", v))?,
            ),
            None => None,
        };

        Ok(Self {
            client,
            url: config.feed_url.clone(),
            min_version,
        })
    }
}

/// Parse "v1.8.4" / "1.8.4" into numeric components
fn parse_version(tag: &str) -> Option<Vec<u64>> {
    tag.trim_start_matches('v')
        .split('.')
        .map(|part| part.parse().ok())
        .collect()
}

/// Keep tags in feed order, dropping unparseable ones and anything below `min`
fn select_versions(releases: Vec<Release>, min: Option<&[u64]>) -> Vec<String> {
    releases
        .into_iter()
        .filter(|r| match (parse_version(&r.tag_name), min) {
            (Some(v), Some(min)) => v.as_slice() >= min,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .map(|r| r.tag_name)
        .collect()
}

#[async_trait]
impl VersionSource for ReleaseFeed {
    async fn list_versions(&self) -> Result<Vec<String>> {
        let releases: Vec<Release> = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", self.url))?
            .error_for_status()
            .context("Release feed returned an error")?
            .json()
            .await
            .context("Failed to parse release feed")?;

        let versions = select_versions(releases, self.min_version.as_deref());
        tracing::debug!("Release feed returned {} versions", versions.len());
        Ok(versions)
    }
}
