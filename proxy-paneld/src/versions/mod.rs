pub mod feed;

use std::sync::Arc;
use std::time::Duration;
use crate::collaborators::VersionSource;
use crate::error::PanelResult;
use crate::ttl_cache::TtlCache;

/// Installable proxy versions, fetched at most once per TTL.
pub struct VersionCatalog {
    source: Arc<dyn VersionSource>,
    cache: TtlCache<Vec<String>>,
    ttl: Duration,
}

impl VersionCatalog {
    pub fn new(source: Arc<dyn VersionSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(),
            ttl,
        }
    }

    pub async fn versions(&self) -> PanelResult<Vec<String>> {
        let source = &self.source;
        let versions = self
            .cache
            .get(self.ttl, move || async move {
                tracing::debug!("Version list expired, fetching");
                source.list_versions().await
            })
            .await?;
        Ok(versions)
    }
}
