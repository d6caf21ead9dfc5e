use std::sync::Arc;

use tracing::{debug, info, warn};

use mu_core::catalog::{merge_entries, parse_legacy_list, parse_manifest};
use mu_core::config::CatalogConfig;
use mu_core::{CatalogEntry, CatalogError};

use crate::traits::HttpClient;

/// Builds the install menu from the JSON manifest and the legacy list.
#[derive(Clone)]
pub struct CatalogAggregator {
    http: Arc<dyn HttpClient>,
    config: CatalogConfig,
}

impl CatalogAggregator {
    pub fn new(http: Arc<dyn HttpClient>, config: CatalogConfig) -> Self {
        Self { http, config }
    }

    /// Fetch both sources concurrently and merge them, manifest first.
    ///
    /// A source that cannot be fetched or parsed contributes nothing.
    pub async fn list_available(&self) -> Vec<CatalogEntry> {
        let (manifest, legacy) = tokio::join!(self.manifest_entries(), self.legacy_entries());

        let manifest = degrade("manifest", manifest);
        let legacy = degrade("legacy list", legacy);
        let (from_manifest, from_legacy) = (manifest.len(), legacy.len());

        let entries = merge_entries([manifest, legacy], &self.config.denylist);
        info!(
            from_manifest,
            from_legacy,
            total = entries.len(),
            "catalog loaded"
        );
        entries
    }

    async fn manifest_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        match self.fetch_text("manifest", &self.config.manifest_url).await? {
            Some(body) => parse_manifest(&body),
            None => Ok(Vec::new()),
        }
    }

    async fn legacy_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        Ok(self
            .fetch_text("legacy list", &self.config.legacy_url)
            .await?
            .map(|body| parse_legacy_list(&body))
            .unwrap_or_default())
    }

    /// `None` when the source is disabled by an empty URL.
    async fn fetch_text(&self, source: &str, url: &str) -> Result<Option<String>, CatalogError> {
        let url = url.trim();
        if url.is_empty() {
            debug!(source, "catalog source disabled");
            return Ok(None);
        }

        let body = self
            .http
            .get(url, self.config.timeout())
            .await
            .map_err(|e| CatalogError::Fetch {
                source: source.to_string(),
                message: e.to_string(),
            })?;

        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }
}

fn degrade(source: &str, result: Result<Vec<CatalogEntry>, CatalogError>) -> Vec<CatalogEntry> {
    result.unwrap_or_else(|e| {
        warn!(source, error = %e, "catalog source skipped");
        Vec::new()
    })
}
