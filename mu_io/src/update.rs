use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use mu_core::FetchError;
use mu_core::config::UpdateConfig;

use crate::traits::HttpClient;

const VERSION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    Available {
        online: String,
        installer_url: String,
    },
}

/// Compares the running version with the published `version.txt`.
pub struct UpdateChecker {
    http: Arc<dyn HttpClient>,
    config: UpdateConfig,
}

impl UpdateChecker {
    pub fn new(http: Arc<dyn HttpClient>, config: UpdateConfig) -> Self {
        Self { http, config }
    }

    pub async fn check(&self) -> Result<UpdateStatus, FetchError> {
        let url = self.config.version_url.trim();
        if url.is_empty() {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let body = self.http.get(url, VERSION_TIMEOUT).await?;
        let online = String::from_utf8_lossy(&body).trim().to_string();
        if online.is_empty() {
            return Err(FetchError::EmptyResult {
                url: url.to_string(),
            });
        }

        if online == self.config.current_version.trim() {
            info!(version = %online, "updater is up to date");
            return Ok(UpdateStatus::UpToDate);
        }

        info!(current = %self.config.current_version, %online, "updater update available");
        Ok(UpdateStatus::Available {
            online,
            installer_url: self.config.installer_url.clone(),
        })
    }
}
