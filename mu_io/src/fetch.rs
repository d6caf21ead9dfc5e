use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use mu_core::FetchError;
use mu_core::catalog::url_basename;
use mu_core::config::FetchConfig;

use crate::traits::HttpClient;

/// A completed download waiting in the staging directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingArchive {
    pub local_path: PathBuf,
    pub source_url: String,
    pub size_bytes: u64,
}

impl StagingArchive {
    /// Delete the staged file. Missing files are not an error.
    pub fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.local_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.local_path.display(), error = %e, "failed to remove staging file");
        }
    }
}

/// Staging file name for `url`: the sanitized basename with a short digest of
/// the full URL spliced in before the extension, so distinct URLs sharing a
/// basename never share a staging file.
pub fn staging_file_name(url: &str) -> String {
    let sanitized: String = url_basename(url)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim_start_matches('.');
    let base = if trimmed.is_empty() { "download" } else { trimmed };
    let tag = url_tag(url.trim());

    match base.split_once('.') {
        Some((stem, ext)) if !ext.is_empty() => format!("{stem}.{tag}.{ext}"),
        _ => format!("{}.{tag}", base.trim_end_matches('.')),
    }
}

fn url_tag(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{:x}", digest).chars().take(12).collect()
}

#[derive(Clone)]
pub struct ArchiveFetcher {
    http: Arc<dyn HttpClient>,
    staging_dir: PathBuf,
    config: FetchConfig,
}

impl ArchiveFetcher {
    pub fn new(http: Arc<dyn HttpClient>, staging_dir: PathBuf, config: FetchConfig) -> Self {
        Self {
            http,
            staging_dir,
            config,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Download `url` into the staging directory using the configured policy.
    pub async fn fetch_to_staging(&self, url: &str) -> Result<StagingArchive, FetchError> {
        let destination = self.staging_dir.join(staging_file_name(url));
        self.fetch(
            url,
            &destination,
            self.config.timeout(),
            self.config.max_retries,
        )
        .await
    }

    /// Download `url` to `destination`, trying `1 + max_retries` times with the
    /// same timeout each time.
    ///
    /// On error nothing is left at `destination`.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<StagingArchive, FetchError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        if destination.parent() != Some(self.staging_dir.as_path()) {
            return Err(FetchError::Staging {
                path: destination.to_path_buf(),
                message: format!(
                    "destination must be inside {}",
                    self.staging_dir.display()
                ),
            });
        }

        fs::create_dir_all(&self.staging_dir).map_err(|e| FetchError::Staging {
            path: self.staging_dir.clone(),
            message: e.to_string(),
        })?;

        // A leftover from an earlier run must not be mistaken for this download.
        if destination.exists() {
            let _ = fs::remove_file(destination);
        }

        let attempts = max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(url, attempt, attempts, "downloading");

            let part = StagingFile::reserve(destination);
            let result = self.http.download(url, timeout, part.path()).await;
            match result {
                Ok(0) => {
                    last_error = Some(FetchError::EmptyResult {
                        url: url.to_string(),
                    });
                }
                Ok(size_bytes) => {
                    let local_path = part.commit()?;

                    info!(url, path = %local_path.display(), size_bytes, "download complete");
                    return Ok(StagingArchive {
                        local_path,
                        source_url: url.to_string(),
                        size_bytes,
                    });
                }
                Err(e) => last_error = Some(e),
            }

            if attempt < attempts
                && let Some(e) = &last_error
            {
                warn!(url, attempt, error = %e, "download failed, retrying");
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Network {
            url: url.to_string(),
            message: "no download attempt was made".to_string(),
        }))
    }
}

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A uniquely named `.part` path next to the final destination. The body is
/// streamed into it and it is renamed into place on commit. Dropping an
/// uncommitted file removes whatever was written.
struct StagingFile {
    tmp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl StagingFile {
    fn reserve(final_path: &Path) -> Self {
        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let unique = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = final_path.with_file_name(format!(
            ".{file_name}.{}.{unique}.part",
            std::process::id()
        ));

        Self {
            tmp_path,
            final_path: final_path.to_path_buf(),
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.tmp_path
    }

    fn commit(mut self) -> Result<PathBuf, FetchError> {
        fs::rename(&self.tmp_path, &self.final_path).map_err(|e| FetchError::Staging {
            path: self.final_path.clone(),
            message: format!("failed to rename: {e}"),
        })?;

        self.committed = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.committed && self.tmp_path.exists() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}
