//! Install orchestration: fetch, detect, install, reload.
//!
//! One run is a sequence of awaited steps that stops at the first failure.
//! Archive inspection and file placement run on the blocking pool. The staged
//! download is removed on every exit path.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use mu_core::{CatalogEntry, Error, InstallError, PayloadKind, ReloadError, UpdaterConfig};

use crate::backup::BackupRecord;
use crate::bouquet::{BouquetDetails, BouquetInstaller};
use crate::detect::ArchiveTypeDetector;
use crate::fetch::{ArchiveFetcher, StagingArchive};
use crate::install::{InstallOptions, Installer};
use crate::process::ProcessRunner;
use crate::reload::ReloadNotifier;
use crate::traits::HttpClient;

/// What to install. `kind` is the catalog's declaration; `Unknown` and the
/// archive kinds are all sniffed from content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallRequest {
    pub title: String,
    pub url: String,
    pub kind: PayloadKind,
    pub bouquet_id: Option<String>,
    pub bouquet_name: Option<String>,
}

impl InstallRequest {
    /// An archive whose payload is detected after download.
    pub fn archive(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            kind: PayloadKind::Unknown,
            bouquet_id: None,
            bouquet_name: None,
        }
    }
}

impl From<&CatalogEntry> for InstallRequest {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            title: entry.name.clone(),
            url: entry.source_url.clone(),
            kind: entry.payload_kind,
            bouquet_id: entry.bouquet_id.clone(),
            bouquet_name: entry.bouquet_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReloadStatus {
    NotRequired,
    Reloaded,
    /// The install itself succeeded.
    Failed(ReloadError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallReport {
    pub kind: PayloadKind,
    pub files_placed: usize,
    pub backup: Option<BackupRecord>,
    pub reload: ReloadStatus,
}

/// Removes the staged download when dropped.
struct StagingGuard(PathBuf);

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.0.display(), error = %e, "failed to remove staging file");
        }
    }
}

fn task_failed(e: tokio::task::JoinError) -> Error {
    Error::Install(InstallError::Placement {
        message: format!("installation task failed: {e}"),
    })
}

pub struct InstallPipeline {
    fetcher: ArchiveFetcher,
    detector: ArchiveTypeDetector,
    installer: Installer,
    bouquets: BouquetInstaller,
    notifier: ReloadNotifier,
}

impl InstallPipeline {
    pub fn new(
        fetcher: ArchiveFetcher,
        detector: ArchiveTypeDetector,
        installer: Installer,
        bouquets: BouquetInstaller,
        notifier: ReloadNotifier,
    ) -> Self {
        Self {
            fetcher,
            detector,
            installer,
            bouquets,
            notifier,
        }
    }

    /// Wire every component from `config`, reloading as configured.
    pub fn from_config(
        config: &UpdaterConfig,
        http: Arc<dyn HttpClient>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let notifier = ReloadNotifier::from_config(&config.reload, http.clone(), runner);
        Self::from_parts(config, http, notifier)
    }

    pub fn from_parts(
        config: &UpdaterConfig,
        http: Arc<dyn HttpClient>,
        notifier: ReloadNotifier,
    ) -> Self {
        Self::new(
            ArchiveFetcher::new(
                http,
                config.paths.staging_dir.clone(),
                config.fetch.clone(),
            ),
            ArchiveTypeDetector::new(config.detection.unknown_policy),
            Installer::new(config.paths.clone()),
            BouquetInstaller::new(config.paths.channel_root.clone()),
            notifier,
        )
    }

    pub async fn run(&self, request: InstallRequest) -> Result<InstallReport, Error> {
        info!(title = %request.title, url = %request.url, "install requested");

        let staged = self.fetcher.fetch_to_staging(&request.url).await?;
        let _guard = StagingGuard(staged.local_path.clone());

        let (kind, files_placed, backup) = match request.kind {
            PayloadKind::M3UPlaylist | PayloadKind::BouquetReference => {
                self.install_bouquet(&request, staged).await?
            }
            _ => self.install_archive(staged).await?,
        };

        let reload = self.reload_after(kind).await;
        info!(title = %request.title, %kind, files_placed, ?reload, "install finished");

        Ok(InstallReport {
            kind,
            files_placed,
            backup,
            reload,
        })
    }

    async fn install_archive(
        &self,
        staged: StagingArchive,
    ) -> Result<(PayloadKind, usize, Option<BackupRecord>), Error> {
        let detector = self.detector;
        let installer = self.installer.clone();

        let outcome = tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let (listing, kind) = detector.inspect(&staged.local_path)?;
            let opts = InstallOptions {
                format: Some(listing.format),
                ..InstallOptions::default()
            };
            Ok(installer.install(&staged, kind, &opts)?)
        })
        .await
        .map_err(task_failed)??;

        Ok((outcome.kind, outcome.files_placed, outcome.backup))
    }

    async fn install_bouquet(
        &self,
        request: &InstallRequest,
        staged: StagingArchive,
    ) -> Result<(PayloadKind, usize, Option<BackupRecord>), Error> {
        let bouquets = self.bouquets.clone();
        let request = request.clone();
        let kind = request.kind;

        tokio::task::spawn_blocking(move || {
            let details = BouquetDetails {
                title: &request.title,
                bouquet_id: request.bouquet_id.as_deref(),
                bouquet_name: request.bouquet_name.as_deref(),
            };
            bouquets.install(&staged, request.kind, details)
        })
        .await
        .map_err(task_failed)??;

        Ok((kind, 1, None))
    }

    async fn reload_after(&self, kind: PayloadKind) -> ReloadStatus {
        match kind {
            PayloadKind::ChannelList | PayloadKind::M3UPlaylist | PayloadKind::BouquetReference => {
                match self.notifier.reload().await {
                    Ok(()) => ReloadStatus::Reloaded,
                    Err(e) => {
                        warn!(error = %e, "reload failed after install");
                        ReloadStatus::Failed(e)
                    }
                }
            }
            _ => ReloadStatus::NotRequired,
        }
    }

    /// Run `request` in the background and hand the result to `on_complete`
    /// exactly once.
    pub fn submit<F>(self: &Arc<Self>, request: InstallRequest, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<InstallReport, Error>) + Send + 'static,
    {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let result = pipeline.run(request).await;
            if let Err(e) = &result {
                warn!(error = %e, "install failed");
            }
            on_complete(result);
        })
    }

    pub fn submit_with_channel(
        self: &Arc<Self>,
        request: InstallRequest,
    ) -> oneshot::Receiver<Result<InstallReport, Error>> {
        let (tx, rx) = oneshot::channel();
        self.submit(request, move |result| {
            let _ = tx.send(result);
        });
        rx
    }
}
