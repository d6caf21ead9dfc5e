//! Archive installation
//!
//! Installs a staged archive whose payload kind is already known:
//!
//! - `place` - moving picons and selecting channel-list files out of the
//!   extraction tree
//!
//! The installer never decides where content goes from user input. The
//! destination comes from [`InstallationTarget::for_kind`].

mod place;

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::Local;
use tracing::{debug, info, warn};

use mu_core::config::PathsConfig;
use mu_core::{InstallError, InstallationTarget, PayloadKind, PlacementStrategy};

use crate::backup::{BackupRecord, create_backup};
use crate::detect::{ArchiveFormat, probe};
use crate::extract::extract_archive;
use crate::fetch::StagingArchive;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallOptions {
    /// Snapshot the channel list before overwriting it.
    pub backup: bool,
    /// Format from an earlier probe. Probed again when `None`.
    pub format: Option<ArchiveFormat>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            backup: true,
            format: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallOutcome {
    pub kind: PayloadKind,
    pub files_placed: usize,
    pub backup: Option<BackupRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InstallStage {
    Start,
    Backup,
    Extract,
    Place,
    Cleanup,
    Done,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Start => "start",
            InstallStage::Backup => "backup",
            InstallStage::Extract => "extract",
            InstallStage::Place => "place",
            InstallStage::Cleanup => "cleanup",
            InstallStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct Installer {
    paths: PathsConfig,
}

impl Installer {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    /// Install `archive` as `kind`.
    ///
    /// The staging archive and the extraction directory are removed whatever
    /// the outcome.
    pub fn install(
        &self,
        archive: &StagingArchive,
        kind: PayloadKind,
        opts: &InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        let result = self.install_staged(archive, kind, opts);

        stage(InstallStage::Cleanup, archive);
        archive.discard();

        match &result {
            Ok(outcome) => {
                stage(InstallStage::Done, archive);
                info!(
                    url = %archive.source_url,
                    %kind,
                    files = outcome.files_placed,
                    "install complete"
                );
            }
            Err(e) => warn!(url = %archive.source_url, %kind, error = %e, "install failed"),
        }

        result
    }

    fn install_staged(
        &self,
        archive: &StagingArchive,
        kind: PayloadKind,
        opts: &InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        let target = InstallationTarget::for_kind(kind, &self.paths)
            .ok_or(InstallError::UnsupportedKind { kind })?;

        stage(InstallStage::Start, archive);
        if !archive.local_path.is_file() {
            return Err(InstallError::MissingPrerequisite {
                what: format!("staging archive {}", archive.local_path.display()),
            });
        }
        ensure_dir(&target.root)?;
        ensure_dir(&self.paths.staging_dir)?;

        let backup = if kind == PayloadKind::ChannelList && opts.backup {
            stage(InstallStage::Backup, archive);
            match create_backup(&self.paths.channel_root, &self.paths.backup_dir, Local::now()) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "channel list backup failed, continuing");
                    None
                }
            }
        } else {
            None
        };

        stage(InstallStage::Extract, archive);
        let format = match opts.format {
            Some(format) => format,
            None => {
                probe(&archive.local_path)
                    .map_err(|e| InstallError::Extraction {
                        path: archive.local_path.clone(),
                        message: e.to_string(),
                    })?
                    .format
            }
        };
        let extract_dir = tempfile::Builder::new()
            .prefix("extract-")
            .tempdir_in(&self.paths.staging_dir)
            .map_err(|e| InstallError::Extraction {
                path: archive.local_path.clone(),
                message: format!("failed to create extraction directory: {e}"),
            })?;
        extract_archive(&archive.local_path, format, extract_dir.path())?;

        stage(InstallStage::Place, archive);
        let files_placed = match target.strategy {
            PlacementStrategy::FlattenPicons => {
                place::place_picons(extract_dir.path(), &target.root)?
            }
            PlacementStrategy::SelectChannelFiles => {
                place::place_channel_files(extract_dir.path(), &target.root)?
            }
        };

        Ok(InstallOutcome {
            kind,
            files_placed,
            backup,
        })
    }
}

fn stage(stage: InstallStage, archive: &StagingArchive) {
    debug!(%stage, path = %archive.local_path.display(), "install stage");
}

fn ensure_dir(dir: &Path) -> Result<(), InstallError> {
    if dir.exists() && !dir.is_dir() {
        return Err(InstallError::MissingPrerequisite {
            what: format!("{} is not a directory", dir.display()),
        });
    }
    fs::create_dir_all(dir).map_err(|e| InstallError::MissingPrerequisite {
        what: format!("cannot create {}: {e}", dir.display()),
    })
}

#[cfg(test)]
mod tests;
