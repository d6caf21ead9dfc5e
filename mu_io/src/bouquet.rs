//! User bouquets from playlists and raw bouquet files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use mu_core::bouquet::{
    bouquet_file_name, is_bouquet_document, parse_m3u, register_in_index, render_bouquet,
    sanitize_bouquet_id,
};
use mu_core::{InstallError, PayloadKind};

use crate::fetch::StagingArchive;

const BOUQUET_INDEX: &str = "bouquets.tv";

/// Naming of the bouquet being installed.
#[derive(Clone, Copy, Debug)]
pub struct BouquetDetails<'a> {
    pub title: &'a str,
    pub bouquet_id: Option<&'a str>,
    pub bouquet_name: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BouquetOutcome {
    pub file: PathBuf,
    /// Channels written, `None` for a bouquet copied as-is.
    pub channels: Option<usize>,
    /// Whether `bouquets.tv` gained a new reference.
    pub registered: bool,
}

#[derive(Clone, Debug)]
pub struct BouquetInstaller {
    channel_root: PathBuf,
}

impl BouquetInstaller {
    pub fn new(channel_root: PathBuf) -> Self {
        Self { channel_root }
    }

    /// Write the staged playlist or bouquet as `userbouquet.<id>.tv` and
    /// register it. The staging file is removed whatever the outcome.
    pub fn install(
        &self,
        staged: &StagingArchive,
        kind: PayloadKind,
        details: BouquetDetails<'_>,
    ) -> Result<BouquetOutcome, InstallError> {
        let result = self.install_staged(staged, kind, details);
        staged.discard();
        result
    }

    fn install_staged(
        &self,
        staged: &StagingArchive,
        kind: PayloadKind,
        details: BouquetDetails<'_>,
    ) -> Result<BouquetOutcome, InstallError> {
        if !matches!(kind, PayloadKind::M3UPlaylist | PayloadKind::BouquetReference) {
            return Err(InstallError::UnsupportedKind { kind });
        }

        let bytes = fs::read(&staged.local_path).map_err(|e| InstallError::MissingPrerequisite {
            what: format!("staging file {}: {e}", staged.local_path.display()),
        })?;
        let text = String::from_utf8_lossy(&bytes);

        let id = details
            .bouquet_id
            .and_then(sanitize_bouquet_id)
            .or_else(|| sanitize_bouquet_id(details.title))
            .ok_or_else(|| InstallError::Placement {
                message: format!("no usable bouquet id for '{}'", details.title),
            })?;

        let (content, channels) = if kind == PayloadKind::M3UPlaylist {
            let playlist = parse_m3u(&text);
            if playlist.is_empty() {
                return Err(InstallError::Placement {
                    message: "playlist contains no channels".to_string(),
                });
            }
            let name = details.bouquet_name.unwrap_or(details.title);
            (render_bouquet(name, &playlist), Some(playlist.len()))
        } else {
            if !is_bouquet_document(&text) {
                return Err(InstallError::Placement {
                    message: "downloaded file is not a bouquet (missing #NAME)".to_string(),
                });
            }
            (text.trim_start_matches('\u{feff}').to_string(), None)
        };

        if self.channel_root.exists() && !self.channel_root.is_dir() {
            return Err(InstallError::MissingPrerequisite {
                what: format!("{} is not a directory", self.channel_root.display()),
            });
        }
        fs::create_dir_all(&self.channel_root).map_err(|e| InstallError::MissingPrerequisite {
            what: format!("cannot create {}: {e}", self.channel_root.display()),
        })?;

        let file_name = bouquet_file_name(&id);
        let file = self.channel_root.join(&file_name);
        write_file(&file, &content)?;
        debug!(file = %file.display(), ?channels, "bouquet written");

        let registered = self.register(&file_name)?;
        info!(file = %file.display(), registered, "bouquet installed");

        Ok(BouquetOutcome {
            file,
            channels,
            registered,
        })
    }

    fn register(&self, file_name: &str) -> Result<bool, InstallError> {
        let index_path = self.channel_root.join(BOUQUET_INDEX);
        let existing = match fs::read_to_string(&index_path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(InstallError::Placement {
                    message: format!("cannot read {}: {e}", index_path.display()),
                });
            }
        };

        match register_in_index(existing.as_deref(), file_name) {
            Some(updated) => {
                write_file(&index_path, &updated)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), InstallError> {
    fs::write(path, content).map_err(|e| InstallError::Placement {
        message: format!("cannot write {}: {e}", path.display()),
    })
}
