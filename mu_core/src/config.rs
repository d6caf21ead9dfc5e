//! Updater configuration.
//!
//! Every component receives the section it needs at construction time.
//! All fields have defaults matching a stock enigma2 image, so an empty JSON
//! object is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::payload::UnknownContentPolicy;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub paths: PathsConfig,
    pub fetch: FetchConfig,
    pub catalog: CatalogConfig,
    pub detection: DetectionConfig,
    pub reload: ReloadConfig,
    pub update: UpdateConfig,
}

impl UpdaterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub staging_dir: PathBuf,
    pub channel_root: PathBuf,
    pub picon_root: PathBuf,
    pub backup_dir: PathBuf,
    /// Where softcam binaries live.
    pub bin_dir: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("/tmp/MyUpdater"),
            channel_root: PathBuf::from("/etc/enigma2"),
            picon_root: PathBuf::from("/usr/share/enigma2/picon"),
            backup_dir: PathBuf::from("/tmp/MyUpdater/backups"),
            bin_dir: PathBuf::from("/usr/bin"),
            log_file: Some(PathBuf::from("/tmp/MyUpdater_install.log")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Extra attempts after the first one.
    pub max_retries: u32,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub manifest_url: String,
    pub legacy_url: String,
    pub timeout_secs: u64,
    /// Entries whose display name contains any of these (case-insensitive) are dropped.
    pub denylist: Vec<String>,
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            manifest_url:
                "https://raw.githubusercontent.com/OliOli2013/PanelAIO-Lists/main/manifest.json"
                    .to_string(),
            legacy_url: "http://s4aupdater.one.pl/s4aupdater_list.txt".to_string(),
            timeout_secs: 20,
            denylist: vec!["bzyk".to_string(), "jakitaki".to_string()],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub unknown_policy: UnknownContentPolicy,
}

/// How the running service is told to reload its channel database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadConfig {
    /// OpenWebif base URL.
    WebIf { base_url: String },
    /// Commands run through the process runner, service list first.
    Commands {
        service_list: Vec<String>,
        bouquets: Vec<String>,
        timeout_secs: u64,
    },
}

impl Default for ReloadConfig {
    fn default() -> Self {
        ReloadConfig::WebIf {
            base_url: "http://127.0.0.1".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub version_url: String,
    pub installer_url: String,
    pub current_version: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            version_url:
                "https://raw.githubusercontent.com/OliOli2013/MyUpdater-Plugin/main/version.txt"
                    .to_string(),
            installer_url:
                "https://raw.githubusercontent.com/OliOli2013/MyUpdater-Plugin/main/installer.sh"
                    .to_string(),
            current_version: "V5 Enhanced".to_string(),
        }
    }
}
