//! Content-based classification of downloaded archives.
//!
//! Titles and URL extensions of catalog items are not trustworthy, so the
//! payload kind is decided from the entry names inside the archive.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::PathsConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    /// Not declared by the catalog; decided by sniffing the archive.
    #[default]
    Unknown,
    ChannelList,
    Picon,
    BouquetReference,
    M3UPlaylist,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Unknown => "unknown",
            PayloadKind::ChannelList => "channel list",
            PayloadKind::Picon => "picon",
            PayloadKind::BouquetReference => "bouquet",
            PayloadKind::M3UPlaylist => "M3U playlist",
        };
        f.write_str(name)
    }
}

/// What to do with an archive that matches neither signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownContentPolicy {
    /// Treat as a channel list. Placement only copies channel files, so an
    /// unrelated archive installs nothing.
    #[default]
    ChannelList,
    Reject,
}

impl UnknownContentPolicy {
    pub fn resolve(self) -> Option<PayloadKind> {
        match self {
            UnknownContentPolicy::ChannelList => Some(PayloadKind::ChannelList),
            UnknownContentPolicy::Reject => None,
        }
    }
}

/// Apply the signature rules in order. Returns `None` when no rule matches.
///
/// 1. `*.tv`, `*lamedb*` or `*bouquets.*` anywhere -> channel list
/// 2. `*.png` or a `picon/` path segment anywhere -> picon
pub fn classify_entries<S: AsRef<str>>(entries: &[S]) -> Option<PayloadKind> {
    let lowered: Vec<String> = entries
        .iter()
        .map(|e| e.as_ref().replace('\\', "/").to_lowercase())
        .collect();

    if lowered.iter().any(|name| is_channel_signature(name)) {
        return Some(PayloadKind::ChannelList);
    }

    if lowered.iter().any(|name| is_picon_signature(name)) {
        return Some(PayloadKind::Picon);
    }

    None
}

fn is_channel_signature(name: &str) -> bool {
    name.ends_with(".tv") || name.contains("lamedb") || name.contains("bouquets.")
}

fn is_picon_signature(name: &str) -> bool {
    name.ends_with(".png") || name.starts_with("picon/") || name.contains("/picon/")
}

/// Whether a file (by its own name) belongs in the channel-list root.
pub fn is_channel_list_file(file_name: &str) -> bool {
    let name = file_name.to_lowercase();
    name.ends_with(".tv") || name.starts_with("lamedb") || name.starts_with("bouquets.")
}

/// Whether a file is part of the channel-list state captured by backups.
pub fn is_backup_candidate(file_name: &str) -> bool {
    file_name == "lamedb" || file_name.ends_with(".tv") || file_name.ends_with(".radio")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementStrategy {
    /// Move everything, lifting a nested `picon/` directory one level.
    FlattenPicons,
    /// Copy only channel-list files, flattened by file name.
    SelectChannelFiles,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallationTarget {
    pub root: PathBuf,
    pub strategy: PlacementStrategy,
}

impl InstallationTarget {
    /// Resolve where archive content of `kind` goes. Only archive kinds have
    /// a target; bouquet and playlist items are written by the bouquet installer.
    pub fn for_kind(kind: PayloadKind, paths: &PathsConfig) -> Option<Self> {
        match kind {
            PayloadKind::ChannelList => Some(Self {
                root: paths.channel_root.clone(),
                strategy: PlacementStrategy::SelectChannelFiles,
            }),
            PayloadKind::Picon => Some(Self {
                root: paths.picon_root.clone(),
                strategy: PlacementStrategy::FlattenPicons,
            }),
            _ => None,
        }
    }
}
