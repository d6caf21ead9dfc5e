use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::payload::PayloadKind;

/// Failure to bring a remote resource into the staging directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    InvalidUrl {
        url: String,
    },
    Network {
        url: String,
        message: String,
    },
    HttpStatus {
        url: String,
        status: u16,
    },
    Timeout {
        url: String,
        after: Duration,
    },
    EmptyResult {
        url: String,
    },
    Staging {
        path: PathBuf,
        message: String,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidUrl { url } => {
                write!(f, "invalid download url '{}'", url)
            }
            FetchError::Network { url, message } => {
                write!(
                    f,
                    "download of '{}' failed: {}\n  hint: check the network connection and try again",
                    url, message
                )
            }
            FetchError::HttpStatus { url, status } => {
                write!(f, "download of '{}' failed: HTTP {}", url, status)
            }
            FetchError::Timeout { url, after } => {
                write!(
                    f,
                    "download of '{}' timed out after {}s\n  hint: the server may be slow; try again later",
                    url,
                    after.as_secs()
                )
            }
            FetchError::EmptyResult { url } => {
                write!(f, "download of '{}' returned no data", url)
            }
            FetchError::Staging { path, message } => {
                write!(
                    f,
                    "cannot write staging file '{}': {}",
                    path.display(),
                    message
                )
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Failure to classify a downloaded archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionError {
    Io { path: PathBuf, message: String },
    UnsupportedFormat { path: PathBuf },
    /// No channel-list or picon signature and the unknown-content policy rejects.
    Ambiguous { path: PathBuf, entries: usize },
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionError::Io { path, message } => {
                write!(f, "cannot read archive '{}': {}", path.display(), message)
            }
            DetectionError::UnsupportedFormat { path } => {
                write!(
                    f,
                    "'{}' is not a zip or tar archive\n  hint: the catalog entry may point to a broken or mislabeled file",
                    path.display()
                )
            }
            DetectionError::Ambiguous { path, entries } => {
                write!(
                    f,
                    "cannot tell what '{}' contains ({} entries, no channel list or picon files)",
                    path.display(),
                    entries
                )
            }
        }
    }
}

impl std::error::Error for DetectionError {}

/// Failure while placing content into a live directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallError {
    MissingPrerequisite { what: String },
    UnsupportedKind { kind: PayloadKind },
    Extraction { path: PathBuf, message: String },
    Placement { message: String },
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallError::MissingPrerequisite { what } => {
                write!(
                    f,
                    "installation prerequisite missing: {}\n  hint: check that the image provides it and the target is writable",
                    what
                )
            }
            InstallError::UnsupportedKind { kind } => {
                write!(f, "cannot install {} content with this installer", kind)
            }
            InstallError::Extraction { path, message } => {
                write!(
                    f,
                    "failed to extract '{}': {}\n  hint: the download may be corrupted; try again",
                    path.display(),
                    message
                )
            }
            InstallError::Placement { message } => {
                write!(f, "failed to install files: {}", message)
            }
        }
    }
}

impl std::error::Error for InstallError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReloadError {
    Service { operation: String, message: String },
}

impl fmt::Display for ReloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadError::Service { operation, message } => {
                write!(
                    f,
                    "{} failed: {}\n  hint: restart the receiver to load the new channel list",
                    operation, message
                )
            }
        }
    }
}

impl std::error::Error for ReloadError {}

/// Failure of one catalog source. Never escapes the aggregator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogError {
    Fetch { source: String, message: String },
    Parse { source: String, message: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Fetch { source, message } => {
                write!(f, "failed to fetch catalog {}: {}", source, message)
            }
            CatalogError::Parse { source, message } => {
                write!(f, "failed to parse catalog {}: {}", source, message)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessError {
    Spawn { program: String, message: String },
    Timeout { program: String, after: Duration },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Spawn { program, message } => {
                write!(f, "failed to run '{}': {}", program, message)
            }
            ProcessError::Timeout { program, after } => {
                write!(f, "'{}' did not finish within {}s", program, after.as_secs())
            }
        }
    }
}

impl std::error::Error for ProcessError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    Read { path: PathBuf, message: String },
    Parse { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, message } => {
                write!(f, "cannot read config '{}': {}", path.display(), message)
            }
            ConfigError::Parse { message } => {
                write!(f, "invalid config: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Terminal failure of one pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Fetch(FetchError),
    Detection(DetectionError),
    Install(InstallError),
    Reload(ReloadError),
}

impl Error {
    /// Short message suitable for an on-screen notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Fetch(_) => "Download failed. Check the network connection.",
            Error::Detection(DetectionError::UnsupportedFormat { .. }) => {
                "Unsupported archive format."
            }
            Error::Detection(DetectionError::Ambiguous { .. }) => {
                "The archive does not contain a channel list or picons."
            }
            Error::Detection(DetectionError::Io { .. }) => "The downloaded file cannot be read.",
            Error::Install(InstallError::MissingPrerequisite { .. }) => {
                "A required installer component is missing."
            }
            Error::Install(InstallError::UnsupportedKind { .. }) => {
                "This kind of content cannot be installed."
            }
            Error::Install(InstallError::Extraction { .. }) => "Unpacking the archive failed.",
            Error::Install(InstallError::Placement { .. }) => "Installing the files failed.",
            Error::Reload(_) => "Reloading the channel list failed.",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fetch(e) => e.fmt(f),
            Error::Detection(e) => e.fmt(f),
            Error::Install(e) => e.fmt(f),
            Error::Reload(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fetch(e) => Some(e),
            Error::Detection(e) => Some(e),
            Error::Install(e) => Some(e),
            Error::Reload(e) => Some(e),
        }
    }
}

impl From<FetchError> for Error {
    fn from(e: FetchError) -> Self {
        Error::Fetch(e)
    }
}

impl From<DetectionError> for Error {
    fn from(e: DetectionError) -> Self {
        Error::Detection(e)
    }
}

impl From<InstallError> for Error {
    fn from(e: InstallError) -> Self {
        Error::Install(e)
    }
}

impl From<ReloadError> for Error {
    fn from(e: ReloadError) -> Self {
        Error::Reload(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_includes_seconds_and_hint() {
        let err = FetchError::Timeout {
            url: "http://example.com/list.zip".to_string(),
            after: Duration::from_secs(30),
        };

        let msg = err.to_string();
        assert!(msg.contains("list.zip"));
        assert!(msg.contains("30s"));
        assert!(msg.contains("hint:"));
    }

    #[test]
    fn unsupported_format_display_includes_path() {
        let err = DetectionError::UnsupportedFormat {
            path: PathBuf::from("/tmp/MyUpdater/list.rar"),
        };

        assert!(err.to_string().contains("list.rar"));
        assert!(err.to_string().contains("hint:"));
    }

    #[test]
    fn user_messages_distinguish_failure_classes() {
        let errors = [
            Error::Fetch(FetchError::EmptyResult {
                url: "u".to_string(),
            }),
            Error::Detection(DetectionError::UnsupportedFormat {
                path: PathBuf::from("a"),
            }),
            Error::Install(InstallError::MissingPrerequisite {
                what: "opkg".to_string(),
            }),
            Error::Install(InstallError::Extraction {
                path: PathBuf::from("a"),
                message: "bad".to_string(),
            }),
            Error::Reload(ReloadError::Service {
                operation: "reload".to_string(),
                message: "down".to_string(),
            }),
        ];

        let messages: std::collections::HashSet<_> =
            errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn umbrella_error_exposes_source() {
        use std::error::Error as _;

        let err: Error = InstallError::Placement {
            message: "disk full".to_string(),
        }
        .into();

        assert!(err.source().is_some());
        assert!(err.to_string().contains("disk full"));
    }
}
