pub mod bouquet;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod payload;
pub mod softcam;

pub use catalog::{CatalogEntry, CatalogOrigin, UNKNOWN_DATE};
pub use config::UpdaterConfig;
pub use errors::{
    CatalogError, ConfigError, DetectionError, Error, FetchError, InstallError, ProcessError,
    ReloadError,
};
pub use payload::{InstallationTarget, PayloadKind, PlacementStrategy, UnknownContentPolicy};
pub use softcam::Distribution;
