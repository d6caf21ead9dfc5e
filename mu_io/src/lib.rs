pub mod backup;
pub mod bouquet;
pub mod catalog;
pub mod detect;
pub mod diagnostics;
pub mod extract;
pub mod fetch;
pub mod install;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod reload;
pub mod softcam;
pub mod traits;
pub mod update;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use backup::{BackupRecord, create_backup};
pub use bouquet::{BouquetDetails, BouquetInstaller, BouquetOutcome};
pub use catalog::CatalogAggregator;
pub use diagnostics::{DiagnosticReport, SystemDiagnostics};
pub use detect::{ArchiveFormat, ArchiveListing, ArchiveTypeDetector, TarCompression, probe};
pub use extract::extract_archive;
pub use fetch::{ArchiveFetcher, StagingArchive};
pub use install::{InstallOptions, InstallOutcome, Installer};
pub use logging::{LoggingError, init_logging};
pub use pipeline::{InstallPipeline, InstallReport, InstallRequest, ReloadStatus};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use reload::{CommandServiceDatabase, ReloadNotifier, ServiceDatabase, WebIfServiceDatabase};
pub use softcam::{SoftcamManager, SoftcamReport, detect_distribution};
pub use traits::{HttpClient, ReqwestHttpClient};
pub use update::{UpdateChecker, UpdateStatus};
