//! Softcam packages through opkg.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use mu_core::softcam::{
    OSCAM_BINARIES, OSCAM_FEED_PACKAGE, SOFTCAM_BINARY_PREFIXES, SOFTCAM_PACKAGES,
    pick_oscam_package,
};
use mu_core::{Distribution, InstallError};

use crate::process::{ProcessOutput, ProcessRunner};

const OPKG: &str = "opkg";
const OPKG_TIMEOUT: Duration = Duration::from_secs(300);

/// Identify the image from release files under `root` (normally `/`).
pub fn detect_distribution(root: &Path) -> Distribution {
    let etc = root.join("etc");
    let openatv = etc.join("openatv-release");

    if openatv.exists() {
        match fs::read_to_string(&openatv) {
            Ok(content) => Distribution::from_openatv_release(&content),
            Err(e) => {
                warn!(path = %openatv.display(), error = %e, "cannot read release file");
                Distribution::Unknown
            }
        }
    } else if etc.join("openpli-release").exists() {
        Distribution::OpenPli
    } else if etc.join("vti-version-info").exists() {
        Distribution::Vix
    } else {
        Distribution::Unknown
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftcamReport {
    pub package: String,
    /// Whether an oscam binary is in the binary directory afterwards.
    pub binary_present: bool,
}

pub struct SoftcamManager {
    runner: Arc<dyn ProcessRunner>,
    distribution: Distribution,
    bin_dir: PathBuf,
}

impl SoftcamManager {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        distribution: Distribution,
        bin_dir: PathBuf,
    ) -> Self {
        Self {
            runner,
            distribution,
            bin_dir,
        }
    }

    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    fn opkg(&self) -> Result<String, InstallError> {
        self.runner
            .locate(OPKG)
            .map(|path| path.to_string_lossy().into_owned())
            .ok_or_else(|| InstallError::MissingPrerequisite {
                what: "opkg package manager".to_string(),
            })
    }

    async fn run_opkg(&self, opkg: &str, args: Vec<String>) -> Result<ProcessOutput, InstallError> {
        self.runner
            .run(opkg, &args, OPKG_TIMEOUT)
            .await
            .map_err(|e| InstallError::Placement {
                message: e.to_string(),
            })
    }

    /// Install oscam from the package feed.
    pub async fn install_oscam(&self) -> Result<SoftcamReport, InstallError> {
        let opkg = self.opkg()?;
        info!(distribution = %self.distribution, "installing oscam");

        match self.run_opkg(&opkg, vec!["update".to_string()]).await {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(stderr = %output.stderr.trim(), "opkg update failed, continuing"),
            Err(e) => warn!(error = %e, "opkg update failed, continuing"),
        }

        let package = if self.distribution.has_feed_oscam() {
            OSCAM_FEED_PACKAGE.to_string()
        } else {
            let listing = self.run_opkg(&opkg, vec!["list".to_string()]).await?;
            pick_oscam_package(&listing.stdout)
                .map(str::to_string)
                .ok_or_else(|| InstallError::Placement {
                    message: "no oscam package found in the feed".to_string(),
                })?
        };
        debug!(package, "selected softcam package");

        let mut args: Vec<String> = self
            .distribution
            .opkg_install_flags()
            .iter()
            .map(|flag| flag.to_string())
            .collect();
        args.push("install".to_string());
        args.push(package.clone());

        let output = self.run_opkg(&opkg, args).await?;
        if !output.success() {
            return Err(InstallError::Placement {
                message: format!("opkg install {package} failed: {}", output.stderr.trim()),
            });
        }

        let binary_present = OSCAM_BINARIES
            .iter()
            .any(|binary| self.bin_dir.join(binary).exists());
        info!(package, binary_present, "oscam installed");

        Ok(SoftcamReport {
            package,
            binary_present,
        })
    }

    /// Remove softcam packages and any leftover binaries. Best-effort;
    /// returns the binaries that were deleted.
    pub async fn remove_softcams(&self) -> Vec<PathBuf> {
        match self.opkg() {
            Ok(opkg) => {
                let mut args = vec![
                    "remove".to_string(),
                    "--force-removal-of-dependent-packages".to_string(),
                ];
                args.extend(SOFTCAM_PACKAGES.iter().map(|p| p.to_string()));

                match self.run_opkg(&opkg, args).await {
                    Ok(output) if output.success() => {}
                    Ok(output) => warn!(stderr = %output.stderr.trim(), "opkg remove failed"),
                    Err(e) => warn!(error = %e, "opkg remove failed"),
                }
            }
            Err(e) => warn!(error = %e, "skipping package removal"),
        }

        let removed = self.remove_binaries();
        info!(removed = removed.len(), "softcams removed");
        removed
    }

    fn remove_binaries(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.bin_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.bin_dir.display(), error = %e, "cannot list binaries");
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !SOFTCAM_BINARY_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix))
            {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot remove binary"),
            }
        }
        removed.sort();
        removed
    }
}
