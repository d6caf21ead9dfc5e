//! System report for support requests.
//!
//! Every probe is best-effort: a missing tool or a failed command leaves its
//! field empty instead of failing the report.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use mu_core::Distribution;
use mu_core::diagnostics::{DiskUsage, feed_softcams, installed_enigma2, parse_df};

use crate::process::ProcessRunner;

const OPKG_LIST_TIMEOUT: Duration = Duration::from_secs(60);
const DF_TIMEOUT: Duration = Duration::from_secs(10);
const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Host pinged for the connectivity check.
pub const CONNECTIVITY_HOST: &str = "8.8.8.8";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Local>,
    pub distribution: Distribution,
    /// `name - version` of the installed enigma2 package.
    pub enigma2_package: Option<String>,
    pub feed_softcams: Vec<String>,
    pub root_disk: Option<DiskUsage>,
    pub online: bool,
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== System diagnostics ===")?;
        writeln!(f, "Date: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "System: {}", self.distribution)?;
        writeln!(
            f,
            "Enigma2: {}",
            self.enigma2_package.as_deref().unwrap_or("unknown")
        )?;

        writeln!(f)?;
        writeln!(f, "Feed softcams:")?;
        if self.feed_softcams.is_empty() {
            writeln!(f, " - none in feed")?;
        }
        for package in &self.feed_softcams {
            writeln!(f, " - {package}")?;
        }

        writeln!(f)?;
        match &self.root_disk {
            Some(usage) => writeln!(f, "Disk space (/): {usage}")?,
            None => writeln!(f, "Disk space (/): unknown")?,
        }
        writeln!(
            f,
            "Internet connection: {}",
            if self.online { "OK" } else { "NONE" }
        )?;
        write!(f, "=== End of diagnostics ===")
    }
}

pub struct SystemDiagnostics {
    runner: Arc<dyn ProcessRunner>,
    distribution: Distribution,
}

impl SystemDiagnostics {
    pub fn new(runner: Arc<dyn ProcessRunner>, distribution: Distribution) -> Self {
        Self {
            runner,
            distribution,
        }
    }

    /// Successful stdout of `program args`, or `None` on any failure.
    async fn stdout_of(&self, program: &str, args: &[&str], timeout: Duration) -> Option<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        match self.runner.run(program, &args, timeout).await {
            Ok(output) if output.success() => Some(output.stdout),
            Ok(output) => {
                let stderr = output.stderr.trim();
                debug!(program, code = ?output.code, stderr, "probe failed");
                None
            }
            Err(e) => {
                warn!(program, error = %e, "probe could not run");
                None
            }
        }
    }

    async fn enigma2_package(&self) -> Option<String> {
        let listing = self
            .stdout_of("opkg", &["list-installed"], OPKG_LIST_TIMEOUT)
            .await?;
        installed_enigma2(&listing).map(str::to_string)
    }

    async fn feed_softcams(&self) -> Vec<String> {
        self.stdout_of("opkg", &["list"], OPKG_LIST_TIMEOUT)
            .await
            .map(|listing| {
                feed_softcams(&listing)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn root_disk(&self) -> Option<DiskUsage> {
        let output = self.stdout_of("df", &["-P", "-k", "/"], DF_TIMEOUT).await?;
        parse_df(&output)
    }

    async fn online(&self) -> bool {
        self.stdout_of("ping", &["-c", "1", "-W", "3", CONNECTIVITY_HOST], PING_TIMEOUT)
            .await
            .is_some()
    }

    /// Gather the report. The probes run concurrently.
    pub async fn collect(&self) -> DiagnosticReport {
        let (enigma2_package, feed_softcams, root_disk, online) = tokio::join!(
            self.enigma2_package(),
            self.feed_softcams(),
            self.root_disk(),
            self.online()
        );

        info!(
            distribution = %self.distribution,
            softcams = feed_softcams.len(),
            online,
            "diagnostics collected"
        );

        DiagnosticReport {
            generated_at: Local::now(),
            distribution: self.distribution,
            enigma2_package,
            feed_softcams,
            root_disk,
            online,
        }
    }
}
