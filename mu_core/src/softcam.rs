//! Softcam package selection rules for the opkg-based images.

use std::fmt;

use regex::Regex;

/// Package installed from the feed on OpenPLi.
pub const OSCAM_FEED_PACKAGE: &str = "enigma2-plugin-softcams-oscam";

/// Packages removed by a softcam cleanup.
pub const SOFTCAM_PACKAGES: [&str; 3] = [
    "enigma2-plugin-softcams-oscam",
    "enigma2-plugin-softcams-oscam-emu",
    "enigma2-plugin-softcams-ncam",
];

/// Binary name prefixes removed by a softcam cleanup.
pub const SOFTCAM_BINARY_PREFIXES: [&str; 2] = ["oscam", "ncam"];

/// Binaries whose presence confirms an oscam install.
pub const OSCAM_BINARIES: [&str; 2] = ["oscam", "oscam-emu"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Distribution {
    OpenAtv { major: Option<u32> },
    OpenPli,
    Vix,
    Unknown,
}

impl Distribution {
    /// Interpret the content of `/etc/openatv-release`.
    pub fn from_openatv_release(content: &str) -> Self {
        let content = content.to_lowercase();
        let major = [7, 6]
            .into_iter()
            .find(|major| content.contains(&format!("{major}.")));
        Distribution::OpenAtv { major }
    }

    pub fn opkg_install_flags(&self) -> &'static [&'static str] {
        match self {
            Distribution::OpenPli => &["--force-overwrite", "--force-downgrade"],
            _ => &["--force-overwrite"],
        }
    }

    /// Whether the feed ships oscam under its plain package name.
    pub fn has_feed_oscam(&self) -> bool {
        matches!(self, Distribution::OpenPli)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::OpenAtv { major: Some(major) } => write!(f, "openatv{major}"),
            Distribution::OpenAtv { major: None } => f.write_str("openatv"),
            Distribution::OpenPli => f.write_str("openpli"),
            Distribution::Vix => f.write_str("vix"),
            Distribution::Unknown => f.write_str("unknown"),
        }
    }
}

/// Pick the oscam build to install from `opkg list` output: the first
/// ipv4-only oscam package from a master, emu or stable branch.
pub fn pick_oscam_package(opkg_list: &str) -> Option<&str> {
    let ipv4_build = Regex::new(r"(?i)oscam.*ipv4only").ok()?;
    let branch = Regex::new(r"(?i)master|emu|stable").ok()?;

    opkg_list
        .lines()
        .filter(|line| ipv4_build.is_match(line))
        .find(|line| branch.is_match(line))
        .and_then(|line| line.split_whitespace().next())
}
