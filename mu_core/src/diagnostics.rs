//! Parsing for the system report: opkg listings and `df -P -k` output.

use std::fmt;

use regex::Regex;

/// At most this many feed softcams are listed in a report.
pub const FEED_SOFTCAM_LIMIT: usize = 3;

/// The first installed package line mentioning enigma2, as printed by
/// `opkg list-installed` (`name - version`).
pub fn installed_enigma2(list_installed: &str) -> Option<&str> {
    list_installed
        .lines()
        .map(str::trim)
        .find(|line| line.contains("enigma2"))
}

/// Names of the first oscam or ncam packages in `opkg list` output.
pub fn feed_softcams(opkg_list: &str) -> Vec<&str> {
    let Ok(softcam) = Regex::new(r"(?i)oscam|ncam") else {
        return Vec::new();
    };

    opkg_list
        .lines()
        .filter(|line| softcam.is_match(line))
        .filter_map(|line| line.split_whitespace().next())
        .take(FEED_SOFTCAM_LIMIT)
        .collect()
}

/// One filesystem row of `df -P -k`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    pub filesystem: String,
    pub total_kib: u64,
    pub used_kib: u64,
    pub available_kib: u64,
    pub mounted_on: String,
}

impl DiskUsage {
    pub fn used_percent(&self) -> u64 {
        if self.total_kib == 0 {
            0
        } else {
            (self.used_kib * 100).div_ceil(self.total_kib)
        }
    }
}

fn human_kib(kib: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    let mut value = kib as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{kib}K")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

impl fmt::Display for DiskUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} free of {} on {} ({}% used)",
            human_kib(self.available_kib),
            human_kib(self.total_kib),
            self.mounted_on,
            self.used_percent()
        )
    }
}

/// Parse the last data row of `df -P -k <path>`.
///
/// POSIX output keeps each filesystem on one line, so the row is
/// `filesystem blocks used available capacity mountpoint`.
pub fn parse_df(output: &str) -> Option<DiskUsage> {
    let row = output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .last()?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }

    Some(DiskUsage {
        filesystem: fields[0].to_string(),
        total_kib: fields[1].parse().ok()?,
        used_kib: fields[2].parse().ok()?,
        available_kib: fields[3].parse().ok()?,
        mounted_on: fields[5..].join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_installed_enigma2_line() {
        let installed = "\
busybox - 1.36.1-r0
enigma2 - 7.3+git20240501-r0
enigma2-plugin-extensions-openwebif - 2.1
";
        assert_eq!(
            installed_enigma2(installed),
            Some("enigma2 - 7.3+git20240501-r0")
        );
        assert_eq!(installed_enigma2("busybox - 1.36\n"), None);
    }

    #[test]
    fn lists_at_most_three_softcams() {
        let list = "\
enigma2-plugin-softcams-ncam - 15.1 - ncam
enigma2-plugin-extensions-epgimport - 1.9 - epg
enigma2-plugin-softcams-oscam-master - 11.8 - OSCam
enigma2-plugin-softcams-oscam-emu - 11.8 - oscam emu
enigma2-plugin-softcams-oscam-stable - 11.7 - oscam
";
        assert_eq!(
            feed_softcams(list),
            vec![
                "enigma2-plugin-softcams-ncam",
                "enigma2-plugin-softcams-oscam-master",
                "enigma2-plugin-softcams-oscam-emu",
            ]
        );
        assert!(feed_softcams("").is_empty());
    }

    #[test]
    fn parses_posix_df_row() {
        let output = "\
Filesystem     1024-blocks    Used Available Capacity Mounted on
/dev/mmcblk0p3     3905600 1171680   2518280      32% /
";
        let usage = parse_df(output).unwrap();
        assert_eq!(usage.filesystem, "/dev/mmcblk0p3");
        assert_eq!(usage.total_kib, 3_905_600);
        assert_eq!(usage.available_kib, 2_518_280);
        assert_eq!(usage.mounted_on, "/");
        assert_eq!(usage.used_percent(), 30);
        assert_eq!(usage.to_string(), "2.4G free of 3.7G on / (30% used)");
    }

    #[test]
    fn rejects_malformed_df_output() {
        assert_eq!(parse_df(""), None);
        assert_eq!(parse_df("Filesystem 1024-blocks Used\n"), None);
        let bad = "Filesystem 1024-blocks Used Available Capacity Mounted on\nubi0 x y z 1% /\n";
        assert_eq!(parse_df(bad), None);
    }
}
