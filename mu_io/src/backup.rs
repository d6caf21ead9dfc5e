use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use mu_core::payload::is_backup_candidate;

/// A channel-list snapshot taken before an install.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub files: usize,
}

/// Files directly inside `channel_root` that belong in a backup, sorted.
fn backup_candidates(channel_root: &Path) -> io::Result<Vec<PathBuf>> {
    if !channel_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(channel_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if is_backup_candidate(&entry.file_name().to_string_lossy()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn unused_backup_path(backup_dir: &Path, now: &DateTime<Local>) -> PathBuf {
    let stem = format!("backup_{}", now.format("%Y%m%d_%H%M%S"));
    let mut path = backup_dir.join(format!("{stem}.tar.gz"));
    let mut n = 1;
    while path.exists() {
        path = backup_dir.join(format!("{stem}_{n}.tar.gz"));
        n += 1;
    }
    path
}

/// Archive `lamedb`, `*.tv` and `*.radio` from `channel_root` into a
/// timestamped tarball in `backup_dir`.
///
/// Returns `Ok(None)` when there is nothing to back up.
pub fn create_backup(
    channel_root: &Path,
    backup_dir: &Path,
    now: DateTime<Local>,
) -> io::Result<Option<BackupRecord>> {
    let files = backup_candidates(channel_root)?;
    if files.is_empty() {
        debug!(root = %channel_root.display(), "no channel files to back up");
        return Ok(None);
    }

    fs::create_dir_all(backup_dir)?;
    let path = unused_backup_path(backup_dir, &now);

    let result = write_tarball(&path, &files);
    if result.is_err() {
        let _ = fs::remove_file(&path);
    }
    result?;

    info!(path = %path.display(), files = files.len(), "channel list backed up");
    Ok(Some(BackupRecord {
        path,
        created_at: now,
        files: files.len(),
    }))
}

fn write_tarball(path: &Path, files: &[PathBuf]) -> io::Result<()> {
    let encoder = GzEncoder::new(File::create(path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        builder.append_path_with_name(file, name)?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn tarball_entries(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn backs_up_only_channel_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("enigma2");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("lamedb"), "db").unwrap();
        fs::write(root.join("userbouquet.fav.tv"), "#NAME Fav").unwrap();
        fs::write(root.join("userbouquet.radio.radio"), "#NAME R").unwrap();
        fs::write(root.join("settings"), "config").unwrap();
        fs::create_dir(root.join("picon.tv")).unwrap();

        let backups = tmp.path().join("backups");
        let record = create_backup(&root, &backups, fixed_time())
            .unwrap()
            .unwrap();

        assert_eq!(record.path, backups.join("backup_20240309_140507.tar.gz"));
        assert_eq!(record.files, 3);
        assert_eq!(
            tarball_entries(&record.path),
            vec!["lamedb", "userbouquet.fav.tv", "userbouquet.radio.radio"]
        );
    }

    #[test]
    fn nothing_to_back_up_yields_no_record() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("enigma2");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("settings"), "config").unwrap();

        let backups = tmp.path().join("backups");
        assert_eq!(create_backup(&root, &backups, fixed_time()).unwrap(), None);
        assert!(!backups.exists());

        let missing = tmp.path().join("missing");
        assert_eq!(create_backup(&missing, &backups, fixed_time()).unwrap(), None);
    }

    #[test]
    fn same_second_backups_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("enigma2");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("lamedb"), "db").unwrap();
        let backups = tmp.path().join("backups");

        let first = create_backup(&root, &backups, fixed_time()).unwrap().unwrap();
        let second = create_backup(&root, &backups, fixed_time()).unwrap().unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(
            second.path,
            backups.join("backup_20240309_140507_1.tar.gz")
        );
    }
}
