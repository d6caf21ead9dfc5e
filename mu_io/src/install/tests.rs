use super::*;
use crate::detect::TarCompression;
use crate::test_utils::{dir_is_empty, list_files, tar_gz_archive, zip_archive};
use std::path::PathBuf;
use tempfile::TempDir;

fn test_paths(tmp: &TempDir) -> PathsConfig {
    let root = tmp.path();
    PathsConfig {
        staging_dir: root.join("staging"),
        channel_root: root.join("enigma2"),
        picon_root: root.join("picon"),
        backup_dir: root.join("backups"),
        bin_dir: root.join("bin"),
        log_file: None,
    }
}

fn stage_archive(paths: &PathsConfig, name: &str, bytes: &[u8]) -> StagingArchive {
    fs::create_dir_all(&paths.staging_dir).unwrap();
    let local_path = paths.staging_dir.join(name);
    fs::write(&local_path, bytes).unwrap();
    StagingArchive {
        local_path,
        source_url: format!("http://example.invalid/{name}"),
        size_bytes: bytes.len() as u64,
    }
}

fn assert_cleaned_up(paths: &PathsConfig, archive: &StagingArchive) {
    assert!(!archive.local_path.exists(), "staging archive left behind");
    assert!(dir_is_empty(&paths.staging_dir), "staging dir not empty");
}

#[test]
fn flat_picon_archive_lands_in_picon_root() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let archive = stage_archive(
        &paths,
        "picons.zip",
        &zip_archive(&[("1_0_1_A.png", "a"), ("1_0_1_B.png", "b")]),
    );

    let outcome = Installer::new(paths.clone())
        .install(&archive, PayloadKind::Picon, &InstallOptions::default())
        .unwrap();

    assert_eq!(outcome.kind, PayloadKind::Picon);
    assert_eq!(outcome.files_placed, 2);
    assert_eq!(outcome.backup, None);
    assert_eq!(list_files(&paths.picon_root), vec!["1_0_1_A.png", "1_0_1_B.png"]);
    assert_cleaned_up(&paths, &archive);
}

#[test]
fn nested_picon_dir_is_flattened() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let archive = stage_archive(
        &paths,
        "picons.tar.gz",
        &tar_gz_archive(&[
            ("Picons-220x132/Picon/1_0_1_A.png", "a"),
            ("Picons-220x132/Picon/1_0_1_B.png", "b"),
        ]),
    );

    let opts = InstallOptions {
        backup: true,
        format: Some(ArchiveFormat::Tar(TarCompression::Gzip)),
    };
    Installer::new(paths.clone())
        .install(&archive, PayloadKind::Picon, &opts)
        .unwrap();

    assert_eq!(list_files(&paths.picon_root), vec!["1_0_1_A.png", "1_0_1_B.png"]);
    assert!(!paths.picon_root.join("picon").exists());
    assert!(!paths.picon_root.join("Picon").exists());
    assert_cleaned_up(&paths, &archive);
}

#[test]
fn channel_list_installs_only_channel_files() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let archive = stage_archive(
        &paths,
        "hotbird.zip",
        &zip_archive(&[
            ("Hotbird 13E/lamedb", "eDVB services /4/"),
            ("Hotbird 13E/bouquets.tv", "#NAME Bouquets (TV)"),
            ("Hotbird 13E/userbouquet.hotbird.tv", "#NAME Hotbird"),
            ("Hotbird 13E/readme.txt", "enjoy"),
            ("Hotbird 13E/satellites.xml", "<satellites/>"),
        ]),
    );

    let outcome = Installer::new(paths.clone())
        .install(&archive, PayloadKind::ChannelList, &InstallOptions::default())
        .unwrap();

    assert_eq!(outcome.files_placed, 3);
    assert_eq!(
        list_files(&paths.channel_root),
        vec!["bouquets.tv", "lamedb", "userbouquet.hotbird.tv"]
    );
    assert_cleaned_up(&paths, &archive);
}

#[test]
fn channel_list_backs_up_previous_state() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    fs::create_dir_all(&paths.channel_root).unwrap();
    fs::write(paths.channel_root.join("lamedb"), "old db").unwrap();
    let archive = stage_archive(&paths, "list.zip", &zip_archive(&[("lamedb", "new db")]));

    let outcome = Installer::new(paths.clone())
        .install(&archive, PayloadKind::ChannelList, &InstallOptions::default())
        .unwrap();

    let backup = outcome.backup.unwrap();
    assert_eq!(backup.files, 1);
    assert!(backup.path.starts_with(&paths.backup_dir));
    assert!(backup.path.exists());
    assert_eq!(
        fs::read_to_string(paths.channel_root.join("lamedb")).unwrap(),
        "new db"
    );
}

#[test]
fn backup_can_be_disabled() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    fs::create_dir_all(&paths.channel_root).unwrap();
    fs::write(paths.channel_root.join("lamedb"), "old db").unwrap();
    let archive = stage_archive(&paths, "list.zip", &zip_archive(&[("lamedb", "new db")]));

    let opts = InstallOptions {
        backup: false,
        format: None,
    };
    let outcome = Installer::new(paths.clone())
        .install(&archive, PayloadKind::ChannelList, &opts)
        .unwrap();

    assert_eq!(outcome.backup, None);
    assert!(!paths.backup_dir.exists());
}

#[test]
fn archive_without_channel_files_fails_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let archive = stage_archive(&paths, "misc.zip", &zip_archive(&[("notes.txt", "x")]));

    let err = Installer::new(paths.clone())
        .install(&archive, PayloadKind::ChannelList, &InstallOptions::default())
        .unwrap_err();

    assert!(matches!(err, InstallError::Placement { .. }));
    assert!(list_files(&paths.channel_root).is_empty());
    assert_cleaned_up(&paths, &archive);
}

#[test]
fn non_archive_kinds_are_unsupported() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let archive = stage_archive(&paths, "list.m3u", b"#EXTM3U\n");

    for kind in [
        PayloadKind::M3UPlaylist,
        PayloadKind::BouquetReference,
        PayloadKind::Unknown,
    ] {
        let err = Installer::new(paths.clone())
            .install(&archive, kind, &InstallOptions::default())
            .unwrap_err();
        assert_eq!(err, InstallError::UnsupportedKind { kind });
    }
    assert_cleaned_up(&paths, &archive);
}

#[test]
fn missing_staging_archive_is_missing_prerequisite() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let archive = StagingArchive {
        local_path: paths.staging_dir.join("gone.zip"),
        source_url: "http://example.invalid/gone.zip".to_string(),
        size_bytes: 10,
    };

    let err = Installer::new(paths)
        .install(&archive, PayloadKind::Picon, &InstallOptions::default())
        .unwrap_err();

    assert!(matches!(err, InstallError::MissingPrerequisite { .. }));
}

#[test]
fn target_root_that_is_a_file_is_missing_prerequisite() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    fs::write(&paths.picon_root, "not a dir").unwrap();
    let archive = stage_archive(&paths, "p.zip", &zip_archive(&[("a.png", "a")]));

    let err = Installer::new(paths.clone())
        .install(&archive, PayloadKind::Picon, &InstallOptions::default())
        .unwrap_err();

    assert!(matches!(err, InstallError::MissingPrerequisite { .. }));
    assert_cleaned_up(&paths, &archive);
}

#[test]
fn corrupt_archive_is_extraction_error() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let archive = stage_archive(&paths, "broken.zip", b"PK\x03\x04 this is not really a zip");

    let err = Installer::new(paths.clone())
        .install(&archive, PayloadKind::Picon, &InstallOptions::default())
        .unwrap_err();

    assert!(matches!(err, InstallError::Extraction { .. }));
    assert!(dir_is_empty(&paths.picon_root));
    assert_cleaned_up(&paths, &archive);
}

#[test]
fn picons_merge_with_existing_ones() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    fs::create_dir_all(&paths.picon_root).unwrap();
    fs::write(paths.picon_root.join("old.png"), "old").unwrap();
    fs::write(paths.picon_root.join("same.png"), "before").unwrap();
    let archive = stage_archive(
        &paths,
        "p.zip",
        &zip_archive(&[("picon/same.png", "after"), ("picon/new.png", "new")]),
    );

    Installer::new(paths.clone())
        .install(&archive, PayloadKind::Picon, &InstallOptions::default())
        .unwrap();

    assert_eq!(
        list_files(&paths.picon_root),
        vec!["new.png", "old.png", "same.png"]
    );
    assert_eq!(
        fs::read_to_string(paths.picon_root.join("same.png")).unwrap(),
        "after"
    );
}

#[test]
fn installer_exposes_its_paths() {
    let tmp = TempDir::new().unwrap();
    let paths = test_paths(&tmp);
    let installer = Installer::new(paths.clone());
    assert_eq!(installer.paths().picon_root, PathBuf::from(&paths.picon_root));
}
