use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use mu_core::InstallError;

use crate::detect::{ArchiveFormat, TarCompression, open_tar_stream};

fn extraction_error(archive: &Path, message: impl ToString) -> InstallError {
    InstallError::Extraction {
        path: archive.to_path_buf(),
        message: message.to_string(),
    }
}

/// Unpack `archive` into `dest` using the probed `format`.
pub fn extract_archive(
    archive: &Path,
    format: ArchiveFormat,
    dest: &Path,
) -> Result<(), InstallError> {
    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::Tar(compression) => extract_tarball(archive, compression, dest),
    }
}

/// Entries whose names escape `dest` are skipped.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<(), InstallError> {
    let file = File::open(archive).map_err(|e| extraction_error(archive, e))?;
    let mut zip =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| extraction_error(archive, e))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| extraction_error(archive, e))?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let output_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&output_path).map_err(|e| extraction_error(archive, e))?;
            continue;
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(|e| extraction_error(archive, e))?;
        }
        let mut outfile = File::create(&output_path).map_err(|e| extraction_error(archive, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| extraction_error(archive, e))?;
    }

    Ok(())
}

pub fn extract_tarball(
    archive: &Path,
    compression: TarCompression,
    dest: &Path,
) -> Result<(), InstallError> {
    let stream = open_tar_stream(archive, compression).map_err(|e| extraction_error(archive, e))?;
    let mut tar = tar::Archive::new(stream);
    tar.set_overwrite(true);
    tar.set_preserve_permissions(false);
    tar.unpack(dest).map_err(|e| extraction_error(archive, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{tar_gz_archive, zip_archive};
    use tempfile::TempDir;

    #[test]
    fn extracts_zip_tree() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        fs::write(
            &archive,
            zip_archive(&[("picon/a.png", "A"), ("picon/sub/b.png", "B")]),
        )
        .unwrap();
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();

        assert_eq!(fs::read(dest.join("picon/a.png")).unwrap(), b"A");
        assert_eq!(fs::read(dest.join("picon/sub/b.png")).unwrap(), b"B");
    }

    #[test]
    fn extracts_tar_gz_tree() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.tar.gz");
        fs::write(&archive, tar_gz_archive(&[("e2/lamedb", "db")])).unwrap();
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        extract_archive(&archive, ArchiveFormat::Tar(TarCompression::Gzip), &dest).unwrap();

        assert_eq!(fs::read(dest.join("e2/lamedb")).unwrap(), b"db");
    }

    #[test]
    fn truncated_archive_is_extraction_error() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.tar.gz");
        let noise: Vec<u8> = (0..8192u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let bytes = tar_gz_archive(&[("e2/lamedb", noise.as_slice())]);
        fs::write(&archive, &bytes[..bytes.len() / 2]).unwrap();
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let err = extract_archive(&archive, ArchiveFormat::Tar(TarCompression::Gzip), &dest)
            .unwrap_err();
        assert!(matches!(err, InstallError::Extraction { .. }));
    }
}
