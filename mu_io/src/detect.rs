//! Archive probing and payload detection.
//!
//! Probes run in a fixed order, zip first and tar second; the first probe that
//! produces a listing decides the format. Nothing here writes to the archive.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;
use xz2::read::XzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

use mu_core::payload::classify_entries;
use mu_core::{DetectionError, PayloadKind, UnknownContentPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Xz,
    Zstd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar(TarCompression),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveListing {
    pub format: ArchiveFormat,
    pub entries: Vec<String>,
}

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const USTAR_OFFSET: usize = 257;

fn sniff_tar_compression(path: &Path) -> io::Result<Option<TarCompression>> {
    let mut header = [0u8; 512];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let header = &header[..filled];

    let compression = if header.starts_with(GZIP_MAGIC) {
        Some(TarCompression::Gzip)
    } else if header.starts_with(XZ_MAGIC) {
        Some(TarCompression::Xz)
    } else if header.starts_with(ZSTD_MAGIC) {
        Some(TarCompression::Zstd)
    } else if header.len() >= USTAR_OFFSET + 5
        && &header[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar"
    {
        Some(TarCompression::None)
    } else {
        None
    };

    Ok(compression)
}

/// Open `path` as a decompressed tar stream.
pub(crate) fn open_tar_stream(
    path: &Path,
    compression: TarCompression,
) -> io::Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = match compression {
        TarCompression::None => Box::new(file),
        TarCompression::Gzip => Box::new(GzDecoder::new(file)),
        TarCompression::Xz => Box::new(XzDecoder::new(file)),
        TarCompression::Zstd => Box::new(ZstdDecoder::new(file)?),
    };
    Ok(reader)
}

/// List a zip archive. `None` when the file is not a readable zip.
pub fn try_zip(path: &Path) -> Option<ArchiveListing> {
    let file = File::open(path).ok()?;
    let archive = zip::ZipArchive::new(BufReader::new(file)).ok()?;
    let entries = archive.file_names().map(str::to_string).collect();

    Some(ArchiveListing {
        format: ArchiveFormat::Zip,
        entries,
    })
}

/// List a tar archive, plain or compressed. `None` when the file is not a
/// readable tar or contains no entries.
pub fn try_tar(path: &Path) -> Option<ArchiveListing> {
    let compression = sniff_tar_compression(path).ok()??;
    let mut archive = tar::Archive::new(open_tar_stream(path, compression).ok()?);

    let mut entries = Vec::new();
    for entry in archive.entries().ok()? {
        let entry = entry.ok()?;
        let name = entry.path().ok()?.to_string_lossy().into_owned();
        entries.push(name);
    }

    if entries.is_empty() {
        return None;
    }

    Some(ArchiveListing {
        format: ArchiveFormat::Tar(compression),
        entries,
    })
}

/// Run the probes in order and return the first listing.
pub fn probe(path: &Path) -> Result<ArchiveListing, DetectionError> {
    File::open(path).map_err(|e| DetectionError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let probes: [fn(&Path) -> Option<ArchiveListing>; 2] = [try_zip, try_tar];
    probes
        .iter()
        .find_map(|probe| probe(path))
        .ok_or_else(|| DetectionError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
}

/// Classifies staged archives by their content.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveTypeDetector {
    policy: UnknownContentPolicy,
}

impl ArchiveTypeDetector {
    pub fn new(policy: UnknownContentPolicy) -> Self {
        Self { policy }
    }

    pub fn detect(&self, path: &Path) -> Result<PayloadKind, DetectionError> {
        self.inspect(path).map(|(_, kind)| kind)
    }

    /// Probe and classify, returning the listing so callers can extract with
    /// the same format.
    pub fn inspect(&self, path: &Path) -> Result<(ArchiveListing, PayloadKind), DetectionError> {
        let listing = probe(path)?;

        let kind = match classify_entries(&listing.entries) {
            Some(kind) => kind,
            None => {
                debug!(path = %path.display(), policy = ?self.policy, "no content signature");
                self.policy
                    .resolve()
                    .ok_or_else(|| DetectionError::Ambiguous {
                        path: path.to_path_buf(),
                        entries: listing.entries.len(),
                    })?
            }
        };

        debug!(
            path = %path.display(),
            format = ?listing.format,
            entries = listing.entries.len(),
            %kind,
            "archive classified"
        );
        Ok((listing, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{tar_archive, tar_gz_archive, tar_xz_archive, zip_archive};
    use std::fs;
    use tempfile::TempDir;

    fn write(tmp: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = tmp.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn zip_with_channel_files_is_channel_list() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "list.zip",
            &zip_archive(&[
                ("settings/lamedb", "eDVB services /4/"),
                ("settings/userbouquet.hotbird.tv", "#NAME Hotbird"),
                ("settings/readme.txt", "hello"),
            ]),
        );

        let detector = ArchiveTypeDetector::default();
        assert_eq!(detector.detect(&path).unwrap(), PayloadKind::ChannelList);

        let listing = probe(&path).unwrap();
        assert_eq!(listing.format, ArchiveFormat::Zip);
        assert_eq!(listing.entries.len(), 3);
    }

    #[test]
    fn tar_gz_with_pngs_is_picon() {
        let tmp = TempDir::new().unwrap();
        // Mislabeled: the name says zip, the content is tar.gz.
        let path = write(
            &tmp,
            "picons.zip",
            &tar_gz_archive(&[("picon/1_0_1_A.png", "png"), ("picon/1_0_1_B.png", "png")]),
        );

        let (listing, kind) = ArchiveTypeDetector::default().inspect(&path).unwrap();
        assert_eq!(kind, PayloadKind::Picon);
        assert_eq!(listing.format, ArchiveFormat::Tar(TarCompression::Gzip));
    }

    #[test]
    fn plain_and_xz_tar_are_recognized() {
        let tmp = TempDir::new().unwrap();
        let plain = write(&tmp, "a.tar", &tar_archive(&[("lamedb", "x")]));
        let xz = write(&tmp, "b.tar.xz", &tar_xz_archive(&[("logo.png", "x")]));

        assert_eq!(
            probe(&plain).unwrap().format,
            ArchiveFormat::Tar(TarCompression::None)
        );
        assert_eq!(
            probe(&xz).unwrap().format,
            ArchiveFormat::Tar(TarCompression::Xz)
        );
        assert_eq!(
            ArchiveTypeDetector::default().detect(&xz).unwrap(),
            PayloadKind::Picon
        );
    }

    #[test]
    fn garbage_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "list.zip", b"<html>404 not found</html>");

        let err = ArchiveTypeDetector::default().detect(&path).unwrap_err();
        assert!(matches!(err, DetectionError::UnsupportedFormat { .. }));
    }

    #[test]
    fn gzip_that_is_not_tar_is_unsupported() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"just some text").unwrap();
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "x.gz", &encoder.finish().unwrap());

        assert!(matches!(
            probe(&path).unwrap_err(),
            DetectionError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ArchiveTypeDetector::default()
            .detect(Path::new("/nonexistent/list.zip"))
            .unwrap_err();
        assert!(matches!(err, DetectionError::Io { .. }));
    }

    #[test]
    fn unknown_content_follows_policy() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "misc.zip", &zip_archive(&[("notes.txt", "x")]));

        assert_eq!(
            ArchiveTypeDetector::new(UnknownContentPolicy::ChannelList)
                .detect(&path)
                .unwrap(),
            PayloadKind::ChannelList
        );

        let err = ArchiveTypeDetector::new(UnknownContentPolicy::Reject)
            .detect(&path)
            .unwrap_err();
        assert!(matches!(err, DetectionError::Ambiguous { entries: 1, .. }));
    }

    #[test]
    fn detection_is_repeatable_and_read_only() {
        let tmp = TempDir::new().unwrap();
        let bytes = zip_archive(&[("picon/a.png", "a"), ("picon/b.png", "b")]);
        let path = write(&tmp, "p.zip", &bytes);
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        let detector = ArchiveTypeDetector::default();
        let first = detector.detect(&path).unwrap();
        let second = detector.detect(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&path).unwrap(), bytes);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }
}
