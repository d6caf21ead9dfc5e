//! Test utilities for the updater
//!
//! This module provides common test infrastructure:
//!
//! - Archive fixtures - zip and tar (plain, gzip, xz) built in memory
//! - `TestContext` - wraps a TempDir, a MockServer and a configuration whose
//!   paths all live inside the TempDir
//! - `RecordingServiceDatabase` - a reload collaborator that counts calls and
//!   can be told to fail
//!
//! # Example
//!
//! ```ignore
//! use mu_io::test_utils::{TestContext, zip_archive};
//!
//! #[tokio::test]
//! async fn installs_channel_list() {
//!     let ctx = TestContext::new().await;
//!     ctx.mount_bytes("/list.zip", zip_archive(&[("lamedb", "db")])).await;
//!
//!     let (pipeline, _db) = ctx.pipeline();
//!     pipeline.run(InstallRequest::archive("List", ctx.url("/list.zip"))).await.unwrap();
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mu_core::config::{PathsConfig, UpdaterConfig};
use mu_core::ReloadError;

use crate::pipeline::InstallPipeline;
use crate::reload::{ReloadNotifier, ServiceDatabase};
use crate::traits::ReqwestHttpClient;

// ============================================================================
// Archive fixtures
// ============================================================================

/// Build a zip archive from `(path, content)` pairs. Paths ending in `/`
/// become directory entries.
pub fn zip_archive<C: AsRef<[u8]>>(files: &[(&str, C)]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_ref()).unwrap();
        }
    }

    writer.finish().unwrap().into_inner()
}

/// Build an uncompressed tar archive from `(path, content)` pairs.
pub fn tar_archive<C: AsRef<[u8]>>(files: &[(&str, C)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    for (name, content) in files {
        let content = content.as_ref();
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content).unwrap();
    }

    builder.into_inner().unwrap()
}

/// Build a gzipped tar archive.
pub fn tar_gz_archive<C: AsRef<[u8]>>(files: &[(&str, C)]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_archive(files)).unwrap();
    encoder.finish().unwrap()
}

/// Build an xz-compressed tar archive.
pub fn tar_xz_archive<C: AsRef<[u8]>>(files: &[(&str, C)]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(&tar_archive(files)).unwrap();
    encoder.finish().unwrap()
}

// ============================================================================
// Filesystem helpers
// ============================================================================

/// All regular files below `root`, as sorted `/`-separated relative paths.
pub fn list_files(root: &Path) -> Vec<String> {
    if !root.exists() {
        return Vec::new();
    }
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Whether `dir` is missing or has no entries at all.
pub fn dir_is_empty(dir: &Path) -> bool {
    !dir.exists() || fs::read_dir(dir).unwrap().next().is_none()
}

// ============================================================================
// Reload collaborator
// ============================================================================

/// Service database double that records reload calls.
#[derive(Default)]
pub struct RecordingServiceDatabase {
    pub service_list_reloads: AtomicUsize,
    pub bouquet_reloads: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingServiceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let db = Self::default();
        db.fail.store(true, Ordering::SeqCst);
        db
    }

    pub fn total_reloads(&self) -> usize {
        self.service_list_reloads.load(Ordering::SeqCst)
            + self.bouquet_reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceDatabase for RecordingServiceDatabase {
    async fn reload_service_list(&self) -> Result<(), ReloadError> {
        self.service_list_reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReloadError::Service {
                operation: "service list reload".to_string(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    async fn reload_bouquets(&self) -> Result<(), ReloadError> {
        self.bouquet_reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Test context
// ============================================================================

/// A temp directory, a mock HTTP server and a configuration pointing into
/// the temp directory.
pub struct TestContext {
    pub tmp: TempDir,
    pub server: MockServer,
    pub config: UpdaterConfig,
}

impl TestContext {
    pub async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let root = tmp.path();

        let mut config = UpdaterConfig::default();
        config.paths = PathsConfig {
            staging_dir: root.join("staging"),
            channel_root: root.join("enigma2"),
            picon_root: root.join("picon"),
            backup_dir: root.join("backups"),
            bin_dir: root.join("bin"),
            log_file: None,
        };
        config.fetch.timeout_secs = 5;
        config.fetch.max_retries = 0;
        config.catalog.manifest_url = format!("{}/manifest.json", server.uri());
        config.catalog.legacy_url = format!("{}/list.txt", server.uri());
        config.catalog.timeout_secs = 5;

        Self {
            tmp,
            server,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.config.paths.staging_dir.clone()
    }

    pub async fn mount_bytes(&self, url_path: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_status(&self, url_path: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Respond after `delay`, for timeout tests.
    pub async fn mount_delayed(&self, url_path: &str, body: Vec<u8>, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body)
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// A pipeline over the real HTTP client and a recording reload collaborator.
    pub fn pipeline(&self) -> (Arc<InstallPipeline>, Arc<RecordingServiceDatabase>) {
        self.pipeline_with(Arc::new(RecordingServiceDatabase::new()))
    }

    pub fn pipeline_with(
        &self,
        db: Arc<RecordingServiceDatabase>,
    ) -> (Arc<InstallPipeline>, Arc<RecordingServiceDatabase>) {
        let http = Arc::new(ReqwestHttpClient::new());
        let pipeline = InstallPipeline::from_parts(
            &self.config,
            http,
            ReloadNotifier::new(db.clone()),
        );
        (Arc::new(pipeline), db)
    }
}
