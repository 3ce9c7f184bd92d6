//! Request-scoped storage for downloaded SDS documents.
//!
//! Every batch owns one directory named after its request id under the configured
//! root:
//!
//! ```text
//! {root}/{request_id}/{identifier}_{digest}_{source}-SDS.pdf
//! ```
//!
//! Documents are streamed into a hidden temporary file in that directory and renamed
//! into place only once fully written and synced, so a concurrent [`Materializer::retrieve`]
//! never observes a partial file. Request directories are only ever removed by
//! [`Materializer::sweep`].

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use crate::config::{CleanupConfig, DownloadConfig};
use crate::models::{ErrorKind, FileHandle};
use crate::utils::{slugify, validate_filename, validate_url, HttpClient};

/// Storage and download errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid document URL: {0}")]
    InvalidUrl(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Document exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Map to the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::TooLarge { .. } => ErrorKind::DownloadTooLarge,
            StorageError::NotFound(_) => ErrorKind::StorageNotFound,
            StorageError::InvalidUrl(_) | StorageError::Download(_) | StorageError::Io(_) => {
                ErrorKind::DownloadFailed
            }
        }
    }
}

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Request directories deleted
    pub removed: Vec<Uuid>,
    /// Request directories left in place
    pub kept: usize,
    /// Directories that could not be deleted
    pub failed: usize,
}

/// Deterministic file name for a document, so repeated downloads overwrite.
///
/// The slug alone is lossy (punctuation, non-ASCII text, truncation), so the first
/// 8 hex digits of the identifier's SHA-256 keep distinct identifiers apart.
pub fn document_filename(identifier: &str, source: &str) -> String {
    let identifier = identifier.trim();
    let digest = format!("{:x}", Sha256::digest(identifier.as_bytes()));

    format!(
        "{}_{}_{}-SDS.pdf",
        slugify(identifier),
        &digest[..8],
        slugify(source)
    )
}

/// Downloads documents into request-scoped directories and serves them back
#[derive(Debug, Clone)]
pub struct Materializer {
    downloads: DownloadConfig,
    cleanup: CleanupConfig,
    client: HttpClient,
}

impl Materializer {
    pub fn new(downloads: DownloadConfig, cleanup: CleanupConfig, client: HttpClient) -> Self {
        Self {
            downloads,
            cleanup,
            client,
        }
    }

    /// Root directory holding every request directory
    pub fn root(&self) -> &Path {
        &self.downloads.root_dir
    }

    fn request_dir(&self, request_id: Uuid) -> PathBuf {
        self.downloads.root_dir.join(request_id.to_string())
    }

    /// Download `url` into the storage namespace of `request_id`.
    ///
    /// A [`FileHandle`] is only returned once the file is complete on disk; on any
    /// failure the temporary file is removed.
    pub async fn materialize(
        &self,
        request_id: Uuid,
        identifier: &str,
        source: &str,
        url: &str,
    ) -> Result<FileHandle, StorageError> {
        let url = validate_url(url).map_err(|e| StorageError::InvalidUrl(e.to_string()))?;
        let filename = document_filename(identifier, source);

        let dir = self.request_dir(request_id);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(&filename);
        let temp = dir.join(format!(".{}.{}.part", filename, Uuid::new_v4()));

        let written = match self.download_to(&url, &temp).await {
            Ok(written) => written,
            Err(e) => {
                discard(&temp).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            discard(&temp).await;
            return Err(e.into());
        }

        tracing::debug!(
            "Stored {} ({} bytes) for request {}",
            filename,
            written,
            request_id
        );

        Ok(FileHandle {
            request_id,
            filename,
            path,
        })
    }

    async fn download_to(&self, url: &Url, temp: &Path) -> Result<u64, StorageError> {
        let timeout = self.downloads.timeout();
        match tokio::time::timeout(timeout, self.stream_to(url, temp)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Download(format!(
                "{} did not complete within {:?}",
                url, timeout
            ))),
        }
    }

    async fn stream_to(&self, url: &Url, temp: &Path) -> Result<u64, StorageError> {
        let limit = self.downloads.max_file_size_bytes();

        let mut response = self
            .client
            .get(url.as_str())
            .timeout(self.downloads.timeout())
            .send()
            .await
            .map_err(|e| StorageError::Download(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Download(format!(
                "{} returned status: {}",
                url, status
            )));
        }

        // suppliers answer missing documents with a redirect to an HTML page
        if response.url() != url {
            return Err(StorageError::Download(format!(
                "{} redirected to {}",
                url,
                response.url()
            )));
        }

        if response.content_length().is_some_and(|len| len > limit) {
            return Err(StorageError::TooLarge { limit });
        }

        let mut file = tokio::fs::File::create(temp).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StorageError::Download(format!("Failed to read {}: {}", url, e)))?
        {
            written += chunk.len() as u64;
            if written > limit {
                return Err(StorageError::TooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }

    /// Read back a materialized document.
    ///
    /// `request_id` must be a UUID and `filename` a single plain path component;
    /// anything else is reported as not found.
    pub async fn retrieve(&self, request_id: &str, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.locate(request_id, filename)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(
                format!("{}/{}", request_id, filename),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Path a document would have on disk, after validating both components
    pub fn locate(&self, request_id: &str, filename: &str) -> Result<PathBuf, StorageError> {
        let not_found = || StorageError::NotFound(format!("{}/{}", request_id, filename));

        let request_id = Uuid::parse_str(request_id.trim()).map_err(|_| not_found())?;
        let filename = validate_filename(filename).map_err(|e| {
            tracing::warn!("Rejected retrieval of {:?}: {}", filename, e);
            not_found()
        })?;

        Ok(self.request_dir(request_id).join(filename))
    }

    /// Remove expired request directories.
    ///
    /// Directories older than `cleanup.max_age` go first; if `cleanup.max_request_dirs`
    /// is set, the oldest of the rest are removed until that many remain. Directories
    /// modified within the download timeout may still be receiving files and are
    /// exempt from the count rule. Entries whose names are not request ids are never
    /// touched.
    pub async fn sweep(&self) -> Result<SweepReport, StorageError> {
        let root = &self.downloads.root_dir;
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        let mut dirs: Vec<(Uuid, PathBuf, SystemTime)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(request_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };

            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            dirs.push((request_id, entry.path(), modified));
        }

        // oldest first
        dirs.sort_by_key(|(_, _, modified)| *modified);

        let now = SystemTime::now();
        let max_age = self.cleanup.max_age();
        let (expired, mut remaining): (Vec<_>, Vec<_>) = dirs.into_iter().partition(|(_, _, modified)| {
            now.duration_since(*modified).unwrap_or_default() >= max_age
        });

        let mut doomed = expired;
        if let Some(max_dirs) = self.cleanup.max_request_dirs {
            let grace = self.downloads.timeout();
            let settled = remaining
                .iter()
                .take_while(|(_, _, modified)| {
                    now.duration_since(*modified).unwrap_or_default() >= grace
                })
                .count();
            let excess = remaining.len().saturating_sub(max_dirs).min(settled);
            doomed.extend(remaining.drain(..excess));
        }
        report.kept = remaining.len();

        for (request_id, path, _) in doomed {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => report.removed.push(request_id),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.removed.push(request_id)
                }
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        if !report.removed.is_empty() {
            tracing::info!(
                "Swept {} request directories from {} ({} kept)",
                report.removed.len(),
                root.display(),
                report.kept
            );
        }

        Ok(report)
    }

    /// Configured period between background sweeps
    pub fn sweep_interval(&self) -> Duration {
        self.cleanup.sweep_interval()
    }

    /// Run [`sweep`](Self::sweep) every `period` until the task is aborted
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let materializer = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = materializer.sweep().await {
                    tracing::warn!("Storage sweep failed: {}", e);
                }
            }
        })
    }
}

async fn discard(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", temp.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn materializer(root: &Path, max_file_size_mb: u64) -> Materializer {
        let downloads = DownloadConfig {
            root_dir: root.to_path_buf(),
            max_file_size_mb,
            timeout_secs: 10,
        };
        Materializer::new(downloads, CleanupConfig::default(), HttpClient::new().unwrap())
    }

    fn backdate(dir: &Path, age: Duration) {
        let dir = std::fs::File::open(dir).unwrap();
        dir.set_modified(SystemTime::now() - age).unwrap();
    }

    async fn wait_until_removed(dir: &Path) -> bool {
        for _ in 0..100 {
            if !dir.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn files_in(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_document_filename() {
        assert_eq!(
            document_filename("67-63-0", "ChemBlink"),
            "67-63-0_aafbcd88_ChemBlink-SDS.pdf"
        );
        assert_eq!(
            document_filename("  Acetic acid, glacial ", "ChemicalSafety"),
            "Acetic_acid_glacial_f01c4617_ChemicalSafety-SDS.pdf"
        );
    }

    #[test]
    fn test_document_filename_keeps_lossy_slugs_apart() {
        assert_eq!(document_filename("丙酮", "p"), "unnamed_9f475e12_p-SDS.pdf");
        assert_eq!(document_filename("乙醇", "p"), "unnamed_3ac4b2cb_p-SDS.pdf");

        let plain = document_filename("Acetic acid", "p");
        let comma = document_filename("Acetic, acid", "p");
        assert_ne!(plain, comma);
        assert!(plain.starts_with("Acetic_acid_"));
        assert!(comma.starts_with("Acetic_acid_"));

        let long = "x".repeat(120);
        assert_ne!(
            document_filename(&format!("{long}a"), "p"),
            document_filename(&format!("{long}b"), "p")
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(StorageError::TooLarge { limit: 1 }.kind(), ErrorKind::DownloadTooLarge);
        assert_eq!(
            StorageError::Download("503".to_string()).kind(),
            ErrorKind::DownloadFailed
        );
        assert_eq!(
            StorageError::NotFound("x".to_string()).kind(),
            ErrorKind::StorageNotFound
        );
    }

    #[tokio::test]
    async fn test_materialize_and_retrieve() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/sds/67-63-0.pdf")
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.4 isopropanol")
            .expect(2)
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4();
        let url = format!("{}/sds/67-63-0.pdf", server.url());

        let handle = store
            .materialize(request_id, "67-63-0", "ChemBlink", &url)
            .await
            .unwrap();
        assert_eq!(handle.filename, "67-63-0_aafbcd88_ChemBlink-SDS.pdf");
        assert_eq!(handle.path, root.path().join(request_id.to_string()).join(&handle.filename));

        // same identifier and source overwrite instead of duplicating
        let again = store
            .materialize(request_id, "67-63-0", "ChemBlink", &url)
            .await
            .unwrap();
        assert_eq!(again, handle);
        assert_eq!(
            files_in(&root.path().join(request_id.to_string())),
            vec!["67-63-0_aafbcd88_ChemBlink-SDS.pdf".to_string()]
        );

        let bytes = store
            .retrieve(&request_id.to_string(), &handle.filename)
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4 isopropanol");
    }

    #[tokio::test]
    async fn test_non_ascii_names_do_not_share_a_file() {
        let mut server = mockito::Server::new_async().await;
        let _acetone = server
            .mock("GET", "/a.pdf")
            .with_body("DOC-A")
            .create_async()
            .await;
        let _ethanol = server
            .mock("GET", "/b.pdf")
            .with_body("DOC-B")
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4();

        let a = store
            .materialize(request_id, "丙酮", "p", &format!("{}/a.pdf", server.url()))
            .await
            .unwrap();
        let b = store
            .materialize(request_id, "乙醇", "p", &format!("{}/b.pdf", server.url()))
            .await
            .unwrap();

        assert_ne!(a.filename, b.filename);
        let id = request_id.to_string();
        assert_eq!(store.retrieve(&id, &a.filename).await.unwrap(), b"DOC-A");
        assert_eq!(store.retrieve(&id, &b.filename).await.unwrap(), b"DOC-B");
    }

    #[tokio::test]
    async fn test_concurrent_materialize_leaves_one_whole_file() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/sds/64-19-7.pdf")
            .with_body_from_request(move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    b"%PDF-1.4 first".to_vec()
                } else {
                    b"%PDF-1.4 second".to_vec()
                }
            })
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4();
        let url = format!("{}/sds/64-19-7.pdf", server.url());

        let (a, b) = tokio::join!(
            store.materialize(request_id, "64-19-7", "VWR", &url),
            store.materialize(request_id, "64-19-7", "VWR", &url),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a, b);
        assert_eq!(served.load(Ordering::SeqCst), 2);
        assert_eq!(
            files_in(&root.path().join(request_id.to_string())),
            vec![a.filename.clone()]
        );

        let bytes = store
            .retrieve(&request_id.to_string(), &a.filename)
            .await
            .unwrap();
        assert!(
            bytes == b"%PDF-1.4 first" || bytes == b"%PDF-1.4 second",
            "torn file: {:?}",
            String::from_utf8_lossy(&bytes)
        );
    }

    #[tokio::test]
    async fn test_redirected_download_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _redirect = server
            .mock("GET", "/sds/unknown.pdf")
            .with_status(302)
            .with_header("location", "/catalog")
            .create_async()
            .await;
        let _landing = server
            .mock("GET", "/catalog")
            .with_header("content-type", "text/html")
            .with_body("<html>Product catalog</html>")
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4();

        let err = store
            .materialize(request_id, "Acetone", "Fisher", &format!("{}/sds/unknown.pdf", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Download(_)));
        assert_eq!(err.kind(), ErrorKind::DownloadFailed);
        assert!(files_in(&root.path().join(request_id.to_string())).is_empty());
    }

    #[tokio::test]
    async fn test_declared_size_over_limit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/huge.pdf")
            .with_body(vec![b'x'; 2 * 1024 * 1024])
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4();

        let err = store
            .materialize(request_id, "67-63-0", "VWR", &format!("{}/huge.pdf", server.url()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DownloadTooLarge);
        assert!(files_in(&root.path().join(request_id.to_string())).is_empty());
    }

    #[tokio::test]
    async fn test_streamed_size_over_limit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/chunked.pdf")
            .with_chunked_body(|w| w.write_all(&vec![b'x'; 2 * 1024 * 1024]))
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4();

        let err = store
            .materialize(request_id, "67-63-0", "VWR", &format!("{}/chunked.pdf", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::TooLarge { .. }));
        assert!(files_in(&root.path().join(request_id.to_string())).is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.pdf")
            .with_status(500)
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4();

        let err = store
            .materialize(request_id, "Acetone", "Fisher", &format!("{}/missing.pdf", server.url()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DownloadFailed);
        assert!(files_in(&root.path().join(request_id.to_string())).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);

        let err = store
            .materialize(Uuid::new_v4(), "67-63-0", "TCI", "file:///etc/passwd")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_retrieve_unknown_and_traversal() {
        let root = TempDir::new().unwrap();
        let store = materializer(root.path(), 1);
        let request_id = Uuid::new_v4().to_string();

        for (id, name) in [
            (request_id.as_str(), "67-63-0_aafbcd88_ChemBlink-SDS.pdf"),
            (request_id.as_str(), "../../etc/passwd"),
            (request_id.as_str(), ".67-63-0_aafbcd88_ChemBlink-SDS.pdf.part"),
            ("not-a-uuid", "a.pdf"),
            ("..", "a.pdf"),
        ] {
            let err = store.retrieve(id, name).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::StorageNotFound, "{}/{}", id, name);
        }
    }

    #[tokio::test]
    async fn test_sweep_by_age_skips_foreign_entries() {
        let root = TempDir::new().unwrap();
        let request_id = Uuid::new_v4();
        std::fs::create_dir_all(root.path().join(request_id.to_string())).unwrap();
        std::fs::create_dir_all(root.path().join("keep-me")).unwrap();

        let downloads = DownloadConfig {
            root_dir: root.path().to_path_buf(),
            ..DownloadConfig::default()
        };
        let cleanup = CleanupConfig {
            max_age_secs: 0,
            ..CleanupConfig::default()
        };
        let store = Materializer::new(downloads, cleanup, HttpClient::new().unwrap());

        let report = store.sweep().await.unwrap();

        assert_eq!(report.removed, vec![request_id]);
        assert!(!root.path().join(request_id.to_string()).exists());
        assert!(root.path().join("keep-me").exists());
    }

    #[tokio::test]
    async fn test_sweep_by_count_keeps_newest() {
        let root = TempDir::new().unwrap();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (age, id) in [3u64, 2, 1].into_iter().zip(&ids) {
            let dir = root.path().join(id.to_string());
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("a-SDS.pdf"), b"%PDF").unwrap();
            backdate(&dir, Duration::from_secs(age * 600));
        }

        let downloads = DownloadConfig {
            root_dir: root.path().to_path_buf(),
            ..DownloadConfig::default()
        };
        let cleanup = CleanupConfig {
            max_request_dirs: Some(1),
            ..CleanupConfig::default()
        };
        let store = Materializer::new(downloads, cleanup, HttpClient::new().unwrap());

        let report = store.sweep().await.unwrap();

        assert_eq!(report.removed, vec![ids[0], ids[1]]);
        assert_eq!(report.kept, 1);
        assert!(root.path().join(ids[2].to_string()).exists());
    }

    #[tokio::test]
    async fn test_sweep_by_count_spares_fresh_directories() {
        let root = TempDir::new().unwrap();
        let settled = root.path().join(Uuid::new_v4().to_string());
        let fresh = root.path().join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&settled).unwrap();
        std::fs::create_dir_all(&fresh).unwrap();
        backdate(&settled, Duration::from_secs(600));

        let downloads = DownloadConfig {
            root_dir: root.path().to_path_buf(),
            ..DownloadConfig::default()
        };
        let cleanup = CleanupConfig {
            max_request_dirs: Some(0),
            ..CleanupConfig::default()
        };
        let store = Materializer::new(downloads, cleanup, HttpClient::new().unwrap());

        let report = store.sweep().await.unwrap();

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.kept, 1);
        assert!(!settled.exists());
        assert!(fresh.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_every_interval() {
        let root = TempDir::new().unwrap();
        let downloads = DownloadConfig {
            root_dir: root.path().to_path_buf(),
            ..DownloadConfig::default()
        };
        let cleanup = CleanupConfig {
            max_age_secs: 0,
            sweep_interval_secs: 60,
            ..CleanupConfig::default()
        };
        let store = Materializer::new(downloads, cleanup, HttpClient::new().unwrap());
        assert_eq!(store.sweep_interval(), Duration::from_secs(60));

        let first = root.path().join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&first).unwrap();

        let sweeper = store.spawn_sweeper(store.sweep_interval());
        assert!(wait_until_removed(&first).await);

        let second = root.path().join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&second).unwrap();
        tokio::task::yield_now().await;
        assert!(second.exists());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(wait_until_removed(&second).await);

        sweeper.abort();
    }

    #[tokio::test]
    async fn test_sweep_missing_root() {
        let store = materializer(Path::new("/nonexistent/sds-finder-root"), 1);
        assert_eq!(store.sweep().await.unwrap(), SweepReport::default());
    }
}
