//! Local file cache for grant attachments.
//!
//! # Cache Structure
//!
//! ```text
//! <cache_root>/
//!   <grant_id>/
//!     <original file name>
//! ```
//!
//! Files are written to a hidden temp file in the grant directory and renamed
//! into place, so a reader never sees a partially written attachment. An
//! existing file is always reused; there is no expiry and no eviction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::AttachmentRef;
use crate::sources::{GrantSource, SourceError};
use crate::utils::validate::{validate_file_name, validate_grant_id, ValidationError};

/// Prefix of in-flight temp files
const PARTIAL_PREFIX: &str = ".partial-";

/// Anything that can produce the bytes of an attachment
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, SourceError>;
}

#[async_trait]
impl<T: GrantSource + ?Sized> AttachmentFetcher for T {
    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, SourceError> {
        self.download_attachment(attachment).await
    }
}

/// Errors raised while caching or looking up an attachment
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("download failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("cache write failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not cached: {grant_id}/{file_name}")]
    NotCached { grant_id: String, file_name: String },

    #[error("background task failed: {0}")]
    Task(String),
}

/// An attachment present in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub grant_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// One file in an inventory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFileInfo {
    pub name: String,
    pub size_bytes: u64,
}

/// All cached files of one grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedGrant {
    pub grant_id: String,
    pub files: Vec<CachedFileInfo>,
}

/// Attachment cache rooted at a directory
#[derive(Debug, Clone)]
pub struct AttachmentCache {
    root: PathBuf,
}

impl AttachmentCache {
    /// Create a cache; directories are created lazily on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the attachments of one grant
    pub fn grant_dir(&self, grant_id: &str) -> Result<PathBuf, DownloadError> {
        Ok(self.root.join(validate_grant_id(grant_id)?))
    }

    fn entry_path(&self, grant_id: &str, file_name: &str) -> Result<(String, String, PathBuf), DownloadError> {
        let grant_id = validate_grant_id(grant_id)?;
        let file_name = validate_file_name(file_name)?;
        let path = self.root.join(&grant_id).join(&file_name);
        Ok((grant_id, file_name, path))
    }

    /// Make sure an attachment is on disk, fetching it only when missing.
    ///
    /// Concurrent calls for the same key may both fetch, but both succeed and
    /// the file is replaced atomically.
    pub async fn ensure_cached<F>(
        &self,
        grant_id: &str,
        attachment: &AttachmentRef,
        fetcher: &F,
    ) -> Result<CachedFile, DownloadError>
    where
        F: AttachmentFetcher + ?Sized,
    {
        let (grant_id, file_name, path) = self.entry_path(grant_id, &attachment.name)?;

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() {
                debug!(%grant_id, %file_name, "Cache hit");
                return Ok(CachedFile {
                    grant_id,
                    file_name,
                    path,
                    size: meta.len(),
                });
            }
        }

        debug!(%grant_id, %file_name, "Cache miss, downloading");
        let bytes = fetcher.fetch_attachment(attachment).await?;

        let target = path.clone();
        let size = tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| DownloadError::Task(e.to_string()))?
            .map_err(|source| DownloadError::Io {
                path: path.clone(),
                source,
            })?;

        info!(%grant_id, %file_name, size, "Cached attachment");
        Ok(CachedFile {
            grant_id,
            file_name,
            path,
            size,
        })
    }

    /// Look up an attachment that is already cached
    pub async fn locate(&self, grant_id: &str, file_name: &str) -> Result<CachedFile, DownloadError> {
        let (grant_id, file_name, path) = self.entry_path(grant_id, file_name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(CachedFile {
                grant_id,
                file_name,
                path,
                size: meta.len(),
            }),
            _ => Err(DownloadError::NotCached {
                grant_id,
                file_name,
            }),
        }
    }

    /// Scan the cache directory, sorted by grant id then file name
    pub async fn list_all(&self) -> Result<Vec<CachedGrant>, DownloadError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan(&root))
            .await
            .map_err(|e| DownloadError::Task(e.to_string()))?
            .map_err(|source| DownloadError::Io {
                path: self.root.clone(),
                source,
            })
    }
}

/// Write bytes next to `target` and rename them into place
fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<u64> {
    let dir = target
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent directory"))?;
    match fs::create_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(bytes.len() as u64)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn scan(root: &Path) -> std::io::Result<Vec<CachedGrant>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut grants = Vec::new();
    for entry in entries {
        let entry = entry?;
        let grant_id = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&grant_id) || !entry.file_type()?.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for file in fs::read_dir(entry.path())? {
            let file = file?;
            let name = file.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            let meta = file.metadata()?;
            if meta.is_file() {
                files.push(CachedFileInfo {
                    name,
                    size_bytes: meta.len(),
                });
            }
        }
        if files.is_empty() {
            continue;
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        grants.push(CachedGrant { grant_id, files });
    }

    grants.sort_by(|a, b| a.grant_id.cmp(&b.grant_id));
    Ok(grants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_second_call_does_not_refetch() {
        let dir = tempdir().unwrap();
        let cache = AttachmentCache::new(dir.path());
        let source = MockSource::new();
        source.set_payload("公募要領.pdf", b"%PDF-1.4 body".to_vec());
        let attachment = AttachmentRef::remote("公募要領.pdf", "http://example.com/a");

        let first = cache.ensure_cached("a0W1", &attachment, &source).await.unwrap();
        let second = cache.ensure_cached("a0W1", &attachment, &source).await.unwrap();

        assert_eq!(source.download_calls(), 1);
        assert_eq!(first.path, second.path);
        assert_eq!(first.path, dir.path().join("a0W1").join("公募要領.pdf"));
        assert_eq!(second.size, 13);
    }

    #[tokio::test]
    async fn test_unsafe_names_rejected_before_fetch() {
        let dir = tempdir().unwrap();
        let cache = AttachmentCache::new(dir.path());
        let source = MockSource::new();

        let bad_name = AttachmentRef::remote("../escape.pdf", "http://example.com/x");
        assert!(matches!(
            cache.ensure_cached("a0W1", &bad_name, &source).await,
            Err(DownloadError::Invalid(_))
        ));

        let ok_name = AttachmentRef::remote("ok.pdf", "http://example.com/x");
        assert!(matches!(
            cache.ensure_cached("../a0W1", &ok_name, &source).await,
            Err(DownloadError::Invalid(_))
        ));
        assert_eq!(source.download_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_nothing() {
        let dir = tempdir().unwrap();
        let cache = AttachmentCache::new(dir.path());
        let source = MockSource::new();
        source.fail_download("broken.pdf", "timed out");

        let attachment = AttachmentRef::remote("broken.pdf", "http://example.com/b");
        let err = cache
            .ensure_cached("a0W1", &attachment, &source)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Fetch(SourceError::Network(_))));
        assert!(!dir.path().join("a0W1").join("broken.pdf").exists());
        assert!(cache.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_same_key() {
        let dir = tempdir().unwrap();
        let cache = AttachmentCache::new(dir.path());
        let source = MockSource::new();
        source.set_payload("same.txt", b"identical".to_vec());
        let attachment = AttachmentRef::remote("same.txt", "http://example.com/s");

        let (a, b) = tokio::join!(
            cache.ensure_cached("g1", &attachment, &source),
            cache.ensure_cached("g1", &attachment, &source)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.path, b.path);
        assert_eq!(std::fs::read(&a.path).unwrap(), b"identical");

        let listing = cache.list_all().await.unwrap();
        assert_eq!(listing[0].files.len(), 1);
    }

    #[tokio::test]
    async fn test_list_all_sorted_and_skips_hidden() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b-grant")).unwrap();
        std::fs::create_dir_all(root.join("a-grant")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("b-grant").join("z.pdf"), b"zz").unwrap();
        std::fs::write(root.join("b-grant").join("a.docx"), b"a").unwrap();
        std::fs::write(root.join("b-grant").join(".partial-xyz"), b"tmp").unwrap();
        std::fs::write(root.join("a-grant").join("x.xlsx"), b"xxx").unwrap();
        std::fs::write(root.join("stray.txt"), b"not a grant").unwrap();

        let listing = AttachmentCache::new(root).list_all().await.unwrap();
        let ids: Vec<_> = listing.iter().map(|g| g.grant_id.as_str()).collect();
        assert_eq!(ids, vec!["a-grant", "b-grant"]);

        let names: Vec<_> = listing[1].files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.docx", "z.pdf"]);
        assert_eq!(listing[1].files[1].size_bytes, 2);
    }

    #[tokio::test]
    async fn test_list_all_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let cache = AttachmentCache::new(dir.path().join("never-created"));
        assert!(cache.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locate() {
        let dir = tempdir().unwrap();
        let cache = AttachmentCache::new(dir.path());
        assert!(matches!(
            cache.locate("g1", "a.pdf").await,
            Err(DownloadError::NotCached { .. })
        ));

        std::fs::create_dir_all(dir.path().join("g1")).unwrap();
        std::fs::write(dir.path().join("g1").join("a.pdf"), b"1234").unwrap();
        let found = cache.locate("g1", "a.pdf").await.unwrap();
        assert_eq!(found.size, 4);

        assert!(matches!(
            cache.locate("g1", "../../etc/passwd").await,
            Err(DownloadError::Invalid(_))
        ));
    }
}
