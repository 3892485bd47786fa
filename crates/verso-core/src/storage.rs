//! Blob store contract for object payloads.
//!
//! The catalog stores only blob *addresses*; payload bytes live behind this
//! contract, keyed by `(storage_namespace, physical_address)`. Catalog
//! operations never call the blob store — payloads are written by clients
//! before the entry is recorded, and reclaimed by external collectors after
//! retention marks the rows expired.
//!
//! Byte ranges are inclusive on both ends, mirroring HTTP `Range: bytes=X-Y`
//! semantics: a request for `0-9` on a 1000-byte object yields exactly the
//! first 10 bytes. Ends past the object are clamped; a start past the object
//! is an error the caller may translate into a full read.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Error, Result};

/// An inclusive byte range, as expressed by `Range: bytes=X-Y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset, inclusive.
    pub start: u64,
    /// Last byte offset, inclusive. Clamped to the object's final byte.
    pub end: u64,
}

impl ByteRange {
    /// Creates a new inclusive range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `end < start`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "range end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of bytes the range covers.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Inclusive ranges always cover at least one byte.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// One record of a storage inventory listing, consumed by bulk importers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    /// Logical path the importer should record the object under.
    pub path: String,
    /// Physical address of the payload within the namespace.
    pub address: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Payload checksum as reported by the backing store.
    pub checksum: String,
    /// Whether this is the latest version of the object.
    pub is_latest: bool,
}

/// Byte-oriented key/value service for object payloads.
///
/// Implementations must be safe for concurrent access keyed by
/// `(namespace, address)`.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Writes a payload and returns its entity tag.
    async fn put(&self, namespace: &str, address: &str, data: Bytes) -> Result<String>;

    /// Reads an entire payload.
    ///
    /// Returns [`Error::NotFound`] if the address does not exist.
    async fn get(&self, namespace: &str, address: &str) -> Result<Bytes>;

    /// Reads an inclusive byte range from a payload.
    ///
    /// The end offset is clamped to the object's final byte. Returns
    /// [`Error::InvalidInput`] if the start offset is past the object.
    async fn get_range(&self, namespace: &str, address: &str, range: ByteRange) -> Result<Bytes>;

    /// Deletes a payload. Succeeds even if the address does not exist.
    async fn delete(&self, namespace: &str, address: &str) -> Result<()>;

    /// Returns true if the address exists in the namespace.
    async fn exists(&self, namespace: &str, address: &str) -> Result<bool>;

    /// Lists the namespace's inventory, ordered by path.
    ///
    /// Optional; backends without inventory support return
    /// [`Error::InvalidInput`].
    async fn list_inventory(&self, namespace: &str) -> Result<Vec<InventoryRecord>>;
}

fn etag_of(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn clamp_range(range: ByteRange, len: u64) -> Result<(usize, usize)> {
    if len == 0 || range.start >= len {
        return Err(Error::InvalidInput(format!(
            "range start {} exceeds object length {len}",
            range.start
        )));
    }
    let end = range.end.min(len - 1);
    // Object lengths are bounded by addressable memory for these backends.
    Ok((
        usize::try_from(range.start).map_err(|_| Error::InvalidInput("range too large".into()))?,
        usize::try_from(end).map_err(|_| Error::InvalidInput("range too large".into()))?,
    ))
}

/// In-memory blob store for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(String, String), StoredBlob>>,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    etag: String,
    #[allow(dead_code)]
    last_modified: DateTime<Utc>,
}

impl MemoryBlobStore {
    /// Creates a new empty blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_blob(&self, namespace: &str, address: &str) -> Result<Option<StoredBlob>> {
        let blobs = self.blobs.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        Ok(blobs
            .get(&(namespace.to_string(), address.to_string()))
            .cloned())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, namespace: &str, address: &str, data: Bytes) -> Result<String> {
        let etag = etag_of(&data);
        let mut blobs = self.blobs.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        blobs.insert(
            (namespace.to_string(), address.to_string()),
            StoredBlob {
                data,
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(etag)
    }

    async fn get(&self, namespace: &str, address: &str) -> Result<Bytes> {
        self.read_blob(namespace, address)?
            .map(|b| b.data)
            .ok_or_else(|| Error::not_found(format!("object {namespace}/{address}")))
    }

    async fn get_range(&self, namespace: &str, address: &str, range: ByteRange) -> Result<Bytes> {
        let data = self.get(namespace, address).await?;
        let (start, end) = clamp_range(range, data.len() as u64)?;
        Ok(data.slice(start..=end))
    }

    async fn delete(&self, namespace: &str, address: &str) -> Result<()> {
        let mut blobs = self.blobs.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        blobs.remove(&(namespace.to_string(), address.to_string()));
        Ok(())
    }

    async fn exists(&self, namespace: &str, address: &str) -> Result<bool> {
        Ok(self.read_blob(namespace, address)?.is_some())
    }

    async fn list_inventory(&self, namespace: &str) -> Result<Vec<InventoryRecord>> {
        let blobs = self.blobs.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        let mut records: Vec<InventoryRecord> = blobs
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, address), blob)| InventoryRecord {
                path: address.trim_start_matches('/').to_string(),
                address: address.clone(),
                size: blob.data.len() as u64,
                checksum: blob.etag.clone(),
                is_latest: true,
            })
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }
}

/// Blob store rooted at a local directory.
///
/// Each namespace becomes a subdirectory; addresses map to files beneath it.
/// Intended for single-host deployments and integration tests.
#[derive(Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, namespace: &str, address: &str) -> Result<PathBuf> {
        let mut path = self.root.join(sanitize(namespace)?);
        path.push(sanitize(address)?);
        Ok(path)
    }
}

fn sanitize(part: &str) -> Result<PathBuf> {
    let trimmed = part
        .trim_start_matches("local://")
        .trim_start_matches('/')
        .trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("empty storage path '{part}'")));
    }
    let rel = Path::new(trimmed);
    for component in rel.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(Error::InvalidInput(format!(
                    "storage path '{part}' must be a plain relative path"
                )));
            }
        }
    }
    Ok(rel.to_path_buf())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, namespace: &str, address: &str, data: Bytes) -> Result<String> {
        let path = self.blob_path(namespace, address)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage_with_source("create blob directory", e))?;
        }
        let etag = etag_of(&data);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| Error::storage_with_source("write blob", e))?;
        Ok(etag)
    }

    async fn get(&self, namespace: &str, address: &str) -> Result<Bytes> {
        let path = self.blob_path(namespace, address)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("object {namespace}/{address}")))
            }
            Err(e) => Err(Error::storage_with_source("read blob", e)),
        }
    }

    async fn get_range(&self, namespace: &str, address: &str, range: ByteRange) -> Result<Bytes> {
        let data = self.get(namespace, address).await?;
        let (start, end) = clamp_range(range, data.len() as u64)?;
        Ok(data.slice(start..=end))
    }

    async fn delete(&self, namespace: &str, address: &str) -> Result<()> {
        let path = self.blob_path(namespace, address)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_with_source("delete blob", e)),
        }
    }

    async fn exists(&self, namespace: &str, address: &str) -> Result<bool> {
        let path = self.blob_path(namespace, address)?;
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::storage_with_source("stat blob", e))?)
    }

    async fn list_inventory(&self, _namespace: &str) -> Result<Vec<InventoryRecord>> {
        Err(Error::InvalidInput(
            "local blob store does not provide inventory listings".to_string(),
        ))
    }
}
