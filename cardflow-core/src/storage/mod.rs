//! Object storage abstraction.
//!
//! The pipeline only needs a handful of S3-style primitives: paginated
//! prefix listing, whole-object get/put, existence checks, and copy/delete.
//! Implementations must be thread-safe (`Send + Sync`).
//!
//! - [`MemoryObjectStore`] - in-process store for tests and dry runs
//! - [`LocalObjectStore`] - a directory on disk acting as a bucket

mod local;
mod memory;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::burst::ObjectRef;
use crate::error::StoreError;

/// Objects requested per listing page when a store is not told otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectInfo {
    /// Capture reference for the pipeline; a missing time becomes `0.0`.
    pub fn to_object_ref(&self) -> ObjectRef {
        let timestamp = self
            .last_modified
            .map(|t| t.timestamp_millis() as f64 / 1000.0)
            .unwrap_or(0.0);
        ObjectRef::new(self.key.clone(), timestamp)
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Present when more objects remain; pass back verbatim to continue.
    pub next_token: Option<String>,
}

/// S3-style object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List keys under `prefix` in lexicographic order, one page at a time.
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage, StoreError>;

    /// Fetch the full object body.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite an object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError>;

    /// Remove an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Copy then delete. Not atomic: a failed delete leaves both copies.
    async fn move_object(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        if src == dst {
            return Ok(());
        }
        self.copy(src, dst).await?;
        self.delete(src).await
    }

    /// Identifier used in logs.
    fn name(&self) -> &str;
}

/// Guess a content type from the key extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Reject keys that could escape a bucket root or address nothing.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
