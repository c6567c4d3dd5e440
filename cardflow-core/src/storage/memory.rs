//! In-memory object store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;

use super::{validate_key, ListPage, ObjectInfo, ObjectStore, DEFAULT_PAGE_SIZE};
use crate::error::StoreError;

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
    last_modified: Option<DateTime<Utc>>,
}

/// Object store backed by a concurrent map.
///
/// Listing pages are served in key order; the continuation token is the last
/// key of the previous page. The store can be switched offline to exercise
/// infrastructure failure paths.
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
    page_size: usize,
    offline: AtomicBool,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: DashMap::new(),
            page_size: page_size.max(1),
            offline: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
        }
    }

    /// Seed an object with an explicit capture time in seconds.
    pub fn insert_at(&self, key: impl Into<String>, bytes: Vec<u8>, timestamp_secs: f64) {
        let millis = (timestamp_secs * 1000.0).round() as i64;
        let last_modified = Utc.timestamp_millis_opt(millis).single();
        self.insert_with(key.into(), bytes, last_modified);
    }

    /// Seed an object that reports no last-modified time.
    pub fn insert_untimed(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.insert_with(key.into(), bytes, None);
    }

    fn insert_with(&self, key: String, bytes: Vec<u8>, last_modified: Option<DateTime<Utc>>) {
        let content_type = super::content_type_for(&key).to_string();
        self.objects.insert(
            key,
            StoredObject {
                bytes,
                content_type,
                last_modified,
            },
        );
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|o| o.content_type.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectStore")
            .field("objects", &self.objects.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage, StoreError> {
        self.check_online()?;

        let mut matching: Vec<ObjectInfo> = self
            .objects
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .filter(|e| token.map_or(true, |t| e.key().as_str() > t))
            .map(|e| ObjectInfo {
                key: e.key().clone(),
                last_modified: e.value().last_modified,
            })
            .collect();
        matching.sort_by(|a, b| a.key.cmp(&b.key));

        let next_token = if matching.len() > self.page_size {
            matching.truncate(self.page_size);
            matching.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: matching,
            next_token,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check_online()?;
        self.objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.check_online()?;
        validate_key(key)?;
        self.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                last_modified: Some(Utc::now()),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.objects.contains_key(key))
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        self.check_online()?;
        validate_key(dst)?;
        let copied = {
            let source = self
                .objects
                .get(src)
                .ok_or_else(|| StoreError::NotFound(src.to_string()))?;
            StoredObject {
                bytes: source.bytes.clone(),
                content_type: source.content_type.clone(),
                last_modified: Some(Utc::now()),
            }
        };
        self.objects.insert(dst.to_string(), copied);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.objects.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
