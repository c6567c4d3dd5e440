//! Directory-backed object store.
//!
//! Keys are `/`-separated paths relative to the root directory. Last-modified
//! times come from file mtimes, which is what a camera dropping files into a
//! synced folder naturally produces.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{fs, task};
use tracing::debug;
use walkdir::WalkDir;

use super::{validate_key, ListPage, ObjectInfo, ObjectStore, DEFAULT_PAGE_SIZE};
use crate::error::StoreError;

/// A directory acting as a bucket.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    page_size: usize,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }

    /// Directory holding every key that can start with `prefix`.
    fn prefix_dir(&self, prefix: &str) -> Result<PathBuf, StoreError> {
        match prefix.rfind('/') {
            Some(end) => self.path_for(&prefix[..end]),
            None => Ok(self.root.clone()),
        }
    }
}

/// Files under `start` whose key begins with `prefix` and sorts after `token`.
///
/// Directories that cannot hold such a key are not descended into.
fn walk_prefix(
    root: &Path,
    start: &Path,
    prefix: &str,
    token: Option<&str>,
) -> Result<Vec<ObjectInfo>, StoreError> {
    if !root.is_dir() {
        return Err(StoreError::Unavailable(format!(
            "bucket directory {} does not exist",
            root.display()
        )));
    }
    if !start.is_dir() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(start)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            relative_key(root, entry.path())
                .is_some_and(|key| subtree_may_match(&format!("{key}/"), prefix, token))
        });

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = relative_key(root, entry.path()) else {
            debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if !key.starts_with(prefix) || token.is_some_and(|t| key.as_str() <= t) {
            continue;
        }
        let last_modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);
        found.push(ObjectInfo { key, last_modified });
    }
    Ok(found)
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

/// Whether a directory whose keys all start with `dir_key` can hold a key
/// that starts with `prefix` and sorts after `token`.
fn subtree_may_match(dir_key: &str, prefix: &str, token: Option<&str>) -> bool {
    let overlaps = dir_key.starts_with(prefix) || prefix.starts_with(dir_key);
    let after_token = token.map_or(true, |t| t <= dir_key || t.starts_with(dir_key));
    overlaps && after_token
}

fn walk_error(err: walkdir::Error) -> StoreError {
    let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
    match err.into_io_error() {
        Some(io) => StoreError::Io(io),
        None => StoreError::Unavailable(format!("filesystem loop at {path}")),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage, StoreError> {
        let root = self.root.clone();
        let start = self.prefix_dir(prefix)?;
        let owned_prefix = prefix.to_string();
        let owned_token = token.map(str::to_string);
        let mut matching = task::spawn_blocking(move || {
            walk_prefix(&root, &start, &owned_prefix, owned_token.as_deref())
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("directory walk aborted: {e}")))??;
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
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io(e),
        })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let from = self.path_for(src)?;
        let to = self.path_for(dst)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&from, &to).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(src.to_string()),
            _ => StoreError::Io(e),
        })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}
