//! In-memory catalog with optional JSON snapshots.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CatalogCard, CatalogStore, NewPendingImage, PendingImage, StageUpdate};
use crate::error::CatalogError;
use crate::fingerprint::Fingerprint;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogSnapshot {
    pending: Vec<PendingImage>,
    cards: Vec<CatalogCard>,
}

/// Catalog held in concurrent maps.
///
/// SKU reservations go through a [`DashSet`], whose insert is atomic, so two
/// concurrent stagings can never end up with the same SKU.
pub struct MemoryCatalog {
    pending: DashMap<u64, PendingImage>,
    cards: DashMap<String, CatalogCard>,
    reserved: DashSet<String>,
    next_id: AtomicU64,
    offline: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            cards: DashMap::new(),
            reserved: DashSet::new(),
            next_id: AtomicU64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Load a snapshot written by [`MemoryCatalog::save`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| CatalogError::Snapshot(format!("{}: {e}", path.display())))?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&raw)
            .map_err(|e| CatalogError::Snapshot(format!("{}: {e}", path.display())))?;

        let catalog = Self::from_snapshot(snapshot);
        info!(
            path = %path.display(),
            records = catalog.pending.len(),
            cards = catalog.cards.len(),
            "Loaded catalog snapshot"
        );
        Ok(catalog)
    }

    /// Load `path` if it exists, otherwise start empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| CatalogError::Snapshot(format!("{}: {e}", path.display())))?;
        if exists {
            Self::load(path).await
        } else {
            debug!(path = %path.display(), "No catalog snapshot yet, starting empty");
            Ok(Self::new())
        }
    }

    /// Write every record and card as pretty JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|e| CatalogError::Snapshot(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CatalogError::Snapshot(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| CatalogError::Snapshot(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let catalog = Self::new();
        let mut max_id = 0;
        for record in snapshot.pending {
            max_id = max_id.max(record.id);
            if let Some(sku) = &record.sku {
                catalog.reserved.insert(sku.clone());
            }
            catalog.pending.insert(record.id, record);
        }
        for card in snapshot.cards {
            catalog.reserved.insert(card.sku.clone());
            catalog.cards.insert(card.sku.clone(), card);
        }
        catalog.next_id.store(max_id + 1, Ordering::SeqCst);
        catalog
    }

    fn snapshot(&self) -> CatalogSnapshot {
        let mut pending: Vec<PendingImage> = self.pending.iter().map(|e| e.value().clone()).collect();
        pending.sort_by_key(|r| r.id);
        let mut cards: Vec<CatalogCard> = self.cards.iter().map(|e| e.value().clone()).collect();
        cards.sort_by(|a, b| a.sku.cmp(&b.sku));
        CatalogSnapshot { pending, cards }
    }

    /// All records ordered by id.
    pub fn records(&self) -> Vec<PendingImage> {
        self.snapshot().pending
    }

    pub fn card(&self, sku: &str) -> Option<CatalogCard> {
        self.cards.get(sku).map(|c| c.value().clone())
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Make every operation fail with [`CatalogError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), CatalogError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("memory catalog is offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCatalog")
            .field("pending", &self.pending.len())
            .field("cards", &self.cards.len())
            .field("reserved", &self.reserved.len())
            .finish()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn pending_front_exists(&self, key: &str) -> Result<bool, CatalogError> {
        self.check_online()?;
        Ok(self.pending.iter().any(|e| e.value().key_front == key))
    }

    async fn insert_pending(&self, image: NewPendingImage) -> Result<u64, CatalogError> {
        self.check_online()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pending.insert(
            id,
            PendingImage {
                id,
                sku: None,
                key_front: image.key_front,
                key_back: image.key_back,
                phash_front: image.phash_front,
                phash_back: image.phash_back,
                flags: image.flags,
                created_at: Utc::now(),
                staged_at: None,
            },
        );
        Ok(id)
    }

    async fn existing_fingerprints(
        &self,
    ) -> Result<Vec<(Option<Fingerprint>, Option<Fingerprint>)>, CatalogError> {
        self.check_online()?;
        Ok(self
            .pending
            .iter()
            .map(|e| (e.value().phash_front.clone(), e.value().phash_back.clone()))
            .collect())
    }

    async fn get_pending(&self, id: u64) -> Result<Option<PendingImage>, CatalogError> {
        self.check_online()?;
        Ok(self.pending.get(&id).map(|e| e.value().clone()))
    }

    async fn reserve_sku(&self, sku: &str) -> Result<bool, CatalogError> {
        self.check_online()?;
        Ok(self.reserved.insert(sku.to_string()))
    }

    async fn release_sku(&self, sku: &str) -> Result<(), CatalogError> {
        self.check_online()?;
        if !self.cards.contains_key(sku) {
            self.reserved.remove(sku);
        }
        Ok(())
    }

    async fn stage_pending(&self, update: StageUpdate) -> Result<PendingImage, CatalogError> {
        self.check_online()?;
        let mut record = match self.pending.get_mut(&update.id) {
            Some(record) if record.is_pending() => record,
            _ => return Err(CatalogError::NotFound(update.id)),
        };

        let sku = update.card.sku.clone();
        let staged_at = update.card.staged_at;
        match self.cards.entry(sku.clone()) {
            Entry::Occupied(_) => return Err(CatalogError::SkuTaken(sku)),
            Entry::Vacant(slot) => {
                slot.insert(update.card);
            }
        }
        self.reserved.insert(sku.clone());

        record.sku = Some(sku);
        record.key_front = update.key_front;
        record.key_back = update.key_back;
        record.staged_at = Some(staged_at);
        Ok(record.clone())
    }
}
