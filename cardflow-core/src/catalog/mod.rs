//! Persistence collaborator for pending images and catalogued cards.
//!
//! A *pending image* is one paired capture waiting for a human to identify
//! it. Once identified it is *staged*: it receives a SKU, its objects move
//! under `staged/{sku}/`, and a [`CatalogCard`] row is written.

mod memory;

pub use memory::MemoryCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::fingerprint::Fingerprint;
use crate::pairing::PairFlag;

/// A persisted pair awaiting identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingImage {
    pub id: u64,
    /// `None` while pending
    pub sku: Option<String>,
    pub key_front: String,
    pub key_back: Option<String>,
    pub phash_front: Option<Fingerprint>,
    pub phash_back: Option<Fingerprint>,
    pub flags: Vec<PairFlag>,
    pub created_at: DateTime<Utc>,
    pub staged_at: Option<DateTime<Utc>>,
}

impl PendingImage {
    pub fn is_pending(&self) -> bool {
        self.sku.is_none()
    }
}

/// Insert payload for [`CatalogStore::insert_pending`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingImage {
    pub key_front: String,
    pub key_back: Option<String>,
    pub phash_front: Option<Fingerprint>,
    pub phash_back: Option<Fingerprint>,
    pub flags: Vec<PairFlag>,
}

/// An identified card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCard {
    pub sku: String,
    pub name: String,
    pub set: String,
    pub number: String,
    pub language: String,
    pub condition: String,
    pub holo: bool,
    pub staged_at: DateTime<Utc>,
}

/// Everything written when a pending image is staged.
#[derive(Debug, Clone)]
pub struct StageUpdate {
    pub id: u64,
    pub key_front: String,
    pub key_back: Option<String>,
    pub card: CatalogCard,
}

/// Storage of pending images, cards and SKU reservations.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Whether any record already uses `key` as its front key.
    async fn pending_front_exists(&self, key: &str) -> Result<bool, CatalogError>;

    /// Persist a new pending record and return its id.
    async fn insert_pending(&self, image: NewPendingImage) -> Result<u64, CatalogError>;

    /// `(phash_front, phash_back)` of every persisted record.
    async fn existing_fingerprints(
        &self,
    ) -> Result<Vec<(Option<Fingerprint>, Option<Fingerprint>)>, CatalogError>;

    async fn get_pending(&self, id: u64) -> Result<Option<PendingImage>, CatalogError>;

    /// Atomically claim `sku`. Returns `false` when it is already taken.
    async fn reserve_sku(&self, sku: &str) -> Result<bool, CatalogError>;

    /// Give back a reservation that was never staged.
    async fn release_sku(&self, sku: &str) -> Result<(), CatalogError>;

    /// Insert the card and point the pending record at its staged objects.
    ///
    /// Fails with [`CatalogError::NotFound`] when the record is missing or
    /// already carries a SKU.
    async fn stage_pending(&self, update: StageUpdate) -> Result<PendingImage, CatalogError>;
}
