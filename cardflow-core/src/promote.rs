//! Promotion of a pending image to a catalogued card.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::catalog::{CatalogCard, CatalogStore, PendingImage, StageUpdate};
use crate::error::{CardflowError, CatalogError, Result};
use crate::sku::{ensure_unique, make_candidate, CardAttributes};
use crate::storage::ObjectStore;

/// Result of a successful staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedCard {
    pub sku: String,
    pub front_key: String,
    pub back_key: Option<String>,
    pub record: PendingImage,
}

/// Lowercased extension of the final key segment including the dot, or `.jpg`.
fn extension_or_jpg(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[dot..].to_lowercase(),
        _ => ".jpg".to_string(),
    }
}

/// Assign a SKU to pending record `id` and move its photos under `staged/{sku}/`.
///
/// The record must exist and carry no SKU yet. A singleton (back key equal
/// to the front key) ends up with no back key. If moving the objects fails
/// or writing the catalog fails, the photos are returned to their inbox keys
/// and the SKU reservation is released before the error is returned.
#[instrument(skip(store, catalog, attrs), fields(set = %attrs.set, number = %attrs.number))]
pub async fn stage_pending(
    store: &dyn ObjectStore,
    catalog: &dyn CatalogStore,
    id: u64,
    attrs: CardAttributes,
) -> Result<StagedCard> {
    let record = catalog
        .get_pending(id)
        .await?
        .filter(PendingImage::is_pending)
        .ok_or(CatalogError::NotFound(id))?;

    let sku = ensure_unique(catalog, &make_candidate(&attrs)).await?;

    let src_front = record.key_front.clone();
    let src_back = record.key_back.clone().filter(|back| *back != src_front);

    let dst_front = format!("staged/{sku}/front{}", extension_or_jpg(&src_front));
    let dst_back = src_back
        .as_deref()
        .map(|back| format!("staged/{sku}/back{}", extension_or_jpg(back)));

    if let Err(e) = move_photos(store, &src_front, &dst_front, src_back.as_deref(), dst_back.as_deref()).await {
        release_sku(catalog, &sku).await;
        return Err(e);
    }

    let update = StageUpdate {
        id,
        key_front: dst_front.clone(),
        key_back: dst_back.clone(),
        card: CatalogCard {
            sku: sku.clone(),
            name: attrs.name,
            set: attrs.set,
            number: attrs.number,
            language: attrs.language,
            condition: attrs.condition,
            holo: attrs.holo,
            staged_at: Utc::now(),
        },
    };
    let record = match catalog.stage_pending(update).await {
        Ok(record) => record,
        Err(e) => {
            // The record still names the inbox keys, so the photos go back there
            restore_photos(store, &src_front, &dst_front, src_back.as_deref(), dst_back.as_deref()).await;
            release_sku(catalog, &sku).await;
            return Err(e.into());
        }
    };

    info!(id, sku = %sku, "Staged pending image");
    Ok(StagedCard {
        sku,
        front_key: dst_front,
        back_key: dst_back,
        record,
    })
}

async fn release_sku(catalog: &dyn CatalogStore, sku: &str) {
    if let Err(e) = catalog.release_sku(sku).await {
        warn!(sku, error = %e, "Could not release SKU after failed staging");
    }
}

async fn restore_photos(
    store: &dyn ObjectStore,
    src_front: &str,
    dst_front: &str,
    src_back: Option<&str>,
    dst_back: Option<&str>,
) {
    if let Err(e) = store.move_object(dst_front, src_front).await {
        warn!(key = dst_front, error = %e, "Could not restore front after failed staging");
    }
    if let (Some(src), Some(dst)) = (src_back, dst_back) {
        if let Err(e) = store.move_object(dst, src).await {
            warn!(key = dst, error = %e, "Could not restore back after failed staging");
        }
    }
}

async fn move_photos(
    store: &dyn ObjectStore,
    src_front: &str,
    dst_front: &str,
    src_back: Option<&str>,
    dst_back: Option<&str>,
) -> Result<()> {
    store.move_object(src_front, dst_front).await?;

    if let (Some(src), Some(dst)) = (src_back, dst_back) {
        if let Err(e) = store.move_object(src, dst).await {
            // Put the front back so the record still points at real objects
            if let Err(undo) = store.move_object(dst_front, src_front).await {
                warn!(key = dst_front, error = %undo, "Could not restore front after failed back move");
            }
            return Err(CardflowError::from(e));
        }
    }
    Ok(())
}
