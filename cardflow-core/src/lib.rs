//! Cardflow Core - ingestion pipeline for trading-card photographs
//!
//! Photos land in an object-store inbox straight from a phone or scanner.
//! This crate turns that unsorted pile into pending catalog records and,
//! once a card is identified, into a staged card with a stable SKU.
//!
//! # Features
//!
//! - Burst grouping of captures by upload time
//! - 64-bit DCT perceptual fingerprints with EXIF orientation applied
//! - Near-duplicate suppression inside a burst and against catalog history
//! - Front/back pairing from filename markers, then nearest-in-time
//! - Human-readable SKUs with collision suffixes
//! - WebP and JPEG thumbnail derivatives (`thumbnails` feature)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cardflow_core::{IngestPipeline, LocalObjectStore, MemoryCatalog, PipelineConfig};
//!
//! # async fn example() -> cardflow_core::Result<()> {
//! let store = Arc::new(LocalObjectStore::new("/srv/bucket"));
//! let catalog = Arc::new(MemoryCatalog::new());
//! let pipeline = IngestPipeline::new(store, catalog, PipelineConfig::from_env());
//!
//! let summary = pipeline.run("inbox/unsorted/").await?;
//! println!("{} new pairs, {} flagged as duplicates", summary.inserted, summary.dupes_flagged);
//! # Ok(())
//! # }
//! ```

pub mod burst;
pub mod catalog;
pub mod config;
pub mod dedupe;
pub mod duplicates;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod jobs;
pub mod pairing;
pub mod promote;
pub mod sku;
pub mod storage;
#[cfg(feature = "thumbnails")]
pub mod thumbs;

// Re-export main types for convenience
pub use burst::{group_bursts, Burst, ObjectRef};
pub use catalog::{CatalogCard, CatalogStore, MemoryCatalog, NewPendingImage, PendingImage};
pub use config::{PipelineConfig, ThumbnailConfig, DEFAULT_INBOX_PREFIX};
pub use dedupe::filter_near_duplicates;
pub use duplicates::DuplicateIndex;
pub use error::{
    CardflowError, CatalogError, DecodeError, QueueError, Result, SkuError, StoreError,
};
pub use fingerprint::{hamming_distance, Fingerprint, PerceptualHasher, UNCOMPARABLE};
pub use ingest::{IngestPipeline, ItemFailure, RunReport, RunSummary};
pub use jobs::{dispatch_ingest, ChannelJobQueue, Dispatch, IngestWorker, JobId, JobQueue};
pub use pairing::{classify_side, pair_burst, Pair, PairFlag, Side};
pub use promote::{stage_pending, StagedCard};
pub use sku::{ensure_unique, make_candidate, CardAttributes};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectStore};

#[cfg(feature = "thumbnails")]
pub use thumbs::{derived_key, ThumbFormat, ThumbnailGenerator, ThumbnailSet};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    fn block_png(seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        let mut cells = [0u8; 64];
        for cell in cells.iter_mut() {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            *cell = (state >> 16) as u8;
        }
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            let v = cells[((y / 8) * 8 + x / 8) as usize];
            image::Rgb([v, v, v])
        });
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    /// Inbox to staged card: ingest a labelled pair, then identify it.
    #[tokio::test]
    async fn test_full_card_workflow() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert_at("inbox/unsorted/zard_front.png", block_png(11), 1_000.0);
        store.insert_at("inbox/unsorted/zard_back.png", block_png(12), 1_004.0);
        let catalog = Arc::new(MemoryCatalog::new());

        let pipeline = IngestPipeline::new(store.clone(), catalog.clone(), PipelineConfig::default());
        let summary = pipeline.run(DEFAULT_INBOX_PREFIX).await.expect("ingest");
        assert_eq!(summary.inserted, 1);

        let id = catalog.records()[0].id;
        let attrs = CardAttributes::new("Charizard", "Base Set", "4/102").with_holo(true);
        let staged = stage_pending(store.as_ref(), catalog.as_ref(), id, attrs)
            .await
            .expect("stage");
        assert_eq!(staged.sku, "BS-4-102-EN-NM-H");
        assert!(store.exists("staged/BS-4-102-EN-NM-H/front.png").await.unwrap());
        assert!(store.exists("staged/BS-4-102-EN-NM-H/back.png").await.unwrap());

        // Inbox is empty now, so a re-run finds nothing
        let again = pipeline.run(DEFAULT_INBOX_PREFIX).await.expect("re-run");
        assert_eq!(again, RunSummary::default());
    }
}
