//! End-to-end ingestion scenarios over generated card photographs.
//!
//! Images are 64x64 grids of random grey blocks. Different seeds give
//! fingerprints roughly half the bit width apart, while the same seed gives
//! identical fingerprints, which makes duplicate behaviour predictable.

use std::io::Cursor;
use std::sync::Arc;

use cardflow_core::{
    CatalogStore, IngestPipeline, LocalObjectStore, MemoryCatalog, MemoryObjectStore, PairFlag,
    PerceptualHasher, PipelineConfig, RunSummary,
};
use image::{ImageBuffer, Rgb, RgbImage};

const INBOX: &str = "inbox/unsorted/";
const T: f64 = 1_700_000_000.0;

fn card_image(seed: u32) -> RgbImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let mut cells = [0u8; 64];
    for cell in cells.iter_mut() {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        *cell = (state >> 16) as u8;
    }
    ImageBuffer::from_fn(64, 64, |x, y| {
        let v = cells[((y / 8) * 8 + x / 8) as usize];
        Rgb([v, v, v])
    })
}

fn jpeg(seed: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, 95);
    card_image(seed)
        .write_with_encoder(encoder)
        .expect("JPEG encoding failed");
    buffer.into_inner()
}

fn png(seed: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    card_image(seed)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("PNG encoding failed");
    buffer.into_inner()
}

fn setup() -> (Arc<MemoryObjectStore>, Arc<MemoryCatalog>, IngestPipeline) {
    let store = Arc::new(MemoryObjectStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let pipeline = IngestPipeline::new(store.clone(), catalog.clone(), PipelineConfig::default());
    (store, catalog, pipeline)
}

/// Two near-identical front shots, a back 4s later, and a lone shot long after.
///
/// The second front is a JPEG re-encode of the first, so the two differ in
/// bytes and are matched by fingerprint distance alone.
fn seed_four_key_inbox(store: &MemoryObjectStore) {
    store.insert_at("inbox/unsorted/card1_front.jpg", png(1), T);
    store.insert_at("inbox/unsorted/card1_front_2.jpg", jpeg(1), T + 2.0);
    store.insert_at("inbox/unsorted/card1_back.jpg", png(2), T + 4.0);
    store.insert_at("inbox/unsorted/other.jpg", png(3), T + 100.0);
}

#[tokio::test]
async fn test_four_key_scenario() {
    let (store, catalog, pipeline) = setup();
    seed_four_key_inbox(&store);

    let hasher = PerceptualHasher::new();
    let front = hasher.fingerprint(&png(1)).unwrap();
    let reshot = hasher.fingerprint(&jpeg(1)).unwrap();
    assert_ne!(png(1), jpeg(1));
    assert!(front.distance(&reshot) <= 3, "distance was {}", front.distance(&reshot));

    let summary = pipeline.run(INBOX).await.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            pairs: 2,
            inserted: 2,
            skipped_existing: 0,
            dupes_flagged: 0,
            failed: 0,
        }
    );

    let records = catalog.records();
    assert_eq!(records[0].key_front, "inbox/unsorted/card1_front.jpg");
    assert_eq!(records[0].key_back.as_deref(), Some("inbox/unsorted/card1_back.jpg"));
    assert_eq!(records[0].flags, vec![PairFlag::PairedTimeBurst]);
    assert_eq!(records[1].key_front, "inbox/unsorted/other.jpg");
    assert_eq!(records[1].flags, vec![PairFlag::Singleton, PairFlag::SideUnknown]);
    assert!(records
        .iter()
        .all(|r| r.key_front != "inbox/unsorted/card1_front_2.jpg"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (store, catalog, pipeline) = setup();
    seed_four_key_inbox(&store);

    let first = pipeline.run(INBOX).await.unwrap();
    let second = pipeline.run(INBOX).await.unwrap();

    assert_eq!(second.pairs, first.pairs);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped_existing, first.inserted);
    assert_eq!(catalog.records().len(), 2);
}

#[tokio::test]
async fn test_duplicates_within_one_run_are_flagged() {
    let (store, catalog, pipeline) = setup();
    // Same card photographed twice, an hour apart
    store.insert_at("inbox/unsorted/morning_front.png", png(7), T);
    store.insert_at("inbox/unsorted/morning_back.png", png(8), T + 3.0);
    store.insert_at("inbox/unsorted/evening_front.png", png(7), T + 3600.0);
    store.insert_at("inbox/unsorted/evening_back.png", png(8), T + 3603.0);

    let summary = pipeline.run(INBOX).await.unwrap();
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.dupes_flagged, 1);

    let evening = catalog
        .records()
        .into_iter()
        .find(|r| r.key_front == "inbox/unsorted/evening_front.png")
        .unwrap();
    assert!(evening.flags.contains(&PairFlag::DuplicateFront));
    assert!(evening.flags.contains(&PairFlag::DuplicateBack));
}

#[tokio::test]
async fn test_non_images_and_other_prefixes_ignored() {
    let (store, catalog, pipeline) = setup();
    store.insert_at("inbox/unsorted/readme.txt", b"notes".to_vec(), T);
    store.insert_at("inbox/unsorted/raw.CR2", b"raw".to_vec(), T);
    store.insert_at("inbox/unsorted/scan.BMP", png(4), T);
    store.insert_at("staged/X/front.jpg", png(5), T);

    let summary = pipeline.run(INBOX).await.unwrap();
    assert_eq!(summary.pairs, 1);
    assert_eq!(catalog.records()[0].key_front, "inbox/unsorted/scan.BMP");
}

#[tokio::test]
async fn test_listing_spans_many_pages() {
    let store = Arc::new(MemoryObjectStore::with_page_size(2));
    let catalog = Arc::new(MemoryCatalog::new());
    for i in 0..7u32 {
        // Each shot in its own burst
        store.insert_at(format!("inbox/unsorted/{i:02}.jpg"), jpeg(100 + i), T + 60.0 * i as f64);
    }
    let pipeline = IngestPipeline::new(store.clone(), catalog.clone(), PipelineConfig::default());

    let summary = pipeline.run(INBOX).await.unwrap();
    assert_eq!(summary.pairs, 7);
    assert_eq!(summary.inserted, 7);
}

#[tokio::test]
async fn test_failed_decode_does_not_abort_run() {
    let (store, catalog, pipeline) = setup();
    store.insert_at("inbox/unsorted/ok_front.jpg", png(1), T);
    store.insert_at("inbox/unsorted/truncated_back.jpg", png(2)[..40].to_vec(), T + 1.0);
    store.insert_at("inbox/unsorted/later.jpg", png(3), T + 500.0);

    let report = pipeline.run_report(INBOX).await.unwrap();
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.inserted, 2);
    assert_eq!(report.failures[0].key, "inbox/unsorted/truncated_back.jpg");
    assert!(!catalog
        .pending_front_exists("inbox/unsorted/truncated_back.jpg")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_history_from_previous_catalog_flags_new_upload() {
    let (store, catalog, pipeline) = setup();
    store.insert_at("inbox/unsorted/first_front.png", png(21), T);
    store.insert_at("inbox/unsorted/first_back.png", png(22), T + 1.0);
    pipeline.run(INBOX).await.unwrap();

    // The same back shows up paired with an unrelated front
    store.insert_at("inbox/unsorted/second_front.png", png(23), T + 900.0);
    store.insert_at("inbox/unsorted/second_back.png", png(22), T + 901.0);
    let summary = pipeline.run(INBOX).await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(summary.dupes_flagged, 1);

    let second = catalog
        .records()
        .into_iter()
        .find(|r| r.key_front == "inbox/unsorted/second_front.png")
        .unwrap();
    assert!(!second.flags.contains(&PairFlag::DuplicateFront));
    assert!(second.flags.contains(&PairFlag::DuplicateBack));
}

#[tokio::test]
async fn test_local_directory_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox").join("unsorted");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::write(inbox.join("pika_front.png"), png(31)).unwrap();
    std::fs::write(inbox.join("pika_back.png"), png(32)).unwrap();

    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let catalog = Arc::new(MemoryCatalog::new());
    let pipeline = IngestPipeline::new(store, catalog.clone(), PipelineConfig::default());

    let summary = pipeline.run(INBOX).await.unwrap();
    assert_eq!(summary.pairs, 1);
    let record = &catalog.records()[0];
    assert_eq!(record.key_front, "inbox/unsorted/pika_front.png");
    assert_eq!(record.key_back.as_deref(), Some("inbox/unsorted/pika_back.png"));
}
