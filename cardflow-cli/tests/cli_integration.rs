//! CLI integration tests for cardflow-cli.
//!
//! These tests run the actual binary against a temporary directory bucket
//! and check outputs, exit codes, and the files left behind.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the cardflow binary.
fn cardflow() -> Command {
    Command::cargo_bin("cardflow").unwrap()
}

fn card_png(seed: u32) -> Vec<u8> {
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

/// Bucket with one labelled front/back pair in the default inbox.
fn bucket_with_pair() -> TempDir {
    let dir = TempDir::new().unwrap();
    let inbox = dir.path().join("inbox").join("unsorted");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("zard_front.png"), card_png(1)).unwrap();
    fs::write(inbox.join("zard_back.png"), card_png(2)).unwrap();
    dir
}

fn ingest(root: &Path, catalog: &Path) -> assert_cmd::assert::Assert {
    cardflow()
        .args(["ingest", "--json", "--root"])
        .arg(root)
        .arg("--catalog")
        .arg(catalog)
        .assert()
}

// ============================================================================
// Help and Usage Tests
// ============================================================================

#[test]
fn test_help_lists_commands_and_exit_codes() {
    cardflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("thumbs"))
        .stdout(predicate::str::contains("stage"))
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("69"));
}

#[test]
fn test_version_displays_version() {
    cardflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cardflow"));
}

#[test]
fn test_missing_arguments_is_usage_error() {
    cardflow().args(["stage", "--root", "."]).assert().code(64);
}

// ============================================================================
// SKU Tests
// ============================================================================

#[test]
fn test_sku_prints_candidate() {
    cardflow()
        .args(["sku", "--set", "Base Set", "--number", "4/102", "--holo"])
        .assert()
        .success()
        .stdout("BS-4-102-EN-NM-H\n");
}

#[test]
fn test_sku_defaults_unknown_codes() {
    cardflow()
        .args(["sku", "--set", "Jungle", "--number", "60", "--language", "xx", "--condition", "mint"])
        .assert()
        .success()
        .stdout("J-60-EN-UNK-N\n");
}

// ============================================================================
// Ingest and Stage Tests
// ============================================================================

#[test]
fn test_ingest_records_pair_and_is_idempotent() {
    let bucket = bucket_with_pair();
    let catalog = bucket.path().join("catalog.json");

    ingest(bucket.path(), &catalog)
        .success()
        .stdout(predicate::str::contains("\"inserted\": 1"))
        .stdout(predicate::str::contains("\"pairs\": 1"));
    assert!(catalog.exists());

    let snapshot: serde_json::Value =
        serde_json::from_slice(&fs::read(&catalog).unwrap()).unwrap();
    let record = &snapshot["pending"][0];
    assert_eq!(record["key_front"], "inbox/unsorted/zard_front.png");
    assert_eq!(record["key_back"], "inbox/unsorted/zard_back.png");
    assert_eq!(record["flags"][0], "PAIRED_TIME_BURST");

    ingest(bucket.path(), &catalog)
        .success()
        .stdout(predicate::str::contains("\"inserted\": 0"))
        .stdout(predicate::str::contains("\"skipped_existing\": 1"));
}

#[test]
fn test_queued_ingest_runs_on_worker() {
    let bucket = bucket_with_pair();
    let catalog = bucket.path().join("catalog.json");

    cardflow()
        .args(["ingest", "--queued", "--json", "--root"])
        .arg(bucket.path())
        .arg("--catalog")
        .arg(&catalog)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mode\": \"queued\""))
        .stdout(predicate::str::contains("\"completed\": 1"));

    let snapshot: serde_json::Value =
        serde_json::from_slice(&fs::read(&catalog).unwrap()).unwrap();
    assert_eq!(snapshot["pending"].as_array().unwrap().len(), 1);
}

#[test]
fn test_stage_moves_photos_and_writes_card() {
    let bucket = bucket_with_pair();
    let catalog = bucket.path().join("catalog.json");
    ingest(bucket.path(), &catalog).success();

    cardflow()
        .args(["stage", "--root"])
        .arg(bucket.path())
        .arg("--catalog")
        .arg(&catalog)
        .args(["1", "--name", "Charizard", "--set", "Base Set", "--number", "4", "--holo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BS-4-EN-NM-H"));

    let staged = bucket.path().join("staged").join("BS-4-EN-NM-H");
    assert!(staged.join("front.png").exists());
    assert!(staged.join("back.png").exists());
    assert!(!bucket
        .path()
        .join("inbox/unsorted/zard_front.png")
        .exists());

    let snapshot: serde_json::Value =
        serde_json::from_slice(&fs::read(&catalog).unwrap()).unwrap();
    assert_eq!(snapshot["cards"][0]["sku"], "BS-4-EN-NM-H");
    assert_eq!(snapshot["pending"][0]["sku"], "BS-4-EN-NM-H");

    // Staging the same record again is a data error
    cardflow()
        .args(["stage", "--root"])
        .arg(bucket.path())
        .arg("--catalog")
        .arg(&catalog)
        .args(["1", "--name", "Charizard", "--set", "Base Set", "--number", "4"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("not found or already staged"));

    // The taken SKU now resolves to the first suffix
    cardflow()
        .args(["sku", "--set", "Base Set", "--number", "4", "--holo", "--catalog"])
        .arg(&catalog)
        .assert()
        .success()
        .stdout("BS-4-EN-NM-H-A\n");
}

#[test]
fn test_missing_bucket_is_input_error() {
    let dir = TempDir::new().unwrap();
    cardflow()
        .args(["ingest", "--root"])
        .arg(dir.path().join("nope"))
        .assert()
        .code(66)
        .stderr(predicate::str::contains("bucket directory"));
}

// ============================================================================
// Thumbnail Tests
// ============================================================================

#[test]
fn test_thumbs_writes_every_variant() {
    let bucket = bucket_with_pair();

    cardflow()
        .args(["thumbs", "--json", "--root"])
        .arg(bucket.path())
        .arg("inbox/unsorted/zard_front.png")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"preset\": \"zoom\""));

    let thumbs = bucket.path().join("thumbs").join("inbox").join("unsorted");
    let written: Vec<String> = fs::read_dir(&thumbs)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(written.len(), 6);
    assert_eq!(written.iter().filter(|n| n.ends_with(".webp")).count(), 3);
    assert!(written.iter().any(|n| n.starts_with("zard_front_1024x1365_")));

    // Second run only reports existing variants
    cardflow()
        .args(["thumbs", "--root"])
        .arg(bucket.path())
        .arg("inbox/unsorted/zard_front.png")
        .assert()
        .success()
        .stdout(predicate::str::contains("created").not());
}

#[test]
fn test_thumbs_missing_source_is_input_error() {
    let bucket = bucket_with_pair();
    cardflow()
        .args(["thumbs", "--root"])
        .arg(bucket.path())
        .arg("inbox/unsorted/absent.jpg")
        .assert()
        .code(66);
}
