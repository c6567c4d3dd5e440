//! Perceptual fingerprints for card photographs.
//!
//! A fingerprint is a 64-bit DCT perceptual hash of the decoded, orientation
//! corrected RGB image, carried as a 16 character hex string. Visually similar
//! images land within a few bits of each other; unrelated images sit around
//! half the bit width apart.
//!
//! # Usage
//!
//! ```no_run
//! use cardflow_core::fingerprint::{hamming_distance, PerceptualHasher};
//!
//! let hasher = PerceptualHasher::new();
//! let a = hasher.fingerprint(&std::fs::read("front.jpg").unwrap()).unwrap();
//! let b = hasher.fingerprint(&std::fs::read("front-2.jpg").unwrap()).unwrap();
//! let near_duplicate = hamming_distance(a.as_str(), b.as_str()) <= 3;
//! ```

use std::collections::HashMap;
use std::io::Cursor;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Fingerprint width in bits.
pub const FINGERPRINT_BITS: u32 = 64;

/// Distance reported when either side cannot be compared.
///
/// Larger than any real distance, so a missing or corrupt hash never wins a
/// minimum-distance search and never marks content as a duplicate.
pub const UNCOMPARABLE: u32 = u32::MAX;

static EMPTY: Fingerprint = Fingerprint(String::new());

/// Hex-encoded 64-bit perceptual hash.
///
/// The empty fingerprint stands in for an image that failed to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Placeholder for an item whose bytes could not be decoded.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hamming distance to another fingerprint, or [`UNCOMPARABLE`].
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        hamming_distance(&self.0, &other.0)
    }

    /// Both fingerprints are valid and within `threshold` bits.
    pub fn is_near(&self, other: &Fingerprint, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint recorded for `key`, or the empty fingerprint.
pub fn lookup<'a>(fingerprints: &'a HashMap<String, Fingerprint>, key: &str) -> &'a Fingerprint {
    fingerprints.get(key).unwrap_or(&EMPTY)
}

/// Computes fingerprints from raw image bytes.
pub struct PerceptualHasher {
    hasher: Hasher,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .to_hasher();
        Self { hasher }
    }

    /// Decode, orient, normalize to RGB and hash.
    pub fn fingerprint(&self, image_data: &[u8]) -> Result<Fingerprint, DecodeError> {
        let image = decode_oriented(image_data)?;
        Ok(self.fingerprint_image(&image))
    }

    /// Hash an already decoded image.
    pub fn fingerprint_image(&self, image: &DynamicImage) -> Fingerprint {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let hash = self.hasher.hash_image(&rgb);
        Fingerprint(hex::encode(hash.as_bytes()))
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PerceptualHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptualHasher")
            .field("bits", &FINGERPRINT_BITS)
            .finish()
    }
}

/// Decode image bytes and apply the embedded EXIF orientation.
pub fn decode_oriented(image_data: &[u8]) -> Result<DynamicImage, DecodeError> {
    let reader = ImageReader::new(Cursor::new(image_data)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(DecodeError::UnknownFormat(format!(
            "{} bytes with no recognizable signature",
            image_data.len()
        )));
    }

    let mut decoder = reader.into_decoder()?;
    // Unreadable orientation metadata is not worth failing the image over.
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Hamming distance between two hex-encoded 64-bit fingerprints.
///
/// Returns [`UNCOMPARABLE`] when either side is empty, not hex, or wider than
/// 64 bits.
pub fn hamming_distance(a_hex: &str, b_hex: &str) -> u32 {
    match (parse_hex(a_hex), parse_hex(b_hex)) {
        (Some(a), Some(b)) => (a ^ b).count_ones(),
        _ => UNCOMPARABLE,
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}
