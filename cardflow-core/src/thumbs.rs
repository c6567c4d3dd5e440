//! Display thumbnails for stored card photographs.
//!
//! Every source image gets three 3:4 presets, each in lossy WebP and a JPEG
//! fallback. Derived keys are deterministic in the source key, target size
//! and a version tag, so the presence of an object in the store is the only
//! record that a thumbnail was made. Bumping the version tag regenerates
//! everything under fresh keys.
//!
//! There is no locking: two workers racing on the same source both render
//! and upload identical bytes.

use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::{debug, info, instrument, warn};

use crate::config::ThumbnailConfig;
use crate::error::{CardflowError, Result};
use crate::fingerprint::decode_oriented;
use crate::storage::ObjectStore;

/// Named target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Grid, detail pane and lightbox sizes.
pub const PRESETS: [Preset; 3] = [
    Preset {
        name: "list",
        width: 352,
        height: 469,
    },
    Preset {
        name: "detail",
        width: 512,
        height: 682,
    },
    Preset {
        name: "zoom",
        width: 1024,
        height: 1365,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbFormat {
    Webp,
    Jpeg,
}

impl ThumbFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Key of one derivative: `thumbs/{base}_{w}x{h}_{sig}.{ext}`.
///
/// `base` is the source key without its extension and `sig` the first eight
/// hex digits of SHA3-256 over `"{base}-{w}x{h}-v{version}"`.
pub fn derived_key(src_key: &str, size: (u32, u32), format: ThumbFormat, version: u32) -> String {
    let base = strip_extension(src_key);
    let (w, h) = size;
    let digest = Sha3_256::digest(format!("{base}-{w}x{h}-v{version}").as_bytes());
    let sig = &hex::encode(digest)[..8];
    format!("thumbs/{base}_{w}x{h}_{sig}.{}", format.extension())
}

/// Drop the extension of the final path segment, if it has one.
fn strip_extension(key: &str) -> &str {
    let name_start = key.rfind('/').map_or(0, |i| i + 1);
    match key[name_start..].rfind('.') {
        // A leading dot names a hidden file, not an extension
        Some(0) | None => key,
        Some(dot) => &key[..name_start + dot],
    }
}

/// What happened to one derivative during [`ThumbnailGenerator::ensure_thumbnails`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum VariantOutcome {
    Existing,
    Created,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailVariant {
    pub key: String,
    pub outcome: VariantOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetThumbnails {
    pub preset: String,
    pub webp: ThumbnailVariant,
    pub jpeg: ThumbnailVariant,
}

/// Derivative keys of one source across every preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSet {
    pub source: String,
    pub presets: Vec<PresetThumbnails>,
}

impl ThumbnailSet {
    pub fn preset(&self, name: &str) -> Option<&PresetThumbnails> {
        self.presets.iter().find(|p| p.preset == name)
    }

    pub fn failures(&self) -> usize {
        self.presets
            .iter()
            .flat_map(|p| [&p.webp, &p.jpeg])
            .filter(|v| matches!(v.outcome, VariantOutcome::Failed(_)))
            .count()
    }
}

/// Renders and uploads missing thumbnails.
pub struct ThumbnailGenerator {
    store: Arc<dyn ObjectStore>,
    config: ThumbnailConfig,
}

impl ThumbnailGenerator {
    pub fn new(store: Arc<dyn ObjectStore>, config: ThumbnailConfig) -> Self {
        Self { store, config }
    }

    /// Make sure every preset exists in both formats.
    ///
    /// The source is downloaded and decoded at most once, and only when some
    /// derivative is missing. A failed encode or upload is reported in that
    /// variant's outcome and does not stop the remaining variants.
    #[instrument(skip(self))]
    pub async fn ensure_thumbnails(&self, src_key: &str) -> Result<ThumbnailSet> {
        let mut source: Option<DynamicImage> = None;
        let mut presets = Vec::with_capacity(PRESETS.len());

        for preset in PRESETS {
            let size = (preset.width, preset.height);
            let webp_key = derived_key(src_key, size, ThumbFormat::Webp, self.config.version);
            let jpeg_key = derived_key(src_key, size, ThumbFormat::Jpeg, self.config.version);

            let webp_exists = self.exists(&webp_key).await;
            let jpeg_exists = self.exists(&jpeg_key).await;

            if webp_exists && jpeg_exists {
                debug!(preset = preset.name, "Thumbnails already present");
                presets.push(PresetThumbnails {
                    preset: preset.name.to_string(),
                    webp: ThumbnailVariant {
                        key: webp_key,
                        outcome: VariantOutcome::Existing,
                    },
                    jpeg: ThumbnailVariant {
                        key: jpeg_key,
                        outcome: VariantOutcome::Existing,
                    },
                });
                continue;
            }

            let image = match source.take() {
                Some(image) => image,
                None => self.load_source(src_key).await?,
            };
            let canvas = self.render(&image, preset);
            source = Some(image);

            let webp = self
                .ensure_variant(webp_key, webp_exists, &canvas, ThumbFormat::Webp)
                .await;
            let jpeg = self
                .ensure_variant(jpeg_key, jpeg_exists, &canvas, ThumbFormat::Jpeg)
                .await;
            presets.push(PresetThumbnails {
                preset: preset.name.to_string(),
                webp,
                jpeg,
            });
        }

        let set = ThumbnailSet {
            source: src_key.to_string(),
            presets,
        };
        info!(failures = set.failures(), "Thumbnails ensured");
        Ok(set)
    }

    async fn exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key, error = %e, "Existence check failed, treating as missing");
                false
            }
        }
    }

    async fn load_source(&self, src_key: &str) -> Result<DynamicImage> {
        let bytes = self.store.get(src_key).await?;
        Ok(decode_oriented(&bytes)?)
    }

    async fn ensure_variant(
        &self,
        key: String,
        exists: bool,
        canvas: &RgbImage,
        format: ThumbFormat,
    ) -> ThumbnailVariant {
        if exists {
            return ThumbnailVariant {
                key,
                outcome: VariantOutcome::Existing,
            };
        }

        let uploaded = match self.encode(canvas, format) {
            Ok(bytes) => self
                .store
                .put(&key, bytes, format.content_type())
                .await
                .map_err(CardflowError::from),
            Err(e) => Err(e),
        };

        let outcome = match uploaded {
            Ok(()) => {
                debug!(key = %key, "Uploaded thumbnail");
                VariantOutcome::Created
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Thumbnail variant failed");
                VariantOutcome::Failed(e.to_string())
            }
        };
        ThumbnailVariant { key, outcome }
    }

    /// Sharpen, fit inside the preset and pad onto the background colour.
    pub fn render(&self, image: &DynamicImage, preset: Preset) -> RgbImage {
        let rgb = image.to_rgb8();
        let sharpened = imageops::unsharpen(
            &rgb,
            self.config.sharpen_sigma,
            self.config.sharpen_threshold,
        );

        let (src_w, src_h) = sharpened.dimensions();
        let scale = f64::min(
            preset.width as f64 / src_w as f64,
            preset.height as f64 / src_h as f64,
        );
        let fit_w = ((src_w as f64 * scale).round() as u32).clamp(1, preset.width);
        let fit_h = ((src_h as f64 * scale).round() as u32).clamp(1, preset.height);
        let resized = imageops::resize(&sharpened, fit_w, fit_h, FilterType::Lanczos3);

        let mut canvas = RgbImage::from_pixel(preset.width, preset.height, Rgb(self.config.background));
        let x = ((preset.width - fit_w) / 2) as i64;
        let y = ((preset.height - fit_h) / 2) as i64;
        imageops::overlay(&mut canvas, &resized, x, y);
        canvas
    }

    fn encode(&self, canvas: &RgbImage, format: ThumbFormat) -> Result<Vec<u8>> {
        match format {
            ThumbFormat::Webp => {
                let image = DynamicImage::ImageRgb8(canvas.clone());
                let encoder = webp::Encoder::from_image(&image)
                    .map_err(|e| CardflowError::Encode(format!("webp: {e}")))?;
                Ok(encoder.encode(self.config.webp_quality).to_vec())
            }
            ThumbFormat::Jpeg => {
                let mut buffer = std::io::Cursor::new(Vec::new());
                let encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality);
                canvas
                    .write_with_encoder(encoder)
                    .map_err(|e| CardflowError::Encode(format!("jpeg: {e}")))?;
                Ok(buffer.into_inner())
            }
        }
    }
}

impl std::fmt::Debug for ThumbnailGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailGenerator")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}
