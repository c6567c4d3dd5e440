//! Pipeline configuration
//!
//! Thresholds and tunables are carried in explicit structures handed to each
//! stage. Both structures load from `CARDFLOW_*` environment variables with
//! defaults for anything unset or unparsable.

/// Seconds between consecutive shots that still count as one burst.
pub const DEFAULT_BURST_WINDOW_SECS: f64 = 8.0;

/// Hamming distance at or below which two shots in one burst are the same shot.
pub const DEFAULT_BATCH_DUPE_DISTANCE: u32 = 3;

/// Hamming distance at or below which a new image duplicates catalog history.
pub const DEFAULT_CATALOG_DUPE_DISTANCE: u32 = 5;

/// Default key prefix scanned for fresh uploads.
pub const DEFAULT_INBOX_PREFIX: &str = "inbox/unsorted/";

/// Ingestion pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum gap between consecutive captures within a burst (inclusive)
    pub burst_window_secs: f64,
    /// Near-duplicate distance inside a burst (default: 3)
    pub batch_dupe_distance: u32,
    /// Duplicate distance against persisted fingerprints (default: 5)
    pub catalog_dupe_distance: u32,
    /// Lowercase extensions, with leading dot, accepted as images
    pub image_extensions: Vec<String>,
    /// Objects requested per listing page (default: 1000)
    pub list_page_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            burst_window_secs: DEFAULT_BURST_WINDOW_SECS,
            batch_dupe_distance: DEFAULT_BATCH_DUPE_DISTANCE,
            catalog_dupe_distance: DEFAULT_CATALOG_DUPE_DISTANCE,
            image_extensions: [".jpg", ".jpeg", ".png", ".webp", ".bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            list_page_size: 1000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let burst_window_secs = env_parse("CARDFLOW_BURST_WINDOW_SECS")
            .filter(|v: &f64| v.is_finite() && *v >= 0.0)
            .unwrap_or(defaults.burst_window_secs);

        let batch_dupe_distance =
            env_parse("CARDFLOW_BATCH_DUPE_DISTANCE").unwrap_or(defaults.batch_dupe_distance);

        let catalog_dupe_distance =
            env_parse("CARDFLOW_CATALOG_DUPE_DISTANCE").unwrap_or(defaults.catalog_dupe_distance);

        let image_extensions = std::env::var("CARDFLOW_IMAGE_EXTENSIONS")
            .ok()
            .map(|exts| {
                exts.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .map(|s| if s.starts_with('.') { s } else { format!(".{s}") })
                    .collect::<Vec<_>>()
            })
            .filter(|exts| !exts.is_empty())
            .unwrap_or(defaults.image_extensions);

        let list_page_size = env_parse("CARDFLOW_LIST_PAGE_SIZE")
            .filter(|v: &usize| *v > 0)
            .unwrap_or(defaults.list_page_size);

        Self {
            burst_window_secs,
            batch_dupe_distance,
            catalog_dupe_distance,
            image_extensions,
            list_page_size,
        }
    }

    /// Whether the key carries one of the accepted image extensions.
    pub fn is_image_key(&self, key: &str) -> bool {
        match key.rfind('.') {
            Some(i) => {
                let ext = key[i..].to_lowercase();
                self.image_extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

/// Thumbnail derivative configuration.
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// Version tag folded into derived keys; bump to force regeneration
    pub version: u32,
    /// Letterbox fill colour
    pub background: [u8; 3],
    /// Lossy WebP quality, 0-100 (default: 82)
    pub webp_quality: f32,
    /// JPEG quality, 1-100 (default: 85)
    pub jpeg_quality: u8,
    /// Unsharp mask blur radius
    pub sharpen_sigma: f32,
    /// Unsharp mask threshold
    pub sharpen_threshold: i32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            version: 1,
            background: [246, 247, 248],
            webp_quality: 82.0,
            jpeg_quality: 85,
            sharpen_sigma: 1.2,
            sharpen_threshold: 3,
        }
    }
}

impl ThumbnailConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let version = env_parse("CARDFLOW_THUMB_VERSION").unwrap_or(defaults.version);

        let webp_quality = env_parse("CARDFLOW_THUMB_WEBP_QUALITY")
            .filter(|q: &f32| (0.0..=100.0).contains(q))
            .unwrap_or(defaults.webp_quality);

        let jpeg_quality = env_parse("CARDFLOW_THUMB_JPEG_QUALITY")
            .filter(|q: &u8| (1..=100).contains(q))
            .unwrap_or(defaults.jpeg_quality);

        Self {
            version,
            webp_quality,
            jpeg_quality,
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
