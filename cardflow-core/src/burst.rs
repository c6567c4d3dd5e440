//! Time-window grouping of uploads into capture bursts.

use serde::{Deserialize, Serialize};

/// An object-store key with its capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    /// Seconds since the Unix epoch; `0.0` when the store reported no time.
    pub timestamp: f64,
}

impl ObjectRef {
    pub fn new(key: impl Into<String>, timestamp: f64) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }
}

/// Time-contiguous run of captures, ordered by timestamp.
pub type Burst = Vec<ObjectRef>;

/// Split items into bursts.
///
/// Items are stably sorted by timestamp, so equal timestamps keep listing
/// order. A new burst starts whenever the gap to the previous item exceeds
/// `window_secs`; a gap of exactly `window_secs` stays in the current burst.
pub fn group_bursts(mut items: Vec<ObjectRef>, window_secs: f64) -> Vec<Burst> {
    items.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut bursts: Vec<Burst> = Vec::new();
    let mut current: Burst = Vec::new();

    for item in items {
        if let Some(prev) = current.last() {
            if item.timestamp - prev.timestamp > window_secs {
                bursts.push(std::mem::take(&mut current));
            }
        }
        current.push(item);
    }
    if !current.is_empty() {
        bursts.push(current);
    }

    bursts
}
