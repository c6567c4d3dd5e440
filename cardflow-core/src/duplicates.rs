//! Duplicate detection against everything already ingested.

use crate::fingerprint::{Fingerprint, UNCOMPARABLE};
use crate::pairing::PairFlag;

/// In-memory set of persisted front/back fingerprints.
///
/// Seeded from the catalog at the start of a run and grown with every pair
/// persisted during the run, so duplicates introduced within one batch are
/// caught as well as duplicates of history.
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    fingerprints: Vec<Fingerprint>,
    threshold: u32,
}

impl DuplicateIndex {
    pub fn new(threshold: u32) -> Self {
        Self {
            fingerprints: Vec::new(),
            threshold,
        }
    }

    /// Seed from persisted `(front, back)` fingerprint pairs.
    pub fn from_existing<I>(existing: I, threshold: u32) -> Self
    where
        I: IntoIterator<Item = (Option<Fingerprint>, Option<Fingerprint>)>,
    {
        let mut index = Self::new(threshold);
        for (front, back) in existing {
            index.insert(front.as_ref(), back.as_ref());
        }
        index
    }

    /// Add a persisted pair's fingerprints. Missing or empty ones are ignored.
    pub fn insert(&mut self, front: Option<&Fingerprint>, back: Option<&Fingerprint>) {
        for fp in [front, back].into_iter().flatten() {
            if !fp.is_empty() {
                self.fingerprints.push(fp.clone());
            }
        }
    }

    /// Smallest distance from `fp` to any indexed fingerprint.
    ///
    /// [`UNCOMPARABLE`] when the index is empty or `fp` is unusable.
    pub fn min_distance(&self, fp: &Fingerprint) -> u32 {
        self.fingerprints
            .iter()
            .map(|existing| fp.distance(existing))
            .min()
            .unwrap_or(UNCOMPARABLE)
    }

    /// Duplicate flags for a pair about to be persisted.
    ///
    /// The back is only checked when present.
    pub fn flag(&self, front: &Fingerprint, back: Option<&Fingerprint>) -> Vec<PairFlag> {
        let mut flags = Vec::new();
        if self.min_distance(front) <= self.threshold {
            flags.push(PairFlag::DuplicateFront);
        }
        if let Some(back) = back {
            if self.min_distance(back) <= self.threshold {
                flags.push(PairFlag::DuplicateBack);
            }
        }
        flags
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}
