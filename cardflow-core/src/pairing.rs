//! Front/back side classification and pairing within a burst.
//!
//! Pairing runs in three passes over one deduplicated burst:
//!
//! 1. filenames that say `front` are matched with the closest-in-time filename
//!    that says `back`;
//! 2. everything left over is matched greedily with its nearest-in-time
//!    neighbour, refusing partners that look like the same shot;
//! 3. whatever is still alone becomes a singleton.
//!
//! Pairing never crosses burst boundaries.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::burst::ObjectRef;
use crate::fingerprint::{lookup, Fingerprint};

static FRONT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[-_])(f|front)([-_.]|$)").expect("front marker pattern is valid")
});

static BACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[-_])(b|back)([-_.]|$)").expect("back marker pattern is valid")
});

/// Which face of the card a filename claims to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
    Unknown,
}

/// Classify a key by the markers in its basename.
///
/// The front marker wins when both are present.
pub fn classify_side(key: &str) -> Side {
    let base = key.rsplit('/').next().unwrap_or(key);
    if FRONT_RE.is_match(base) {
        Side::Front
    } else if BACK_RE.is_match(base) {
        Side::Back
    } else {
        Side::Unknown
    }
}

/// Descriptive flags attached to a pair and persisted with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairFlag {
    /// Paired because the shots were taken in the same burst
    PairedTimeBurst,
    /// Filenames did not say which side is which
    SideUnknown,
    /// No partner was found; front and back are the same key
    Singleton,
    /// Front resembles an image already in the catalog
    DuplicateFront,
    /// Back resembles an image already in the catalog
    DuplicateBack,
}

impl PairFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PairedTimeBurst => "PAIRED_TIME_BURST",
            Self::SideUnknown => "SIDE_UNKNOWN",
            Self::Singleton => "SINGLETON",
            Self::DuplicateFront => "DUPLICATE_FRONT",
            Self::DuplicateBack => "DUPLICATE_BACK",
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateFront | Self::DuplicateBack)
    }
}

impl std::fmt::Display for PairFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Front and back keys believed to show one physical card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub front_key: String,
    /// Equal to `front_key` for a singleton
    pub back_key: String,
    pub flags: Vec<PairFlag>,
}

impl Pair {
    pub fn new(front_key: impl Into<String>, back_key: impl Into<String>, flags: Vec<PairFlag>) -> Self {
        Self {
            front_key: front_key.into(),
            back_key: back_key.into(),
            flags,
        }
    }

    pub fn singleton(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(key.clone(), key, vec![PairFlag::Singleton, PairFlag::SideUnknown])
    }

    pub fn is_singleton(&self) -> bool {
        self.front_key == self.back_key
    }

    pub fn has_flag(&self, flag: PairFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Pair the members of one deduplicated burst.
///
/// `threshold` is the near-duplicate distance: two members within it are never
/// paired as front and back of the same card. Output is deterministic for the
/// same members, timestamps and fingerprints.
pub fn pair_burst(
    members: &[ObjectRef],
    fingerprints: &HashMap<String, Fingerprint>,
    threshold: u32,
) -> Vec<Pair> {
    let mut ordered: Vec<&ObjectRef> = members.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let fronts: Vec<&ObjectRef> = ordered
        .iter()
        .copied()
        .filter(|m| classify_side(&m.key) == Side::Front)
        .collect();
    let backs: Vec<&ObjectRef> = ordered
        .iter()
        .copied()
        .filter(|m| classify_side(&m.key) == Side::Back)
        .collect();

    let mut used: HashSet<&str> = HashSet::new();
    let mut pairs = Vec::new();

    for front in &fronts {
        let closest_back = backs
            .iter()
            .filter(|b| !used.contains(b.key.as_str()))
            .min_by(|a, b| {
                let da = (front.timestamp - a.timestamp).abs();
                let db = (front.timestamp - b.timestamp).abs();
                da.total_cmp(&db)
            });

        if let Some(back) = closest_back {
            used.insert(&front.key);
            used.insert(&back.key);
            pairs.push(Pair::new(
                front.key.clone(),
                back.key.clone(),
                vec![PairFlag::PairedTimeBurst],
            ));
        }
    }

    let remaining: Vec<&ObjectRef> = ordered
        .iter()
        .copied()
        .filter(|m| !used.contains(m.key.as_str()))
        .collect();

    for (i, a) in remaining.iter().enumerate() {
        if used.contains(a.key.as_str()) {
            continue;
        }
        let fp_a = lookup(fingerprints, &a.key);

        let mut partner: Option<&ObjectRef> = None;
        let mut best_dt = f64::INFINITY;
        for b in &remaining[i + 1..] {
            if used.contains(b.key.as_str()) {
                continue;
            }
            if fp_a.is_near(lookup(fingerprints, &b.key), threshold) {
                continue;
            }
            let dt = (a.timestamp - b.timestamp).abs();
            if partner.is_none() || dt < best_dt {
                best_dt = dt;
                partner = Some(*b);
            }
        }

        used.insert(&a.key);
        match partner {
            Some(b) => {
                used.insert(&b.key);
                pairs.push(Pair::new(
                    a.key.clone(),
                    b.key.clone(),
                    vec![PairFlag::PairedTimeBurst, PairFlag::SideUnknown],
                ));
            }
            None => pairs.push(Pair::singleton(a.key.clone())),
        }
    }

    pairs
}
