//! Near-duplicate removal inside one burst.
//!
//! Burst shooting usually produces several almost identical frames of the
//! same side. Only the earliest frame of each look-alike cluster survives.

use std::collections::HashMap;

use tracing::debug;

use crate::burst::ObjectRef;
use crate::fingerprint::{lookup, Fingerprint};

/// Keep members whose fingerprint is more than `threshold` bits away from
/// every member kept before them.
///
/// Members are visited in timestamp order (ties keep their given order).
/// A member without a usable fingerprint never matches and is always kept.
pub fn filter_near_duplicates(
    burst: &[ObjectRef],
    fingerprints: &HashMap<String, Fingerprint>,
    threshold: u32,
) -> Vec<ObjectRef> {
    let mut ordered: Vec<&ObjectRef> = burst.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut kept: Vec<ObjectRef> = Vec::with_capacity(ordered.len());
    for member in ordered {
        let fp = lookup(fingerprints, &member.key);
        let duplicate_of = kept
            .iter()
            .find(|k| fp.is_near(lookup(fingerprints, &k.key), threshold));

        match duplicate_of {
            Some(original) => {
                debug!(
                    key = %member.key,
                    kept = %original.key,
                    "Dropping near-duplicate shot"
                );
            }
            None => kept.push(member.clone()),
        }
    }

    kept
}
