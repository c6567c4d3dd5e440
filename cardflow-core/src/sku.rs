//! Human-readable SKU construction and uniqueness.
//!
//! A SKU reads `SET-NUMBER-LANG-COND-VARIANT`, e.g. `BS-58-EN-NM-H` for a
//! near-mint English holo from Base Set. Collisions get `-A` through `-Z`,
//! then `-2`, `-3`, and so on.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::catalog::CatalogStore;
use crate::error::{Result, SkuError};

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("separator pattern is valid"));

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").expect("word pattern is valid"));

const LANGUAGES: &[&str] = &["EN", "JP", "DE", "FR", "ES", "IT"];
const CONDITIONS: &[&str] = &["NM", "LP", "MP", "HP", "DMG", "GD"];

/// Identifying attributes entered when a card is staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardAttributes {
    pub name: String,
    pub set: String,
    pub number: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default)]
    pub holo: bool,
}

fn default_language() -> String {
    "EN".to_string()
}

fn default_condition() -> String {
    "NM".to_string()
}

impl CardAttributes {
    /// English, near mint, non-holo.
    pub fn new(name: impl Into<String>, set: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            set: set.into(),
            number: number.into(),
            language: default_language(),
            condition: default_condition(),
            holo: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_holo(mut self, holo: bool) -> Self {
        self.holo = holo;
        self
    }
}

/// Uppercase `s` with every non-alphanumeric run collapsed to `-`.
///
/// Leading and trailing separators are trimmed and the result truncated to
/// `max_len` characters. Nothing left yields `UNK`.
pub fn slug(s: &str, max_len: usize) -> String {
    let collapsed = NON_ALNUM.replace_all(s, "-");
    let slug: String = collapsed
        .trim_matches('-')
        .to_uppercase()
        .chars()
        .take(max_len)
        .collect();
    if slug.is_empty() {
        "UNK".to_string()
    } else {
        slug
    }
}

/// Initials of the set name's words, at most four.
pub fn set_code(set_name: &str) -> String {
    let initials: String = WORD
        .find_iter(set_name)
        .filter_map(|m| m.as_str().chars().next())
        .take(4)
        .collect();
    if initials.is_empty() {
        slug(set_name, 4)
    } else {
        initials.to_uppercase()
    }
}

pub fn lang_code(language: &str) -> &'static str {
    let wanted = language.trim().to_uppercase();
    LANGUAGES
        .iter()
        .find(|code| **code == wanted)
        .copied()
        .unwrap_or("EN")
}

pub fn condition_code(condition: &str) -> &'static str {
    let wanted = condition.trim().to_uppercase();
    CONDITIONS
        .iter()
        .find(|code| **code == wanted)
        .copied()
        .unwrap_or("UNK")
}

pub fn variant_code(holo: bool) -> &'static str {
    if holo {
        "H"
    } else {
        "N"
    }
}

/// Base SKU before collision handling.
pub fn make_candidate(attrs: &CardAttributes) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        set_code(&attrs.set),
        slug(&attrs.number, 8),
        lang_code(&attrs.language),
        condition_code(&attrs.condition),
        variant_code(attrs.holo)
    )
}

/// Candidate followed by its suffixed alternatives, in trial order.
#[derive(Debug, Clone)]
pub struct SuffixSequence {
    candidate: String,
    attempt: Option<u32>,
    limit: u32,
}

impl Iterator for SuffixSequence {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let attempt = self.attempt?;
        if attempt >= self.limit {
            self.attempt = None;
            return None;
        }
        self.attempt = attempt.checked_add(1);

        Some(match attempt {
            0 => self.candidate.clone(),
            1..=26 => {
                let letter = char::from(b'A' + (attempt - 1) as u8);
                format!("{}-{letter}", self.candidate)
            }
            n => format!("{}-{}", self.candidate, n - 25),
        })
    }
}

/// Every SKU `candidate` may resolve to.
pub fn suffix_sequence(candidate: &str) -> SuffixSequence {
    bounded_suffix_sequence(candidate, u32::MAX)
}

/// The first `limit` entries of [`suffix_sequence`].
pub fn bounded_suffix_sequence(candidate: &str, limit: u32) -> SuffixSequence {
    SuffixSequence {
        candidate: candidate.to_string(),
        attempt: Some(0),
        limit,
    }
}

/// Reserve the first free SKU derived from `candidate`.
pub async fn ensure_unique(catalog: &dyn CatalogStore, candidate: &str) -> Result<String> {
    reserve_first_free(catalog, suffix_sequence(candidate), candidate).await
}

/// Like [`ensure_unique`], giving up after `max_attempts` tries.
pub async fn ensure_unique_within(
    catalog: &dyn CatalogStore,
    candidate: &str,
    max_attempts: u32,
) -> Result<String> {
    reserve_first_free(
        catalog,
        bounded_suffix_sequence(candidate, max_attempts),
        candidate,
    )
    .await
}

#[instrument(skip(catalog, sequence))]
async fn reserve_first_free(
    catalog: &dyn CatalogStore,
    sequence: SuffixSequence,
    candidate: &str,
) -> Result<String> {
    for sku in sequence {
        if catalog.reserve_sku(&sku).await? {
            debug!(sku = %sku, "Reserved SKU");
            return Ok(sku);
        }
        debug!(sku = %sku, "SKU taken, trying next suffix");
    }
    Err(SkuError::Exhausted(candidate.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::error::CardflowError;

    #[test]
    fn test_slug() {
        assert_eq!(slug("  base set: 1st ed!! ", 16), "BASE-SET-1ST-ED");
        assert_eq!(slug("001/102", 8), "001-102");
        assert_eq!(slug("abcdefghijkl", 8), "ABCDEFGH");
        assert_eq!(slug("***", 8), "UNK");
        assert_eq!(slug("", 4), "UNK");
    }

    #[test]
    fn test_set_code() {
        assert_eq!(set_code("Base Set"), "BS");
        assert_eq!(set_code("Sword & Shield: Evolving Skies 2021"), "SSES");
        assert_eq!(set_code("jungle"), "J");
        assert_eq!(set_code("---"), "UNK");
    }

    #[test]
    fn test_code_tables() {
        assert_eq!(lang_code("jp"), "JP");
        assert_eq!(lang_code("Klingon"), "EN");
        assert_eq!(lang_code(""), "EN");
        assert_eq!(condition_code("dmg"), "DMG");
        assert_eq!(condition_code("mint"), "UNK");
        assert_eq!(variant_code(true), "H");
        assert_eq!(variant_code(false), "N");
    }

    #[test]
    fn test_make_candidate() {
        let attrs = CardAttributes::new("Charizard", "Base Set", "4/102")
            .with_condition("lp")
            .with_holo(true);
        assert_eq!(make_candidate(&attrs), "BS-4-102-EN-LP-H");

        let attrs = CardAttributes::new("?", "ABC", "001");
        assert_eq!(make_candidate(&attrs), "A-001-EN-NM-N");
    }

    #[test]
    fn test_suffix_order() {
        let seq: Vec<String> = suffix_sequence("X").take(30).collect();
        assert_eq!(seq[0], "X");
        assert_eq!(seq[1], "X-A");
        assert_eq!(seq[26], "X-Z");
        assert_eq!(seq[27], "X-2");
        assert_eq!(seq[29], "X-4");
    }

    #[test]
    fn test_bounded_sequence_ends() {
        assert_eq!(bounded_suffix_sequence("X", 3).count(), 3);
        assert_eq!(bounded_suffix_sequence("X", 0).count(), 0);
    }

    #[tokio::test]
    async fn test_collision_takes_first_suffix() {
        let catalog = MemoryCatalog::new();
        catalog.reserve_sku("ABC-001-EN-NM-N").await.unwrap();
        let sku = ensure_unique(&catalog, "ABC-001-EN-NM-N").await.unwrap();
        assert_eq!(sku, "ABC-001-EN-NM-N-A");
    }

    #[tokio::test]
    async fn test_letters_then_numbers() {
        let catalog = MemoryCatalog::new();
        for sku in bounded_suffix_sequence("S", 27) {
            catalog.reserve_sku(&sku).await.unwrap();
        }
        assert_eq!(ensure_unique(&catalog, "S").await.unwrap(), "S-2");
        assert_eq!(ensure_unique(&catalog, "S").await.unwrap(), "S-3");
    }

    #[tokio::test]
    async fn test_exhaustion_is_an_error() {
        let catalog = MemoryCatalog::new();
        for sku in bounded_suffix_sequence("S", 5) {
            catalog.reserve_sku(&sku).await.unwrap();
        }
        let err = ensure_unique_within(&catalog, "S", 5).await.unwrap_err();
        assert!(matches!(err, CardflowError::Sku(SkuError::Exhausted(_))));
    }
}
