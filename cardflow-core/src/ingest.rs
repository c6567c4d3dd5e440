//! Ingestion runs: inbox listing to persisted pending records.
//!
//! A run lists every image under a prefix, groups the uploads into capture
//! bursts, fingerprints and deduplicates each burst, pairs fronts with backs,
//! flags anything that resembles catalog history, and persists one pending
//! record per new pair.
//!
//! Re-running over the same inbox is safe: a pair whose front key is already
//! recorded is counted as `skipped_existing` and left untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::burst::{group_bursts, ObjectRef};
use crate::catalog::{CatalogStore, NewPendingImage};
use crate::config::PipelineConfig;
use crate::dedupe::filter_near_duplicates;
use crate::duplicates::DuplicateIndex;
use crate::error::Result;
use crate::fingerprint::{lookup, Fingerprint, PerceptualHasher};
use crate::pairing::{pair_burst, Pair};
use crate::storage::ObjectStore;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Pairs produced by the pairing stage, persisted or not
    pub pairs: usize,
    pub inserted: usize,
    /// Pairs whose front key was already recorded
    pub skipped_existing: usize,
    /// Inserted pairs carrying at least one duplicate flag
    pub dupes_flagged: usize,
    /// Images that could not be downloaded or decoded
    pub failed: usize,
}

/// An image excluded from a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub key: String,
    pub reason: String,
}

/// Summary plus the images that were left out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub failures: Vec<ItemFailure>,
}

/// Pairs of one run with the fingerprints computed while building them.
struct PairingOutcome {
    pairs: Vec<Pair>,
    fingerprints: HashMap<String, Fingerprint>,
    failures: Vec<ItemFailure>,
}

/// Orchestrates an ingestion run against injected collaborators.
pub struct IngestPipeline {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogStore>,
    hasher: PerceptualHasher,
    config: PipelineConfig,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            hasher: PerceptualHasher::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run over `prefix` and return the counts.
    pub async fn run(&self, prefix: &str) -> Result<RunSummary> {
        Ok(self.run_report(prefix).await?.summary)
    }

    /// Run over `prefix` and return counts plus per-item failures.
    ///
    /// Listing and catalog failures abort the run. Download and decode
    /// failures only exclude the affected image.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn run_report(&self, prefix: &str) -> Result<RunReport> {
        let items = self.list_images(prefix).await?;
        if items.is_empty() {
            info!("No images under prefix");
            return Ok(RunReport::default());
        }
        debug!(images = items.len(), "Listed inbox");

        let PairingOutcome {
            pairs,
            fingerprints,
            failures,
        } = self.build_pairs(items).await;

        let existing = self.catalog.existing_fingerprints().await?;
        let mut index = DuplicateIndex::from_existing(existing, self.config.catalog_dupe_distance);

        let mut summary = RunSummary {
            pairs: pairs.len(),
            failed: failures.len(),
            ..RunSummary::default()
        };

        for pair in pairs {
            if self.catalog.pending_front_exists(&pair.front_key).await? {
                debug!(front = %pair.front_key, "Front already recorded, skipping");
                summary.skipped_existing += 1;
                continue;
            }

            let phash_front = lookup(&fingerprints, &pair.front_key).clone();
            let phash_back = if pair.is_singleton() {
                phash_front.clone()
            } else {
                lookup(&fingerprints, &pair.back_key).clone()
            };

            let mut flags = pair.flags.clone();
            flags.extend(index.flag(&phash_front, Some(&phash_back)));
            let is_dupe = flags.iter().any(|f| f.is_duplicate());

            let id = self
                .catalog
                .insert_pending(NewPendingImage {
                    key_front: pair.front_key.clone(),
                    key_back: Some(pair.back_key.clone()),
                    phash_front: Some(phash_front.clone()),
                    phash_back: Some(phash_back.clone()),
                    flags,
                })
                .await?;
            index.insert(Some(&phash_front), Some(&phash_back));

            summary.inserted += 1;
            if is_dupe {
                summary.dupes_flagged += 1;
            }
            debug!(id, front = %pair.front_key, back = %pair.back_key, dupe = is_dupe, "Recorded pair");
        }

        info!(
            pairs = summary.pairs,
            inserted = summary.inserted,
            skipped_existing = summary.skipped_existing,
            dupes_flagged = summary.dupes_flagged,
            failed = summary.failed,
            "Ingestion run complete"
        );

        Ok(RunReport { summary, failures })
    }

    /// Page through the listing and keep recognised image keys.
    async fn list_images(&self, prefix: &str) -> Result<Vec<ObjectRef>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.store.list_page(prefix, token.as_deref()).await?;
            items.extend(
                page.objects
                    .iter()
                    .filter(|o| self.config.is_image_key(&o.key))
                    .map(|o| o.to_object_ref()),
            );
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(items)
    }

    async fn build_pairs(&self, items: Vec<ObjectRef>) -> PairingOutcome {
        let threshold = self.config.batch_dupe_distance;
        let mut fingerprints = HashMap::new();
        let mut failures = Vec::new();
        let mut pairs = Vec::new();

        for burst in group_bursts(items, self.config.burst_window_secs) {
            let mut failed: HashSet<String> = HashSet::new();
            for member in &burst {
                let fp = match self.fingerprint_key(&member.key).await {
                    Ok(fp) => fp,
                    Err(reason) => {
                        warn!(key = %member.key, %reason, "Excluding image from run");
                        failed.insert(member.key.clone());
                        failures.push(ItemFailure {
                            key: member.key.clone(),
                            reason,
                        });
                        Fingerprint::empty()
                    }
                };
                fingerprints.insert(member.key.clone(), fp);
            }

            let usable: Vec<ObjectRef> = filter_near_duplicates(&burst, &fingerprints, threshold)
                .into_iter()
                .filter(|m| !failed.contains(&m.key))
                .collect();
            pairs.extend(pair_burst(&usable, &fingerprints, threshold));
        }

        PairingOutcome {
            pairs,
            fingerprints,
            failures,
        }
    }

    async fn fingerprint_key(&self, key: &str) -> std::result::Result<Fingerprint, String> {
        let bytes = self.store.get(key).await.map_err(|e| e.to_string())?;
        self.hasher.fingerprint(&bytes).map_err(|e| e.to_string())
    }
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}
