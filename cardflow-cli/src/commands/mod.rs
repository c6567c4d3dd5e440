//! Subcommand implementations.

pub mod ingest;
pub mod sku;
pub mod stage;
pub mod thumbs;

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use cardflow_core::{CardAttributes, LocalObjectStore, MemoryCatalog, PipelineConfig};

/// Identifying card attributes shared by `stage` and `sku`.
#[derive(Args, Debug, Clone)]
pub struct CardArgs {
    /// Set name, e.g. "Base Set"
    #[arg(long)]
    pub set: String,

    /// Collector number, e.g. "4/102"
    #[arg(long)]
    pub number: String,

    /// Language code (EN, JP, DE, FR, ES, IT)
    #[arg(long, default_value = "EN")]
    pub language: String,

    /// Condition code (NM, LP, MP, HP, DMG, GD)
    #[arg(long, default_value = "NM")]
    pub condition: String,

    /// Holographic variant
    #[arg(long)]
    pub holo: bool,
}

impl CardArgs {
    pub fn into_attributes(self, name: impl Into<String>) -> CardAttributes {
        CardAttributes::new(name, self.set, self.number)
            .with_language(self.language)
            .with_condition(self.condition)
            .with_holo(self.holo)
    }
}

/// Open a bucket directory, which must already exist.
pub fn open_store(root: &Path, config: &PipelineConfig) -> Result<LocalObjectStore> {
    if !root.is_dir() {
        bail!("Failed to read bucket directory: {}", root.display());
    }
    Ok(LocalObjectStore::new(root).with_page_size(config.list_page_size))
}

/// Load a catalog snapshot, starting empty when the file does not exist yet.
pub async fn open_catalog(path: Option<&Path>) -> Result<MemoryCatalog> {
    match path {
        Some(path) => MemoryCatalog::open(path)
            .await
            .with_context(|| format!("Failed to read catalog snapshot: {}", path.display())),
        None => Ok(MemoryCatalog::new()),
    }
}

pub async fn save_catalog(catalog: &MemoryCatalog, path: &Path) -> Result<()> {
    catalog
        .save(path)
        .await
        .with_context(|| format!("Failed to write catalog snapshot: {}", path.display()))
}
