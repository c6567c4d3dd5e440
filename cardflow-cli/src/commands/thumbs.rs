//! Thumbs command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use cardflow_core::thumbs::VariantOutcome;
use cardflow_core::{PipelineConfig, ThumbnailConfig, ThumbnailGenerator};

use super::open_store;

fn describe(outcome: &VariantOutcome) -> String {
    match outcome {
        VariantOutcome::Existing => "exists".dimmed().to_string(),
        VariantOutcome::Created => "created".green().to_string(),
        VariantOutcome::Failed(reason) => format!("{} ({reason})", "failed".red()),
    }
}

/// Execute the thumbs command.
pub async fn execute(root: PathBuf, key: String, json: bool, quiet: bool) -> Result<()> {
    let store = Arc::new(open_store(&root, &PipelineConfig::from_env())?);
    let generator = ThumbnailGenerator::new(store, ThumbnailConfig::from_env());

    let set = generator
        .ensure_thumbnails(&key)
        .await
        .with_context(|| format!("Failed to generate thumbnails for {key}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&set)?);
    } else if !quiet {
        println!();
        println!("{} {}", "Thumbnails for".bold(), key);
        for preset in &set.presets {
            println!("   {}", preset.preset.cyan());
            println!("     {}  {}", preset.webp.key, describe(&preset.webp.outcome));
            println!("     {}  {}", preset.jpeg.key, describe(&preset.jpeg.outcome));
        }
    }

    let failures = set.failures();
    if failures > 0 {
        bail!("{failures} thumbnail variant(s) could not be written");
    }
    Ok(())
}
