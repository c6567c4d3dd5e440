//! Stage command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use cardflow_core::{stage_pending, PipelineConfig};

use super::{open_catalog, open_store, save_catalog, CardArgs};

/// Execute the stage command.
pub async fn execute(
    root: PathBuf,
    catalog_path: PathBuf,
    id: u64,
    name: String,
    card: CardArgs,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let store = open_store(&root, &PipelineConfig::from_env())?;
    let catalog = open_catalog(Some(catalog_path.as_path())).await?;

    let staged = stage_pending(&store, &catalog, id, card.into_attributes(name))
        .await
        .with_context(|| format!("Could not stage pending image {id}"))?;

    save_catalog(&catalog, &catalog_path).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&staged)?);
    } else if !quiet {
        println!();
        println!("{} {}", "Staged as".green().bold(), staged.sku.bold());
        println!("   {} {}", "Front:".dimmed(), staged.front_key);
        match &staged.back_key {
            Some(back) => println!("   {} {}", "Back:".dimmed(), back),
            None => println!("   {} {}", "Back:".dimmed(), "none (single photo)".dimmed()),
        }
    }
    Ok(())
}
