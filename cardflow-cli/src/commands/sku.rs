//! Sku command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use cardflow_core::{ensure_unique, make_candidate};

use super::{open_catalog, CardArgs};

/// Execute the sku command.
///
/// Without a catalog this prints the bare candidate. With one, it prints the
/// SKU the next staging would receive; the snapshot is not modified.
pub async fn execute(card: CardArgs, catalog_path: Option<PathBuf>) -> Result<()> {
    let candidate = make_candidate(&card.into_attributes(""));

    let sku = match catalog_path {
        Some(path) => {
            let catalog = open_catalog(Some(path.as_path())).await?;
            ensure_unique(&catalog, &candidate)
                .await
                .context("Could not find a free SKU")?
        }
        None => candidate,
    };

    println!("{sku}");
    Ok(())
}
