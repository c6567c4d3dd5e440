//! Ingest command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::info;

use cardflow_core::jobs::WorkerStats;
use cardflow_core::{
    dispatch_ingest, ChannelJobQueue, Dispatch, IngestPipeline, IngestWorker, PipelineConfig,
    RunReport,
};

use super::{open_catalog, open_store, save_catalog};

/// Execute the ingest command.
pub async fn execute(
    root: PathBuf,
    prefix: String,
    catalog_path: Option<PathBuf>,
    queued: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let config = PipelineConfig::from_env();
    let store = Arc::new(open_store(&root, &config)?);
    let catalog = Arc::new(open_catalog(catalog_path.as_deref()).await?);
    let pipeline = Arc::new(IngestPipeline::new(store, catalog.clone(), config));

    info!(root = %root.display(), prefix = %prefix, queued, "Starting ingestion");

    if queued {
        let (queue, jobs) = ChannelJobQueue::new();
        let worker = tokio::spawn(IngestWorker::new(pipeline.clone(), jobs).run());
        let dispatch = dispatch_ingest(&pipeline, &queue, &prefix, false)
            .await
            .context("Ingestion dispatch failed")?;
        drop(queue);
        let stats = worker.await.context("Ingest worker stopped unexpectedly")?;

        if let Some(path) = &catalog_path {
            save_catalog(&catalog, path).await?;
        }
        print_queued(&dispatch, &stats, json, quiet)?;
        if stats.failed > 0 {
            bail!("{} ingestion job(s) failed", stats.failed);
        }
        return Ok(());
    }

    let report = pipeline
        .run_report(&prefix)
        .await
        .with_context(|| format!("Ingestion of {prefix} failed"))?;

    if let Some(path) = &catalog_path {
        save_catalog(&catalog, path).await?;
    }
    print_report(&report, json, quiet)
}

fn print_report(report: &RunReport, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    let s = &report.summary;
    println!();
    println!("{}", "Ingestion complete".green().bold());
    println!("   {} {}", "Pairs:".dimmed(), s.pairs);
    println!("   {} {}", "Inserted:".dimmed(), s.inserted.to_string().green());
    println!("   {} {}", "Already recorded:".dimmed(), s.skipped_existing);
    if s.dupes_flagged > 0 {
        println!(
            "   {} {}",
            "Flagged duplicates:".dimmed(),
            s.dupes_flagged.to_string().yellow()
        );
    } else {
        println!("   {} 0", "Flagged duplicates:".dimmed());
    }
    if s.failed > 0 {
        println!("   {} {}", "Unreadable images:".dimmed(), s.failed.to_string().red());
        for failure in &report.failures {
            println!("     {} {}", failure.key.red(), failure.reason.dimmed());
        }
    }
    Ok(())
}

fn print_queued(dispatch: &Dispatch, stats: &WorkerStats, json: bool, quiet: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({ "dispatch": dispatch, "worker": stats });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    match dispatch {
        Dispatch::Queued { job_id } => println!("{} {}", "Queued as".green(), job_id),
        Dispatch::Inline { .. } | Dispatch::InlineFallback { .. } => {
            println!("{}", "Queue unavailable, ran inline".yellow())
        }
    }
    println!(
        "   {} {} completed, {} failed, {} skipped",
        "Worker:".dimmed(),
        stats.completed,
        stats.failed,
        stats.skipped
    );
    Ok(())
}
