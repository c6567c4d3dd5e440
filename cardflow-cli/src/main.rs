//! Cardflow CLI - trading-card photo ingestion and cataloguing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, EnvFilter};

use cardflow_core::DEFAULT_INBOX_PREFIX;

mod commands;
mod exit_codes;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Data error (record not found or already staged, SKU space exhausted)
  66  Cannot open input (missing source image or catalog snapshot)
  69  Service unavailable (object store, catalog or job queue)
  74  I/O error (cannot write objects or catalog snapshot)";

#[derive(Parser)]
#[command(name = "cardflow")]
#[command(author, version, about = "Trading-card photo ingestion and cataloguing", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Log pipeline progress at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print nothing but errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair and record new uploads under an inbox prefix
    Ingest {
        /// Directory acting as the object-store bucket
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Key prefix to scan
        #[arg(long, default_value = DEFAULT_INBOX_PREFIX)]
        prefix: String,

        /// Catalog snapshot to load and update (created if missing)
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Hand the run to a background worker instead of running inline
        #[arg(long)]
        queued: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate missing list/detail/zoom thumbnails for one image
    Thumbs {
        /// Directory acting as the object-store bucket
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Object key of the source image
        #[arg(value_name = "KEY")]
        key: String,

        /// Print the derived keys as JSON
        #[arg(long)]
        json: bool,
    },

    /// Assign a SKU to a pending image and move its photos under staged/
    Stage {
        /// Directory acting as the object-store bucket
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Catalog snapshot holding the pending record
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Pending record id
        #[arg(value_name = "ID")]
        id: u64,

        #[command(flatten)]
        card: commands::CardArgs,

        /// Card name
        #[arg(long)]
        name: String,

        /// Print the staged card as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the SKU a card would receive
    Sku {
        #[command(flatten)]
        card: commands::CardArgs,

        /// Resolve collisions against this catalog snapshot
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_directive = if verbose {
        "cardflow_core=debug,info"
    } else if quiet {
        "error"
    } else {
        "cardflow_core=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(exit_codes::USAGE_ERROR);
        }
        // --help and --version
        Err(e) => e.exit(),
    };
    init_tracing(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    let result = match cli.command {
        Commands::Ingest {
            root,
            prefix,
            catalog,
            queued,
            json,
        } => commands::ingest::execute(root, prefix, catalog, queued, json, quiet).await,
        Commands::Thumbs { root, key, json } => {
            commands::thumbs::execute(root, key, json, quiet).await
        }
        Commands::Stage {
            root,
            catalog,
            id,
            card,
            name,
            json,
        } => commands::stage::execute(root, catalog, id, name, card, json, quiet).await,
        Commands::Sku { card, catalog } => commands::sku::execute(card, catalog).await,
    };

    if let Err(err) = result {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = &exit.message {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
