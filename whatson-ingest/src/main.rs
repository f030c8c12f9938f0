//! whatson-ingest - refresh batch
//!
//! `whatson-ingest run` refreshes every title of one item type;
//! `whatson-ingest check-ids` lists stored titles the ids file no longer mentions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use whatson_common::config::WhatsonConfig;
use whatson_common::{db, ItemType};
use whatson_ingest::batch::{find_orphans, run_batch, BatchOptions};
use whatson_ingest::ids_file::load_ids_file;
use whatson_ingest::{adapters, preflight, ErrorThresholdGuard, Reconciler};

#[derive(Parser, Debug)]
#[command(name = "whatson-ingest")]
#[command(about = "Refresh batch for the What's On item store")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the configuration)
    #[arg(long, env = "WHATSON_DATABASE")]
    database: Option<PathBuf>,

    /// TMDB API key (overrides the configuration)
    #[arg(long, env = "WHATSON_TMDB_API_KEY", hide_env_values = true)]
    tmdb_api_key: Option<String>,

    /// Item type to process: movie or tvshow
    #[arg(short = 't', long, default_value = "movie")]
    item_type: ItemType,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh titles listed in the ids file
    Run {
        /// Resume from this index
        #[arg(long, default_value_t = 0)]
        start_index: usize,

        /// Leave titles already stored untouched
        #[arg(long)]
        skip_existing: bool,

        /// Also process rows not flagged active
        #[arg(long)]
        include_inactive: bool,

        /// Do not deactivate titles missing from the ids file
        #[arg(long)]
        no_sweep: bool,

        /// Do not probe third-party services first
        #[arg(long)]
        skip_preflight: bool,
    },

    /// List stored titles no longer present in the ids file
    CheckIds,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = WhatsonConfig::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(api_key) = args.tmdb_api_key {
        config.ingest.tmdb_api_key = Some(api_key);
    }

    info!("Starting whatson-ingest v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let pool = db::init_database_pool(&config.database_path).await?;

    let ids_path = config.ingest.ids_path(args.item_type).to_path_buf();
    let references = load_ids_file(&ids_path, args.item_type, &config.ingest.allocine_base_url)
        .with_context(|| format!("Failed to load ids file {}", ids_path.display()))?;
    info!(path = %ids_path.display(), rows = references.len(), "Loaded ids file");

    match args.command {
        Command::CheckIds => {
            let orphans = find_orphans(&pool, args.item_type, &references).await?;
            for orphan in &orphans {
                match &orphan.url {
                    Some(url) => warn!(content_address = %orphan.content_address, url = %url, "Stored title not in ids file"),
                    None => warn!(content_address = %orphan.content_address, "Stored title not in ids file"),
                }
            }
            info!(orphans = orphans.len(), "Ids check complete");
        }
        Command::Run {
            start_index,
            skip_existing,
            include_inactive,
            no_sweep,
            skip_preflight,
        } => {
            let ingest = Arc::new(config.ingest);

            if !skip_preflight {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()?;
                preflight::check_services(
                    &client,
                    &ingest.services,
                    ingest.retries,
                    Duration::from_millis(ingest.retry_delay_ms),
                )
                .await?;
            }

            let adapters = adapters::build_adapters(&ingest, args.item_type)?;
            if adapters.is_empty() {
                warn!("No source adapters configured, titles will be skipped");
            }

            let reconciler = Reconciler::new(adapters, ErrorThresholdGuard::from_config(&ingest), Arc::clone(&ingest));
            let options = BatchOptions {
                start_index,
                skip_existing,
                include_inactive,
                sweep: !no_sweep,
            };

            let report = run_batch(
                &pool,
                &reconciler,
                args.item_type,
                &references,
                &options,
                &ingest.keys_to_check,
            )
            .await
            .inspect_err(|e| error!("Refresh batch failed: {}", e))?;

            for skipped in &report.skipped {
                info!(index = skipped.index, url = %skipped.url, reason = %skipped.reason, "Skipped title");
            }
        }
    }

    pool.close().await;
    Ok(())
}
