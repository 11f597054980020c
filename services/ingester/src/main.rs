//! Document ingester.
//!
//! Enumerates work items (descriptor ids and record files), runs a pool
//! of ingest workers over them and prints the aggregate report as JSON.

mod config_loader;
mod work;

use anyhow::{Context, Result};
use clap::Parser;
use document_builder::BuilderRegistry;
use ingest_common::IngestDescriptor;
use ingestion::IngestManager;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use storage::{MemoryStore, RedisConnector, StoreConnector};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config_loader::{IngesterConfig, LoggingConfig, StoreKind};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Builds documents from ingest descriptors and record files")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "INGESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Descriptor id to ingest (repeatable)
    #[arg(short, long = "descriptor")]
    descriptors: Vec<String>,

    /// Record file or directory to ingest with the job descriptor (repeatable)
    #[arg(short, long = "source")]
    sources: Vec<PathBuf>,

    /// Descriptor applied to every source file
    #[arg(short, long, env = "INGESTER_JOB_DESCRIPTOR")]
    job_descriptor: Option<String>,

    /// Write JSON files here instead of the document store
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Document store override (redis or memory)
    #[arg(long)]
    store: Option<String>,

    /// Log level
    #[arg(long, env = "INGESTER_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Command-line values win over the configuration file.
    fn apply(&self, config: &mut IngesterConfig) -> Result<()> {
        if let Some(job) = &self.job_descriptor {
            config.workers.job_descriptor = Some(job.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.persistence.output_dir = Some(dir.clone());
        }
        if let Some(count) = self.workers {
            config.workers.count = count;
        }
        if let Some(store) = &self.store {
            config.store.kind = match store.to_lowercase().as_str() {
                "redis" => StoreKind::Redis,
                "memory" => StoreKind::Memory,
                other => anyhow::bail!("Invalid store: {}. Must be redis or memory", other),
            };
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.to_lowercase();
        }
        config_loader::validate_config(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config_loader::load_config(path)?,
        None => IngesterConfig::default(),
    };
    args.apply(&mut config)?;
    init_tracing(&config.logging)?;

    info!(
        store = ?config.store.kind,
        workers = config.workers.count,
        "Starting ingester"
    );

    let registry = Arc::new(BuilderRegistry::with_defaults());
    let descriptors = config.descriptors(&registry.builder_types())?;

    let items = work::enumerate_items(&args.descriptors, &args.sources)?;
    anyhow::ensure!(
        !items.is_empty(),
        "No work items: pass --descriptor or --source"
    );
    if !args.sources.is_empty() && config.workers.job_descriptor.is_none() {
        warn!("Source files given without a job descriptor; they will fail");
    }

    let connector = build_connector(&config)?;
    seed_descriptors(connector.as_ref(), &descriptors).await?;

    let manager = IngestManager::new(
        connector,
        registry,
        config.worker_config(),
        config.workers.count,
    );
    let report = manager.run(items).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    anyhow::ensure!(
        report.is_success(),
        "Ingest finished with failures: {} failed, {} unprocessed, {} abandoned",
        report.items_failed,
        report.items_unprocessed,
        report.persist.abandoned
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = match logging.format.as_str() {
        "pretty" => builder.pretty().try_init(),
        _ => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

fn build_connector(config: &IngesterConfig) -> Result<Arc<dyn StoreConnector>> {
    let store = &config.store;
    Ok(match store.kind {
        StoreKind::Redis => Arc::new(
            RedisConnector::new(&store.url, store.key_prefix.clone(), config.op_timeout())
                .context("Invalid Redis configuration")?,
        ),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    })
}

/// Write the configured descriptors to the store before any worker starts.
async fn seed_descriptors(
    connector: &dyn StoreConnector,
    descriptors: &[IngestDescriptor],
) -> Result<()> {
    if descriptors.is_empty() {
        return Ok(());
    }

    let documents = descriptors
        .iter()
        .map(|d| serde_json::to_value(d).map(|value| (d.id.clone(), value)))
        .collect::<serde_json::Result<Vec<(String, Value)>>>()
        .context("Failed to serialize descriptors")?;
    let entries: Vec<(&str, &Value)> = documents.iter().map(|(id, v)| (id.as_str(), v)).collect();

    let mut conn = connector
        .connect()
        .await
        .context("Failed to connect to document store")?;
    let written = conn.bulk_upsert(&entries).await;
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close seeding connection");
    }

    let outcome = written.context("Failed to seed descriptors")?;
    info!(count = outcome.succeeded.len(), "Seeded descriptors");
    Ok(())
}
