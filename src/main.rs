// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use bucketeer::core::parse_locator;
use bucketeer::storage::NewFile;
use bucketeer::{
    forget_file, run_locked, Config, DetectOptions, FileCatalog, Job, LocalStores, Scheduler,
    SharedContext, TextDetector,
};

#[derive(Parser)]
#[command(name = "bucketeer")]
#[command(about = "Sync local files to S3-compatible storage", long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/bucketeer/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both sweeps on the configured interval until Ctrl-C
    Run,
    /// Run the upload sweep once
    UploadSweep,
    /// Run the deletion sweep once
    DeletionSweep,
    /// Detect text in a synced image
    DetectText {
        file_id: i64,
        /// Minimum confidence (exclusive)
        #[arg(long, default_value_t = 90.0)]
        confidence: f32,
        /// Print full detections instead of just the text
        #[arg(long)]
        full: bool,
        /// Only WORD or LINE detections
        #[arg(long = "type")]
        kind: Option<String>,
    },
    /// Register a local file (path relative to the data root)
    Register {
        rel_path: String,
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        subtype: String,
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
    },
    /// Register a subtype as eligible for upload
    RegisterSubtype {
        name: String,
        /// Mark the subtype as not backed by a file
        #[arg(long)]
        not_file: bool,
    },
    /// Delete a local record and queue its remote object for deletion
    Forget { file_id: i64 },
    /// Queue a remote object for deletion
    EnqueueDelete { uri: String },
    /// Pending/synced counts and queue length
    Status,
}

#[derive(Serialize)]
struct Status {
    pending: u64,
    synced: u64,
    queued_deletions: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Arc::new(Config::load(cli.config.as_deref())?);
    tracing::debug!("Config: {:?}", config);

    let stores = LocalStores::open(&config).context("opening local stores")?;
    let catalog = Arc::clone(&stores.catalog);
    let queue = Arc::clone(&stores.queue);
    let ctx: SharedContext = Arc::new(stores.into_context(Arc::clone(&config)));

    match cli.command {
        Commands::Run => {
            tracing::info!("Bucketeer starting up");
            Scheduler::new(ctx)
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Could not listen for Ctrl-C: {}", e);
                    }
                })
                .await;
            tracing::info!("Bucketeer shutting down...");
        }
        Commands::UploadSweep => run_once(&ctx, Job::UploadSweep).await?,
        Commands::DeletionSweep => run_once(&ctx, Job::DeletionSweep).await?,
        Commands::DetectText { file_id, confidence, full, kind } => {
            let record = catalog
                .get_file(file_id)?
                .ok_or_else(|| anyhow!("no file with id {}", file_id))?;
            let detector = TextDetector::new(ctx.clients.vision()?);
            let options = DetectOptions { confidence, full, kind };
            print_json(&detector.detect_text(&record, &options).await?)?;
        }
        Commands::Register { rel_path, owner, subtype, mime } => {
            let filename = PathBuf::from(&rel_path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| anyhow!("'{}' has no file name", rel_path))?;
            let file_id = catalog.register_file(&NewFile {
                owner_id: owner,
                subtype: &subtype,
                filename: &filename,
                rel_path: &rel_path,
                mime_type: &mime,
                created_at: None,
            })?;
            print_json(&catalog.get_file(file_id)?.map(|r| serde_json::json!({
                "file_id": r.file_id,
                "rel_path": r.rel_path,
                "created_at": r.created_at,
            })))?;
        }
        Commands::RegisterSubtype { name, not_file } => {
            catalog.register_subtype(&name, !not_file)?;
            tracing::info!("Registered subtype '{}' (file-like: {})", name, !not_file);
        }
        Commands::Forget { file_id } => {
            forget_file(catalog.as_ref(), queue.as_ref(), file_id)?
                .ok_or_else(|| anyhow!("no file with id {}", file_id))?;
        }
        Commands::EnqueueDelete { uri } => {
            let location = parse_locator(&uri).with_context(|| format!("not a storage locator: {}", uri))?;
            let entry = queue.enqueue(uri.trim())?;
            tracing::info!("Queued {} for deletion ({})", location, entry);
        }
        Commands::Status => {
            let (pending, synced) = catalog.counts()?;
            let queued_deletions = queue.list()?.len();
            print_json(&Status { pending, synced, queued_deletions })?;
        }
    }

    Ok(())
}

async fn run_once(ctx: &SharedContext, job: Job) -> Result<()> {
    match run_locked(ctx, job).await? {
        Some(report) => print_json(&report),
        None => {
            eprintln!("{} is already running", job);
            Ok(())
        }
    }
}
