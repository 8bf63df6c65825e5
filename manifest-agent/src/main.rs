//! Manifest Agent - Main entry point
//!
//! `generate` fingerprints a mounted tree (run inside the verification task or
//! against the live share), `compare` reconciles two manifest files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use manifest_agent::manifest::builder::UploadTarget;
use manifest_agent::manifest::store::{HttpObjectStore, LocalObjectStore, ObjectStore};
use manifest_agent::{config::Config, reconcile, utils, Manifest};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code when `compare` finds discrepancies
const EXIT_DISCREPANCIES: u8 = 2;

/// Exit code when `generate` was asked to upload and the upload failed
const EXIT_UPLOAD_FAILED: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a manifest of every file under a mount point
    Generate(GenerateArgs),

    /// Compare two manifest files and print the discrepancy report
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Directory to scan
    #[arg(long)]
    mount_point: PathBuf,

    /// Where to write the manifest JSON
    #[arg(long, alias = "output-filename")]
    output: PathBuf,

    /// Bucket to upload the manifest to
    #[arg(long)]
    bucket: Option<String>,

    /// Key prefix for the uploaded manifest
    #[arg(long)]
    prefix: Option<String>,

    /// HTTP object store base URL
    #[arg(long, conflicts_with = "store_dir")]
    store_url: Option<String>,

    /// Local directory acting as the object store
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Digest read size in bytes
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Follow symlinks into directories
    #[arg(long)]
    follow_links: bool,

    /// Skip entries whose name contains this pattern (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Manifest captured from the source
    original: PathBuf,

    /// Manifest generated from the restored copy
    candidate: PathBuf,

    /// Also write the report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    // Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("manifest-agent v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Generate(args) => generate(args, &config).await,
        Command::Compare(args) => compare(args).await,
    }
}

async fn generate(args: GenerateArgs, config: &Config) -> Result<ExitCode> {
    let mut options = config.scan_options();
    if let Some(chunk_size) = args.chunk_size {
        anyhow::ensure!(chunk_size > 0, "--chunk-size must be positive");
        options.chunk_size = chunk_size;
    }
    options.follow_links |= args.follow_links;
    options.exclude_patterns.extend(args.exclude.iter().cloned());

    // Walking and hashing are blocking I/O
    let root = args.mount_point.clone();
    let (manifest, summary) =
        tokio::task::spawn_blocking(move || manifest_agent::build(&root, &options)).await??;

    if summary.skipped > 0 {
        tracing::warn!("{} entries could not be hashed and were left out", summary.skipped);
    }

    let upload = upload_target(&args, config)?;
    let outcome = manifest_agent::persist(&manifest, &args.output, upload.as_ref()).await?;

    if let Some(reason) = outcome.upload.failure() {
        tracing::error!("Manifest kept locally at {} (upload failed: {})", outcome.local_path.display(), reason);
        return Ok(ExitCode::from(EXIT_UPLOAD_FAILED));
    }

    Ok(ExitCode::SUCCESS)
}

/// Resolve the upload destination from flags first, then the config file.
fn upload_target(args: &GenerateArgs, config: &Config) -> Result<Option<UploadTarget>> {
    let Some(bucket) = args.bucket.clone().or_else(|| config.store.bucket.clone()) else {
        return Ok(None);
    };

    let store: Arc<dyn ObjectStore> = if let Some(dir) = &args.store_dir {
        Arc::new(LocalObjectStore::new(dir))
    } else if let Some(url) = args.store_url.as_ref().or(config.store.url.as_ref()) {
        Arc::new(HttpObjectStore::new(url, config.store.token.clone())?)
    } else if let Some(dir) = &config.store.dir {
        Arc::new(LocalObjectStore::new(dir))
    } else {
        anyhow::bail!("--bucket given but no object store configured (use --store-url or --store-dir)");
    };

    Ok(Some(UploadTarget {
        store,
        bucket,
        prefix: args.prefix.clone().unwrap_or_else(|| config.store.prefix.clone()),
    }))
}

async fn compare(args: CompareArgs) -> Result<ExitCode> {
    let original = load_manifest(&args.original).await?;
    let candidate = load_manifest(&args.candidate).await?;

    let report = reconcile(&original, &candidate);
    let rendered = serde_json::to_string_pretty(&report)?;

    if let Some(path) = &args.report {
        tokio::fs::write(path, &rendered).await?;
    }
    println!("{}", rendered);

    if report.is_consistent() {
        tracing::info!("Manifests match: {} files", original.len());
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("{} discrepancies found", report.discrepancy_count());
        Ok(ExitCode::from(EXIT_DISCREPANCIES))
    }
}

async fn load_manifest(path: &Path) -> Result<Manifest> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Manifest::from_document(&bytes).with_context(|| format!("parsing {}", path.display()))
}
