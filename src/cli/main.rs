use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use exif_vault::backup::{BackupStore, ManifestEntry};
use exif_vault::batch::{self, BatchRequest};
use exif_vault::config::Config;
use exif_vault::engine::{FileOperation, MetadataEngine};
use exif_vault::exif::Category;
use exif_vault::files;

#[derive(Parser, Debug)]
#[command(
    name = "exif-vault",
    version,
    about = "Edit, strip and restore image metadata through ExifTool, with automatic backups"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config.json and exit
    Init,
    /// Print all metadata of the given images as JSON
    Show {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Set one field
    Set {
        /// Field name, e.g. Title, Keywords, GPSCoordinates
        #[arg(short, long)]
        field: String,
        /// New value
        #[arg(long, required_unless_present = "value_file", conflicts_with = "value_file")]
        value: Option<String>,
        /// Read the value from a file (for long text)
        #[arg(long, value_name = "FILE")]
        value_file: Option<PathBuf>,
        /// EXIF, IPTC or XMP (default: per-field)
        #[arg(long)]
        category: Option<Category>,
        #[command(flatten)]
        targets: Targets,
    },
    /// Delete one field
    Delete {
        #[arg(short, long)]
        field: String,
        /// EXIF, IPTC or XMP (default: per-field)
        #[arg(long)]
        category: Option<Category>,
        #[command(flatten)]
        targets: Targets,
    },
    /// Remove GPS, camera and author tags before sharing
    Strip {
        #[command(flatten)]
        targets: Targets,
    },
    /// Remove all writable metadata
    Wipe {
        #[command(flatten)]
        targets: Targets,
    },
    /// Replay a backup snapshot onto an image
    Restore {
        /// Snapshot file (*_metadata.json)
        #[arg(value_name = "BACKUP")]
        backup: PathBuf,
        /// Restore onto this file instead of the original
        #[arg(long, value_name = "FILE")]
        target: Option<PathBuf>,
        /// Output the restore report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List backup snapshots, newest first
    Backups,
}

/// Files targeted by a mutating command.
#[derive(Args, Debug)]
struct Targets {
    /// Image files or directories
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Skip the metadata snapshot
    #[arg(long)]
    no_backup: bool,

    /// Output per-file results as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Init => {
            let path = cli.config.as_deref();
            Config::default().save(path)?;
            let save_path = match path {
                Some(p) => p.to_path_buf(),
                None => Config::config_path()?,
            };
            println!("Default config written to {}", save_path.display());
            Ok(())
        }
        Command::Backups => list_backups(&config),
        Command::Show { paths, recursive } => {
            let engine = MetadataEngine::new(&config).await?;
            show(&engine, &paths, recursive).await
        }
        Command::Restore {
            backup,
            target,
            json,
        } => {
            let engine = MetadataEngine::new(&config).await?;
            restore(&engine, &backup, target.as_deref(), json).await
        }
        Command::Set {
            field,
            value,
            value_file,
            category,
            targets,
        } => {
            let value = match (value, value_file) {
                (Some(v), _) => v,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read value file {}", path.display()))?,
                (None, None) => anyhow::bail!("Either --value or --value-file is required."),
            };
            let op = FileOperation::SetField {
                field,
                value,
                category,
            };
            run_operation(&config, op, targets).await
        }
        Command::Delete {
            field,
            category,
            targets,
        } => run_operation(&config, FileOperation::DeleteField { field, category }, targets).await,
        Command::Strip { targets } => run_operation(&config, FileOperation::Strip, targets).await,
        Command::Wipe { targets } => run_operation(&config, FileOperation::WipeAll, targets).await,
    }
}

/// Apply `op` to every image under `targets`: one file directly, several as a bulk run.
async fn run_operation(config: &Config, op: FileOperation, targets: Targets) -> Result<()> {
    let images = files::collect_images(&targets.paths, targets.recursive);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    let engine = MetadataEngine::new(config).await?;
    let backup = config.backup.enabled && !targets.no_backup;
    let total = images.len();
    log::info!("Found {total} image(s), operation: {}", op.name());
    if !backup {
        log::info!("Backups disabled, files will be modified without a snapshot");
    }

    let entries: Vec<ManifestEntry> = if total == 1 {
        let path = &images[0];
        let outcome = engine.apply(path, &op, &backup.into()).await;
        if let Err(ref e) = outcome {
            log::error!("{}: {e}", path.display());
        }
        vec![batch::outcome_entry(path, &outcome)]
    } else {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, finishing files already in progress...");
                interrupt.cancel();
            }
        });

        let progress = |done: usize, total: usize, file: &Path| {
            log::info!("[{done}/{total}] {}", file.display());
        };
        let mut request = BatchRequest::new(images, op);
        if !backup {
            request = request.without_backup();
        }
        let report = engine.batch(request, Some(&progress), &cancel).await;
        if let Some(ref manifest) = report.manifest_path {
            log::info!("Manifest: {}", manifest.display());
        }
        report.entries
    };

    if targets.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in entries.iter().filter(|e| !e.success) {
            println!(
                "{RED}x{RESET} {} {DIM}{}{RESET}",
                entry.file,
                entry.error.as_deref().unwrap_or_default()
            );
        }
    }

    // Summary
    let success = entries.iter().filter(|e| e.success).count();
    let failed = entries.len() - success;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} images");

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Print full metadata for each image, one JSON object per file.
async fn show(engine: &MetadataEngine, paths: &[PathBuf], recursive: bool) -> Result<()> {
    let images = files::collect_images(paths, recursive);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    for path in &images {
        println!();
        println!("{BOLD}File:{RESET} {}", path.display());
        println!("{DIM}{}{RESET}", "═".repeat(72));
        match engine.read(path).await {
            Ok(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
            Err(e) => log::error!("{}: {e}", path.display()),
        }
    }
    Ok(())
}

async fn restore(
    engine: &MetadataEngine,
    backup: &Path,
    target: Option<&Path>,
    json: bool,
) -> Result<()> {
    let report = engine.restore(backup, target).await?;

    if json {
        let fields: Vec<serde_json::Value> = report
            .fields
            .iter()
            .map(|f| match &f.result {
                Ok(updated) => serde_json::json!({ "field": f.field, "updated": updated }),
                Err(e) => serde_json::json!({ "field": f.field, "updated": false, "error": e }),
            })
            .collect();
        let out = serde_json::json!({
            "backup": report.backup.display().to_string(),
            "target": report.target.display().to_string(),
            "fields": fields,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{BOLD}Restoring{RESET} {}", report.target.display());
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    for outcome in &report.fields {
        match &outcome.result {
            Ok(true) => println!("  {GREEN}{:<22}{RESET} : restored", outcome.field),
            Ok(false) => println!("  {DIM}{:<22} : unchanged{RESET}", outcome.field),
            Err(e) => println!("  {RED}{:<22}{RESET} : {e}", outcome.field),
        }
    }
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    log::info!(
        "Restored {} field(s), {} not restored",
        report.restored(),
        report.failed()
    );
    Ok(())
}

fn list_backups(config: &Config) -> Result<()> {
    let store = BackupStore::new(&config.backup.dir);
    let snapshots = store.list().context("Failed to list backups")?;
    if snapshots.is_empty() {
        println!("No backups in {}", store.root().display());
        return Ok(());
    }
    for path in &snapshots {
        println!("{}", path.display());
    }
    Ok(())
}
