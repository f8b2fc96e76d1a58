use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::backup::{BulkRun, Manifest, ManifestEntry};
use crate::engine::{BackupMode, FileOperation, MetadataEngine};
use crate::error::{MetadataError, Result};

/// Hard ceiling on concurrent files, whatever the hardware or config says.
pub const MAX_WORKERS: usize = 16;

/// Progress callback: `(completed, total, file)`, called once per finished file
/// in completion order. Runs on the batch driver, so it must return quickly.
pub type ProgressFn = dyn Fn(usize, usize, &Path) + Send + Sync;

/// `min(2 × available parallelism, 16)`, optionally lowered by `requested`.
///
/// Each file's work is dominated by process spawn and disk I/O, so the pool
/// runs wider than the core count.
pub fn pool_size(requested: Option<usize>) -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let cap = (parallelism * 2).min(MAX_WORKERS);
    match requested {
        Some(n) => n.clamp(1, cap),
        None => cap,
    }
}

/// One bulk operation over a list of files.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub files: Vec<PathBuf>,
    pub operation: FileOperation,
    /// Snapshot every file before mutating it.
    pub backup: bool,
    /// Groups snapshots under one run directory and writes a manifest.
    /// Without it, snapshots (if any) are flat single-file backups.
    pub bulk_name: Option<String>,
}

impl BatchRequest {
    /// Request with backups on and the operation's conventional bulk name.
    pub fn new(files: Vec<PathBuf>, operation: FileOperation) -> Self {
        let bulk_name = Some(operation.bulk_name());
        Self {
            files,
            operation,
            backup: true,
            bulk_name,
        }
    }

    pub fn without_backup(mut self) -> Self {
        self.backup = false;
        self
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Success per file path.
    pub results: HashMap<PathBuf, bool>,
    /// One entry per input file, in completion order. Cancelled files come last.
    pub entries: Vec<ManifestEntry>,
    /// Where the manifest was written, for bulk runs with backups.
    pub manifest_path: Option<PathBuf>,
    /// Files never started because the run was cancelled.
    pub cancelled: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.success).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

/// Runs a [`FileOperation`] over many files with a bounded worker pool.
///
/// Each file is isolated: an error, a non-zero tool exit or a panic in one
/// file's task is recorded against that file and nothing else.
pub struct BatchExecutor {
    engine: MetadataEngine,
    workers: usize,
}

impl BatchExecutor {
    pub fn new(engine: MetadataEngine) -> Self {
        let workers = pool_size(engine.max_workers());
        Self { engine, workers }
    }

    /// Override the pool width. Still capped by [`pool_size`].
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = pool_size(Some(workers));
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every file in `request`.
    ///
    /// Cancelling `cancel` stops new files from starting; files already
    /// running finish normally. Unstarted files are reported as failed with a
    /// "cancelled" error so the report still covers every input.
    pub async fn run(
        &self,
        request: BatchRequest,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let BatchRequest {
            files,
            operation,
            backup,
            bulk_name,
        } = request;

        let total = files.len();
        if total == 0 {
            return BatchReport::default();
        }

        let bulk = match (backup, bulk_name.as_deref()) {
            (true, Some(name)) => match self.engine.backups().begin_bulk(name) {
                Ok(run) => Some(Arc::new(run)),
                Err(e) => {
                    log::warn!("Could not create bulk backup directory for {name}: {e}");
                    None
                }
            },
            _ => None,
        };
        let mode = match (&bulk, backup) {
            (Some(run), _) => BackupMode::Bulk(run.clone()),
            (None, true) => BackupMode::Single,
            (None, false) => BackupMode::Skip,
        };

        log::info!(
            "Batch {}: {total} file(s), {} worker(s)",
            operation.name(),
            self.workers
        );

        let operation = Arc::new(operation);
        let mut pending = files.into_iter();
        let mut in_flight: JoinSet<Result<bool>> = JoinSet::new();
        let mut running: HashMap<Id, PathBuf> = HashMap::with_capacity(self.workers);
        let mut report = BatchReport {
            results: HashMap::with_capacity(total),
            entries: Vec::with_capacity(total),
            ..Default::default()
        };
        let mut completed = 0;

        loop {
            while in_flight.len() < self.workers && !cancel.is_cancelled() {
                let Some(file) = pending.next() else { break };
                let id = self.spawn_one(&mut in_flight, file.clone(), operation.clone(), mode.clone());
                running.insert(id, file);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };
            // A panicking or aborted task still belongs to its file.
            let (id, outcome) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(MetadataError::Task(e.to_string()))),
            };
            let Some(file) = running.remove(&id) else {
                log::error!("Batch task {id} finished with no file attached");
                continue;
            };

            completed += 1;
            if let Err(ref e) = outcome {
                log::warn!("{}: {e}", file.display());
            }
            record(&mut report, &file, outcome);
            if let Some(cb) = progress {
                cb(completed, total, &file);
            }
        }

        for file in pending {
            report.cancelled += 1;
            record(&mut report, &file, Err(MetadataError::Cancelled));
        }
        if report.cancelled > 0 {
            log::warn!("Batch cancelled: {} file(s) not started", report.cancelled);
        }

        if let Some(run) = bulk {
            report.manifest_path = self.write_manifest(&run, &operation, total, &report.entries);
        }

        log::info!(
            "Batch {} done: {} succeeded, {} failed",
            operation.name(),
            report.succeeded(),
            report.failed()
        );
        report
    }

    fn spawn_one(
        &self,
        set: &mut JoinSet<Result<bool>>,
        file: PathBuf,
        operation: Arc<FileOperation>,
        mode: BackupMode,
    ) -> Id {
        let engine = self.engine.clone();
        set.spawn(async move { engine.apply(&file, &operation, &mode).await })
            .id()
    }

    fn write_manifest(
        &self,
        run: &BulkRun,
        operation: &FileOperation,
        total: usize,
        entries: &[ManifestEntry],
    ) -> Option<PathBuf> {
        let manifest = Manifest {
            operation_name: operation.name().to_string(),
            timestamp: run.timestamp(),
            total_files: total,
            entries: entries.to_vec(),
        };
        match self.engine.backups().write_manifest(run, &manifest) {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("Failed to write manifest for {}: {e}", run.name);
                None
            }
        }
    }
}

/// Manifest line for one file's outcome. `Ok(false)` (the tool ran but
/// changed nothing) counts as a failure.
pub fn outcome_entry(file: &Path, outcome: &Result<bool>) -> ManifestEntry {
    let (success, error) = match outcome {
        Ok(true) => (true, None),
        Ok(false) => (false, Some("no image files updated".to_string())),
        Err(e) => (false, Some(e.to_string())),
    };
    ManifestEntry {
        file: file.display().to_string(),
        success,
        error,
    }
}

fn record(report: &mut BatchReport, file: &Path, outcome: Result<bool>) {
    let entry = outcome_entry(file, &outcome);
    report.results.insert(file.to_path_buf(), entry.success);
    report.entries.push(entry);
}
