use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backup::{BackupStore, BulkRun};
use crate::batch::{BatchExecutor, BatchReport, BatchRequest, ProgressFn};
use crate::config::Config;
use crate::error::{MetadataError, Result};
use crate::exif::{
    Category, CommandBuilder, ExifToolRunner, FieldResolver, INLINE_VALUE_LIMIT, Invocation,
    MetadataField, Operation, ToolOutput, ToolRunner,
};

/// A mutation that can be applied to one file, alone or as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    SetField {
        field: String,
        value: String,
        category: Option<Category>,
    },
    DeleteField {
        field: String,
        category: Option<Category>,
    },
    /// Remove location, camera identification and authoring tags.
    Strip,
    WipeAll,
}

impl FileOperation {
    /// Operation name recorded in bulk manifests.
    pub fn name(&self) -> &'static str {
        match self {
            FileOperation::SetField { .. } => "set_field",
            FileOperation::DeleteField { .. } => "delete_field",
            FileOperation::Strip => "strip",
            FileOperation::WipeAll => "wipe_all",
        }
    }

    /// Conventional bulk-run name, used for the run's backup directory.
    pub fn bulk_name(&self) -> String {
        match self {
            FileOperation::SetField { field, .. } => format!("bulk_edit_{}", field.trim()),
            FileOperation::DeleteField { field, .. } => format!("bulk_delete_{}", field.trim()),
            FileOperation::Strip => "bulk_social_media".to_string(),
            FileOperation::WipeAll => "bulk_wipe_all".to_string(),
        }
    }
}

/// Whether and where to snapshot a file before mutating it.
#[derive(Debug, Clone)]
pub enum BackupMode {
    Skip,
    /// Flat snapshot under the backup root.
    Single,
    /// Snapshot inside a bulk run's directory.
    Bulk(Arc<BulkRun>),
}

impl From<bool> for BackupMode {
    fn from(backup: bool) -> Self {
        if backup { BackupMode::Single } else { BackupMode::Skip }
    }
}

/// Result of replaying one recorded field during restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub field: String,
    /// `Ok(updated)` from the write, or the error message.
    pub result: std::result::Result<bool, String>,
}

/// Per-field account of a restore. The restore itself succeeded if this exists.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub backup: PathBuf,
    pub target: PathBuf,
    pub fields: Vec<FieldOutcome>,
}

impl RestoreReport {
    pub fn restored(&self) -> usize {
        self.fields.iter().filter(|f| f.result == Ok(true)).count()
    }

    pub fn failed(&self) -> usize {
        self.fields.len() - self.restored()
    }
}

/// Builder for [`MetadataEngine`].
///
/// ```rust,no_run
/// use exif_vault::config::Config;
/// use exif_vault::engine::MetadataEngine;
///
/// # async fn example() -> exif_vault::error::Result<()> {
/// let config = Config::load(None).unwrap_or_default();
/// let engine = MetadataEngine::builder().from_config(&config).build().await?;
/// println!("ExifTool {}", engine.version());
/// # Ok(())
/// # }
/// ```
pub struct EngineBuilder {
    program: PathBuf,
    backup_dir: PathBuf,
    inline_limit: usize,
    max_workers: Option<usize>,
    resolver: FieldResolver,
    runner: Option<Arc<dyn ToolRunner>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("exiftool"),
            backup_dir: PathBuf::from("Backup"),
            inline_limit: INLINE_VALUE_LIMIT,
            max_workers: None,
            resolver: FieldResolver::default(),
            runner: None,
        }
    }
}

impl EngineBuilder {
    pub fn from_config(mut self, config: &Config) -> Self {
        self.program = PathBuf::from(&config.exiftool.path);
        self.backup_dir = config.backup.dir.clone();
        self.inline_limit = config.large_value_threshold;
        self.max_workers = config.batch.max_workers;
        self
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn resolver(mut self, resolver: FieldResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the process-spawning runner.
    pub fn runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Verify the tool answers a version query, then build the engine.
    pub async fn build(self) -> Result<MetadataEngine> {
        let runner: Arc<dyn ToolRunner> = match self.runner {
            Some(runner) => runner,
            None => Arc::new(ExifToolRunner),
        };
        let commands = CommandBuilder::new(&self.program).with_inline_limit(self.inline_limit);

        let unavailable = |reason: String| MetadataError::ToolUnavailable {
            path: self.program.clone(),
            reason,
        };
        let inv = commands.build(Path::new(""), Operation::Version)?;
        let out = runner
            .run(&inv)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !out.success {
            return Err(unavailable(out.message()));
        }

        let version = out.stdout.trim().to_string();
        log::debug!("ExifTool {version} at {}", self.program.display());

        Ok(MetadataEngine {
            runner,
            commands,
            resolver: Arc::new(self.resolver),
            backups: BackupStore::new(self.backup_dir),
            version,
            max_workers: self.max_workers,
        })
    }
}

/// Public surface for reading and mutating image metadata through ExifTool.
///
/// Every mutating call snapshots the file first unless told not to.
/// Cloning is cheap; clones share the runner and resolver.
#[derive(Clone)]
pub struct MetadataEngine {
    runner: Arc<dyn ToolRunner>,
    commands: CommandBuilder,
    resolver: Arc<FieldResolver>,
    backups: BackupStore,
    version: String,
    max_workers: Option<usize>,
}

impl std::fmt::Debug for MetadataEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataEngine")
            .field("program", &self.commands.program())
            .field("backup_dir", &self.backups.root())
            .field("version", &self.version)
            .finish()
    }
}

impl MetadataEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Build from configuration with the default process runner.
    pub async fn new(config: &Config) -> Result<Self> {
        Self::builder().from_config(config).build().await
    }

    /// Version string reported by the tool at startup.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    pub fn max_workers(&self) -> Option<usize> {
        self.max_workers
    }

    /// Every tag the tool reports for `file`.
    pub async fn read(&self, file: &Path) -> Result<Map<String, Value>> {
        let read_error = |message: String| MetadataError::Read {
            path: file.to_path_buf(),
            message,
        };

        let mut inv = self.commands.build(file, Operation::Read)?;
        let out = self.execute(&mut inv).await?;
        if !out.success {
            return Err(read_error(out.message()));
        }

        let records: Vec<Value> =
            serde_json::from_str(&out.stdout).map_err(|e| read_error(e.to_string()))?;
        match records.into_iter().next() {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(read_error("unexpected record shape".to_string())),
            None => Err(read_error("no metadata record returned".to_string())),
        }
    }

    /// Snapshot `file` to the backup store.
    ///
    /// Returns `None` when the snapshot could not be taken. Callers proceed
    /// with their mutation regardless, so that file is left without a backup.
    pub async fn snapshot(&self, file: &Path, bulk: Option<&BulkRun>) -> Option<PathBuf> {
        let metadata = match self.read(file).await {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Backup skipped for {}: {e}", file.display());
                return None;
            }
        };
        match self.backups.write_snapshot(file, metadata, bulk) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Backup failed for {}: {e}", file.display());
                None
            }
        }
    }

    pub async fn set(
        &self,
        file: &Path,
        field: &str,
        value: &str,
        category: Option<Category>,
        backup: bool,
    ) -> Result<bool> {
        let op = FileOperation::SetField {
            field: field.to_string(),
            value: value.to_string(),
            category,
        };
        self.apply(file, &op, &backup.into()).await
    }

    pub async fn delete(
        &self,
        file: &Path,
        field: &str,
        category: Option<Category>,
        backup: bool,
    ) -> Result<bool> {
        let op = FileOperation::DeleteField {
            field: field.to_string(),
            category,
        };
        self.apply(file, &op, &backup.into()).await
    }

    /// Clear privacy-sensitive tags before sharing.
    pub async fn strip(&self, file: &Path, backup: bool) -> Result<bool> {
        self.apply(file, &FileOperation::Strip, &backup.into()).await
    }

    pub async fn wipe_all(&self, file: &Path, backup: bool) -> Result<bool> {
        self.apply(file, &FileOperation::WipeAll, &backup.into()).await
    }

    /// Run `op` on one file: snapshot (per `backup`), then mutate.
    pub async fn apply(&self, file: &Path, op: &FileOperation, backup: &BackupMode) -> Result<bool> {
        match backup {
            BackupMode::Skip => {}
            BackupMode::Single => {
                self.snapshot(file, None).await;
            }
            BackupMode::Bulk(run) => {
                self.snapshot(file, Some(run.as_ref())).await;
            }
        }

        let (mut inv, field) = match op {
            FileOperation::SetField { field, value, category } => {
                let f = self.resolver.resolve(field, *category);
                (self.commands.build(file, Operation::Set { field: &f, value })?, Some(f))
            }
            FileOperation::DeleteField { field, category } => {
                let f = self.resolver.resolve(field, *category);
                (self.commands.build(file, Operation::DeleteField { field: &f })?, Some(f))
            }
            FileOperation::Strip => (self.commands.build(file, Operation::Strip)?, None),
            FileOperation::WipeAll => (self.commands.build(file, Operation::WipeAll)?, None),
        };

        let out = self.execute(&mut inv).await?;
        interpret_write(&out, field.as_ref())
    }

    /// Replay a snapshot onto `target` (or the file it was taken from).
    ///
    /// Fails only when the backup cannot be read or the target does not exist.
    /// Individual field failures are recorded in the report.
    pub async fn restore(&self, backup: &Path, target: Option<&Path>) -> Result<RestoreReport> {
        let snapshot = self.backups.load(backup)?;

        let target = match target {
            Some(t) => t.to_path_buf(),
            None => PathBuf::from(&snapshot.original_file_path),
        };
        if !target.exists() {
            return Err(MetadataError::Restore(format!(
                "Target file not found: {}",
                target.display()
            )));
        }

        let mut fields = Vec::new();
        for (name, value) in snapshot.restorable_fields() {
            let Some(text) = value_text(value) else {
                continue;
            };
            let op = FileOperation::SetField {
                field: name.clone(),
                value: text,
                category: None,
            };
            let result = self
                .apply(&target, &op, &BackupMode::Skip)
                .await
                .map_err(|e| e.to_string());
            log::debug!("restore {name}: {result:?}");
            fields.push(FieldOutcome {
                field: name.clone(),
                result,
            });
        }

        let report = RestoreReport {
            backup: backup.to_path_buf(),
            target,
            fields,
        };
        log::info!(
            "Restored {} of {} fields to {}",
            report.restored(),
            report.fields.len(),
            report.target.display()
        );
        Ok(report)
    }

    /// Apply one operation to many files concurrently. See [`BatchExecutor::run`].
    pub async fn batch(
        &self,
        request: BatchRequest,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        BatchExecutor::new(self.clone())
            .run(request, progress, cancel)
            .await
    }

    async fn execute(&self, inv: &mut Invocation) -> Result<ToolOutput> {
        let result = self.runner.run(inv).await;
        if let Err(e) = inv.cleanup() {
            log::warn!("Failed to remove temporary value file: {e}");
        }
        Ok(result?)
    }
}

/// Map a write's captured output to success, "nothing changed", or an error.
fn interpret_write(out: &ToolOutput, field: Option<&MetadataField>) -> Result<bool> {
    let message = out.message();
    if let Some(f) = field {
        if !out.reports_update() && message.to_lowercase().contains("not writable") {
            return Err(MetadataError::NotWritable {
                field: f.name.clone(),
                stderr: message,
            });
        }
    }

    // A failed run can still print "0 image files updated", so the exit
    // status decides first and the count only splits success from no-op.
    if out.success {
        Ok(out.reports_update())
    } else {
        Err(MetadataError::Write(message))
    }
}

/// Text to write back for a recorded value. `None` for nulls.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}
