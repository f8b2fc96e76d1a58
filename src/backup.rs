use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{MetadataError, Result};

/// File name of the per-run manifest inside a bulk directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Snapshot fields that describe the file itself rather than its metadata.
/// They are never replayed on restore.
pub const BOOKKEEPING_FIELDS: &[&str] = &[
    "SourceFile",
    "FileName",
    "Directory",
    "FileSize",
    "FileModifyDate",
];

/// Point-in-time copy of a file's metadata, as stored on disk.
///
/// ```json
/// {
///   "original_file": "photos/a.jpg",
///   "backup_date": "2026-10-18T14:03:22.120933",
///   "metadata": { "Make": "Canon", "ISO": 100 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "original_file")]
    pub original_file_path: String,
    #[serde(rename = "backup_date")]
    pub backup_timestamp: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Snapshot {
    /// Fields worth replaying, in recorded order.
    pub fn restorable_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.metadata
            .iter()
            .filter(|(k, _)| !BOOKKEEPING_FIELDS.contains(&k.as_str()))
    }
}

/// One line of a bulk-run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of every file processed by one bulk run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "operation")]
    pub operation_name: String,
    pub timestamp: String,
    pub total_files: usize,
    #[serde(rename = "files")]
    pub entries: Vec<ManifestEntry>,
}

/// A bulk run's backup directory. All snapshots and the manifest of one run
/// share it.
#[derive(Debug, Clone)]
pub struct BulkRun {
    pub name: String,
    pub dir: PathBuf,
    pub started: DateTime<Local>,
}

impl BulkRun {
    pub fn timestamp(&self) -> String {
        iso_timestamp(&self.started)
    }
}

/// Owner of the on-disk backup tree.
///
/// ```text
/// <root>/
///   <stem>_<YYYYMMDD_HHMMSS>_metadata.json        single-file snapshots
///   <bulk_name>_<YYYYMMDD_HHMMSS>/
///     <parent dir>/<stem>_metadata.json           bulk snapshots
///     manifest.json
/// ```
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory for a new bulk run.
    pub fn begin_bulk(&self, name: &str) -> Result<BulkRun> {
        fs::create_dir_all(&self.root)?;
        let started = Local::now();
        let base = format!("{}_{}", sanitize(name), file_timestamp(&started));

        let mut attempt = 1;
        loop {
            let dir_name = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let dir = self.root.join(dir_name);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    log::debug!("Bulk backup directory: {}", dir.display());
                    return Ok(BulkRun {
                        name: name.to_string(),
                        dir,
                        started,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Persist `metadata` for `file` and return the snapshot's path.
    pub fn write_snapshot(
        &self,
        file: &Path,
        metadata: Map<String, Value>,
        bulk: Option<&BulkRun>,
    ) -> Result<PathBuf> {
        let now = Local::now();
        let snapshot = Snapshot {
            original_file_path: file.display().to_string(),
            backup_timestamp: iso_timestamp(&now),
            metadata,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let stem = file
            .file_stem()
            .map(|s| sanitize(&s.to_string_lossy()))
            .unwrap_or_else(|| "file".to_string());

        let (dir, base) = match bulk {
            Some(run) => {
                let dir = match file.parent().and_then(|p| p.file_name()) {
                    Some(parent) => run.dir.join(sanitize(&parent.to_string_lossy())),
                    None => run.dir.clone(),
                };
                (dir, stem)
            }
            None => (self.root.clone(), format!("{stem}_{}", file_timestamp(&now))),
        };
        fs::create_dir_all(&dir)?;

        let (path, mut out) = create_unique(&dir, &base)?;
        out.write_all(json.as_bytes())?;
        out.flush()?;
        log::info!("Backup written: {}", path.display());
        Ok(path)
    }

    /// Parse a snapshot file.
    pub fn load(&self, path: &Path) -> Result<Snapshot> {
        let contents = fs::read_to_string(path)
            .map_err(|e| MetadataError::Restore(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| MetadataError::Restore(format!("{}: {e}", path.display())))
    }

    /// Write the manifest for a finished bulk run, atomically.
    pub fn write_manifest(&self, run: &BulkRun, manifest: &Manifest) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(manifest)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&run.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;

        let path = run.dir.join(MANIFEST_FILE);
        tmp.persist(&path).map_err(|e| e.error)?;
        log::info!("Manifest written: {}", path.display());
        Ok(path)
    }

    /// Every snapshot under the root, newest first. Manifests are skipped.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut found: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            let is_snapshot = p.is_file()
                && p.extension().is_some_and(|e| e == "json")
                && p.file_name().is_some_and(|n| n != MANIFEST_FILE);
            if is_snapshot {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                found.push((modified, p.to_path_buf()));
            }
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(found.into_iter().map(|(_, p)| p).collect())
    }
}

/// `<base>_metadata.json`, or `<base>_<n>_metadata.json` if taken.
fn create_unique(dir: &Path, base: &str) -> std::io::Result<(PathBuf, File)> {
    let mut attempt = 1;
    loop {
        let name = if attempt == 1 {
            format!("{base}_metadata.json")
        } else {
            format!("{base}_{attempt}_metadata.json")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => return Ok((path, f)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn file_timestamp(t: &DateTime<Local>) -> String {
    t.format("%Y%m%d_%H%M%S").to_string()
}

pub(crate) fn iso_timestamp(t: &DateTime<Local>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
