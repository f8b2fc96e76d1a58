use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the metadata engine.
///
/// Per-file variants (`Read`, `NotWritable`, `Write`) are reported per file
/// inside a batch and never abort sibling work. `ToolUnavailable` is fatal
/// for the whole session.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("ExifTool not found at: {}: {reason}", path.display())]
    ToolUnavailable { path: PathBuf, reason: String },

    #[error("Failed to read metadata from {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("Field '{field}' is not writable. Try using 'Description' or 'Title'. ({stderr})")]
    NotWritable { field: String, stderr: String },

    #[error("ExifTool failed: {0}")]
    Write(String),

    #[error("Failed to restore metadata: {0}")]
    Restore(String),

    #[error("cancelled before start")]
    Cancelled,

    #[error("Task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetadataError {
    /// `true` for errors that should stop the caller from using the engine at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MetadataError::ToolUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
