//! # exif-vault
//!
//! Safe image metadata editing on top of [ExifTool](https://exiftool.org): read every
//! tag of an image, set or delete single fields, strip privacy-sensitive tags or wipe
//! everything, with a JSON snapshot of the file's metadata taken before each change
//! so it can be restored later.
//!
//! ExifTool must be installed; the engine checks for it once at construction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exif_vault::config::Config;
//! use exif_vault::engine::MetadataEngine;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let engine = MetadataEngine::new(&config).await?;
//!
//!     let photo = Path::new("photo.jpg");
//!     let tags = engine.read(photo).await?;
//!     println!("{} tags, ExifTool {}", tags.len(), engine.version());
//!
//!     // Snapshot, then write. "GPSCoordinates" is rewritten to "GPSPosition".
//!     engine.set(photo, "Title", "Harbour at dusk", None, true).await?;
//!     engine.set(photo, "GPSCoordinates", "59.91, 10.75", None, true).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Bulk runs
//!
//! ```rust,no_run
//! use exif_vault::batch::BatchRequest;
//! use exif_vault::engine::{FileOperation, MetadataEngine};
//! use exif_vault::files::collect_images;
//! use std::path::PathBuf;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = MetadataEngine::builder().backup_dir("Backup").build().await?;
//!     let images = collect_images(&[PathBuf::from("./photos")], true);
//!
//!     // Snapshots land in Backup/bulk_social_media_<timestamp>/ next to a manifest.json.
//!     let request = BatchRequest::new(images, FileOperation::Strip);
//!     let report = engine.batch(request, None, &CancellationToken::new()).await;
//!     println!("{} ok, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: read, set, delete, strip, wipe, restore and batch entry points
//! - [`exif`]: field resolution, ExifTool argument building, and process execution
//! - [`backup`]: snapshot files, bulk run directories and manifests
//! - [`batch`]: bounded-concurrency bulk executor
//! - [`files`]: expanding paths into image files
//! - [`config`]: configuration types and loading/saving
//! - [`error`]: the library error type

pub mod backup;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod exif;
pub mod files;

pub use engine::MetadataEngine;
pub use error::MetadataError;
