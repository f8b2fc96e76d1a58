use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::exif::INLINE_VALUE_LIMIT;

/// Top-level configuration for the exif-vault library.
///
/// Controls where ExifTool lives, where backups go, and how wide bulk runs fan out.
///
/// # Loading
///
/// ```rust,no_run
/// use exif_vault::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.exiftool.path = "/opt/exiftool/exiftool".into();
/// config.batch.max_workers = Some(4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool location.
    pub exiftool: ExifToolConfig,
    /// Backup directory and default backup behavior.
    pub backup: BackupConfig,
    /// Bulk-run worker pool.
    pub batch: BatchConfig,
    /// Values longer than this many bytes are handed to ExifTool through a file.
    pub large_value_threshold: usize,
}

/// How to invoke ExifTool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExifToolConfig {
    /// Program name or full path.
    pub path: String,
}

/// Where snapshots are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Root backup directory. Relative paths resolve against the working directory.
    pub dir: PathBuf,
    /// Default for mutating commands when no `--no-backup` flag is given.
    pub enabled: bool,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Upper bound on concurrent files. `None` uses the hardware default;
    /// either way the pool never exceeds [`crate::batch::MAX_WORKERS`].
    pub max_workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exiftool: ExifToolConfig {
                path: "exiftool".to_string(),
            },
            backup: BackupConfig {
                dir: PathBuf::from("Backup"),
                enabled: true,
            },
            batch: BatchConfig::default(),
            large_value_threshold: INLINE_VALUE_LIMIT,
        }
    }
}

impl Config {
    /// Resolve the config file path, next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}
