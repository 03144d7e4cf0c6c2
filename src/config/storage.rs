//! Settings Storage
//!
//! Reads and writes `settings.json`.
//! Location: ~/.pocketshell on macOS/Linux, %APPDATA%\PocketShell on Windows

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::settings::{Settings, SETTINGS_VERSION};

/// Settings storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// Get the PocketShell configuration directory
pub fn config_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("PocketShell"));
        }
        dirs::home_dir()
            .map(|home| home.join(".pocketshell"))
            .ok_or(StorageError::NoConfigDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".pocketshell"))
            .ok_or(StorageError::NoConfigDir)
    }
}

/// Get the settings file path
pub fn settings_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("settings.json"))
}

/// Settings storage manager
pub struct SettingsStorage {
    path: PathBuf,
}

impl SettingsStorage {
    /// Storage at the default location
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: settings_file()?,
        })
    }

    /// Storage at a custom path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load settings from disk.
    ///
    /// A missing file yields defaults. A corrupted file is backed up and
    /// defaults are returned.
    pub async fn load(&self) -> Result<Settings, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        match serde_json::from_str::<Settings>(&contents) {
            Ok(settings) if settings.version > SETTINGS_VERSION => Err(StorageError::VersionTooNew {
                found: settings.version,
                supported: SETTINGS_VERSION,
            }),
            Ok(settings) => Ok(settings),
            Err(e) => {
                tracing::warn!("Settings file corrupted: {}", e);
                match self.backup().await {
                    Ok(backup_path) => tracing::warn!(
                        "Corrupted settings backed up to {:?}, using defaults",
                        backup_path
                    ),
                    Err(backup_err) => {
                        tracing::error!("Failed to backup corrupted settings: {}", backup_err)
                    }
                }
                Ok(Settings::default())
            }
        }
    }

    /// Save settings to disk (write temp file, then rename)
    pub async fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(settings)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }

    /// Copy the current file aside with a timestamp suffix
    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if fs::metadata(&self.path).await.is_ok() {
            fs::copy(&self.path, &backup_path).await?;
        }

        Ok(backup_path)
    }
}
