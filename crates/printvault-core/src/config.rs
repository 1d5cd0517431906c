use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::VaultError;

/// Top-level PrintVault configuration, stored at `~/.printvault/config.toml`.
/// Constructed once at startup and passed explicitly into the ingest and
/// scheduling APIs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VaultConfig {
    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub slicing: SlicingConfig,
}

/// Where library content lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LibraryConfig {
    /// Root directory for stored files. Defaults to `~/.printvault/library`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Watched-folder scan behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Extensions (lowercase, no dot) considered library content.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_extensions() -> Vec<String> {
    ["stl", "obj", "3mf", "step", "gcode", "bgcode"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            follow_symlinks: false,
        }
    }
}

/// Slicing pipeline policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicingConfig {
    /// Maximum number of jobs running simultaneously, system-wide.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Hard bound on a single slicer invocation.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Requeue transient failures automatically.
    #[serde(default = "default_auto_retry")]
    pub auto_retry: bool,

    /// Terminal jobs older than this are purged by the cleanup sweep.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: u32,

    /// Worker idle/child-process poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_concurrent() -> u32 {
    2
}

fn default_timeout_seconds() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_auto_retry() -> bool {
    true
}

fn default_cleanup_days() -> u32 {
    30
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            auto_retry: default_auto_retry(),
            cleanup_days: default_cleanup_days(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl VaultConfig {
    /// Returns the PrintVault home directory (`~/.printvault/`).
    pub fn home_dir() -> Result<PathBuf, VaultError> {
        let base = dirs::home_dir().ok_or_else(|| VaultError::Config {
            message: "could not determine home directory".into(),
        })?;
        Ok(base.join(".printvault"))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Result<PathBuf, VaultError> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Returns the path to the database file.
    pub fn db_path() -> Result<PathBuf, VaultError> {
        Ok(Self::home_dir()?.join("printvault.db"))
    }

    /// Effective library root: configured value or `~/.printvault/library`.
    pub fn library_root(&self) -> Result<PathBuf, VaultError> {
        match &self.library.root {
            Some(root) => Ok(root.clone()),
            None => Ok(Self::home_dir()?.join("library")),
        }
    }

    /// Load config from the default location, or return defaults if not found.
    pub fn load() -> Result<Self, VaultError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, VaultError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<(), VaultError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), VaultError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VaultError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the PrintVault home directory with default config.
    pub fn init() -> Result<PathBuf, VaultError> {
        let home = Self::home_dir()?;
        std::fs::create_dir_all(&home)?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Ok(home)
    }
}
