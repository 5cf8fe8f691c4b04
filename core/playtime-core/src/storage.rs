//! Storage configuration and path management.
//!
//! All file paths live here so tests can point the whole system at a temp
//! directory with [`StorageConfig::with_root`].
//!
//! ## Layout
//!
//! ```text
//! ~/.playtime/
//! ├── playtime-data.json         # closed playtime per subject per partition
//! ├── display-preferences.json   # live display opt-in per subject
//! ├── config.toml                # runtime tuning (optional)
//! ├── daemon.sock                # daemon IPC socket
//! └── logs/                      # daemon log files
//! ```

use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::error::{PlaytimeError, Result};

const ROOT_DIR_NAME: &str = ".playtime";
const HOME_ENV: &str = "PLAYTIME_HOME";

/// Central configuration for all playtime storage paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the data root: `$PLAYTIME_HOME` if set, otherwise `~/.playtime`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(PlaytimeError::DataDirUnavailable)?;
        Ok(Self::with_root(home.join(ROOT_DIR_NAME)))
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|err| PlaytimeError::io("Failed to create data directory", err))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to playtime-data.json (closed playtime snapshot).
    pub fn playtime_file(&self) -> PathBuf {
        self.root.join("playtime-data.json")
    }

    /// Path to display-preferences.json (live display opt-in).
    pub fn preferences_file(&self) -> PathBuf {
        self.root.join("display-preferences.json")
    }

    /// Path to config.toml (runtime tuning).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the daemon's IPC socket.
    pub fn socket_file(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    /// Directory for daemon log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
