//! Runtime configuration loaded from `config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine:
//!
//! ```toml
//! [tracker]
//! autosave_interval_secs = 60
//!
//! [display]
//! refresh_interval_ms = 1000
//!
//! [shutdown]
//! grace_secs = 5
//! ```
//!
//! The autosave interval is the upper bound on how much *closed* playtime an
//! unclean exit can lose. Open sessions are never persisted, so their
//! in-flight time is always lost on restart.

use std::path::Path;
use std::time::Duration;

use fs_err as fs;
use serde::Deserialize;

use crate::error::{PlaytimeError, Result};

const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 60;
const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    pub autosave_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub refresh_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownConfig {
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

impl RuntimeConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.tracker.autosave_interval_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.display.refresh_interval_ms.max(10))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_secs)
    }
}

/// Loads `config.toml`, falling back to defaults when the file is absent.
pub fn load_runtime_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|err| PlaytimeError::io(format!("Failed to read {}", path.display()), err))?;
    toml::from_str::<RuntimeConfig>(&content).map_err(|err| PlaytimeError::Config {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let temp = tempfile::tempdir().expect("temp dir");
        let config = load_runtime_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.autosave_interval(), Duration::from_secs(60));
        assert_eq!(config.refresh_interval(), Duration::from_millis(1000));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[display]\nrefresh_interval_ms = 250\n").expect("write");

        let config = load_runtime_config(&path).expect("load");
        assert_eq!(config.display.refresh_interval_ms, 250);
        assert_eq!(config.tracker.autosave_interval_secs, 60);
        assert_eq!(config.shutdown.grace_secs, 5);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[tracker]\nautosave = 5\n").expect("write");

        let err = load_runtime_config(&path).expect_err("should fail");
        assert!(matches!(err, PlaytimeError::Config { .. }));
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let mut config = RuntimeConfig::default();
        config.tracker.autosave_interval_secs = 0;
        config.display.refresh_interval_ms = 0;
        assert_eq!(config.autosave_interval(), Duration::from_secs(1));
        assert_eq!(config.refresh_interval(), Duration::from_millis(10));
    }
}
