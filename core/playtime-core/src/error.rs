//! Error types for playtime-core operations.
//!
//! These errors only surface from the low-level helpers (snapshot files,
//! configuration). The session API absorbs them and logs a warning instead.

use std::path::PathBuf;

/// All errors that can occur in playtime-core helpers.
#[derive(Debug, thiserror::Error)]
pub enum PlaytimeError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found; cannot resolve the data directory")]
    DataDirUnavailable,

    #[error("Configuration file malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using PlaytimeError.
pub type Result<T> = std::result::Result<T, PlaytimeError>;

impl PlaytimeError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PlaytimeError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        PlaytimeError::Json {
            context: context.into(),
            source,
        }
    }
}
