//! # playtime-core
//!
//! Core library for playtime tracking: cumulative time per subject ("player")
//! per partition ("world"), persisted across restarts, with an optional
//! live-updating display per subject.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Periodic work runs on plain threads.
//! - **Thread-safe**: Every public type can be shared behind an `Arc` and called
//!   from any thread. Operations on the same subject are serialized per subject.
//! - **Never fails the caller**: Activity reporting does not return errors. I/O
//!   problems are logged with `tracing` and the in-memory state stays authoritative.
//! - **Explicit wiring**: Components receive their collaborators at construction;
//!   there is no process-wide singleton.
//!
//! ## Data Flow
//!
//! ```text
//! lifecycle signal → PresenceCoordinator → ActivityTracker → SessionStore → SessionRecord
//!                          ▲                                       │
//!                          └──────── DisplayBoard (observer) ◄─────┘ session ended
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use playtime_core::{load_runtime_config, PlaytimeEngine, StorageConfig, SystemClock};
//!
//! let storage = StorageConfig::from_env()?;
//! let config = load_runtime_config(&storage.config_file())?;
//! let engine = PlaytimeEngine::start(storage, &config, SystemClock::shared());
//!
//! engine.presence().register_player(subject, partition);
//! let report = engine.presence().on_command(subject, partition);
//! engine.shutdown();
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod ids;
pub mod periodic;
pub mod preferences;
pub mod presence;
pub mod record;
pub mod snapshot;
pub mod storage;
pub mod store;
mod sync;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_runtime_config, RuntimeConfig};
pub use engine::PlaytimeEngine;
pub use error::{PlaytimeError, Result};
pub use format::{display_text, summary_text};
pub use ids::{PartitionId, SubjectId};
pub use preferences::DisplayPreferences;
pub use presence::{DisplayBoard, DisplayHandle, PresenceCoordinator};
pub use record::SessionRecord;
pub use storage::StorageConfig;
pub use store::{PartitionReport, SessionObserver, SessionStore};
pub use tracker::ActivityTracker;
