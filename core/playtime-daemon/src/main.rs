//! Playtime daemon entrypoint.
//!
//! Owns the single playtime engine for this machine. Lifecycle signals arrive
//! as one-line JSON requests over a Unix socket; each connection is served on
//! its own thread. Ctrl-C or SIGTERM ends every open session, saves, removes
//! the socket and exits.

use fs_err as fs;
use std::env;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use playtime_core::{load_runtime_config, PlaytimeEngine, RuntimeConfig, StorageConfig, SystemClock};

mod display;
mod handlers;
mod server;

use server::DaemonState;

const DEBUG_ENV: &str = "PLAYTIME_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "playtime-daemon";

fn main() {
    let storage = match StorageConfig::from_env() {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("playtime-daemon: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = storage.ensure_root() {
        eprintln!("playtime-daemon: {}", err);
        std::process::exit(1);
    }

    let _logging_guard = init_logging(&storage.logs_dir());

    let config = match load_runtime_config(&storage.config_file()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load runtime config; using defaults");
            RuntimeConfig::default()
        }
    };

    let socket_path = storage.socket_file();
    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        error!(error = %err, "Failed to install signal handler");
        std::process::exit(1);
    }

    let engine = PlaytimeEngine::start(storage, &config, SystemClock::shared());
    let state = Arc::new(DaemonState::new(engine));
    info!(
        path = %socket_path.display(),
        autosave_secs = config.tracker.autosave_interval_secs,
        refresh_ms = config.display.refresh_interval_ms,
        "Playtime daemon started"
    );

    let accept_state = Arc::clone(&state);
    let accept = thread::Builder::new()
        .name("playtime-accept".to_string())
        .spawn(move || server::accept_loop(listener, accept_state));
    if let Err(err) = accept {
        error!(error = %err, "Failed to spawn accept thread");
        state.engine().shutdown();
        let _ = remove_existing_socket(&socket_path);
        std::process::exit(1);
    }

    // A closed channel means the handler is gone; shut down either way.
    let _ = stop_rx.recv();
    info!("Shutdown requested");

    state.engine().shutdown();
    if let Err(err) = remove_existing_socket(&socket_path) {
        warn!(error = %err, path = %socket_path.display(), "Failed to remove socket");
    }
    info!("Playtime daemon stopped");
}

/// Logs to stderr and to a daily-rolling file under `logs_dir`.
///
/// The returned guard flushes the file writer on drop and must outlive
/// every log call.
fn init_logging(logs_dir: &Path) -> Option<WorkerGuard> {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(logs_dir);
    let (file_layer, guard, appender_error) = match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(err) = appender_error {
        warn!(error = %err, dir = %logs_dir.display(), "File logging disabled");
    }
    guard
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}
