//! Socket plumbing: accept, read one request line, answer with one line.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use playtime_core::{PlaytimeEngine, SubjectId};
use playtime_protocol::{ErrorInfo, Request, Response, ERROR_TOO_MANY_CONNECTIONS, MAX_REQUEST_BYTES};
use tracing::{debug, warn};

use crate::display::TextDisplay;
use crate::handlers::handle_request;

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;
const MAX_ACTIVE_CONNECTIONS: usize = 64;

pub struct DaemonState {
    engine: PlaytimeEngine,
    displays: DashMap<SubjectId, Arc<TextDisplay>>,
    active_connections: AtomicUsize,
}

impl DaemonState {
    pub fn new(engine: PlaytimeEngine) -> Self {
        Self {
            engine,
            displays: DashMap::new(),
            active_connections: AtomicUsize::new(0),
        }
    }

    pub fn engine(&self) -> &PlaytimeEngine {
        &self.engine
    }

    /// The subject's display, created on first use and reused afterwards.
    pub fn display_for(&self, subject: SubjectId) -> Arc<TextDisplay> {
        Arc::clone(
            self.displays
                .entry(subject)
                .or_insert_with(|| Arc::new(TextDisplay::new(subject)))
                .value(),
        )
    }

    pub fn current_text(&self, subject: SubjectId) -> Option<String> {
        self.displays
            .get(&subject)
            .and_then(|display| display.current_text())
    }
}

struct ConnectionSlot<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ConnectionSlot<'a> {
    fn acquire(active: &'a AtomicUsize) -> Option<Self> {
        let previous = active.fetch_add(1, Ordering::SeqCst);
        if previous >= MAX_ACTIVE_CONNECTIONS {
            active.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self { active })
    }
}

impl Drop for ConnectionSlot<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn accept_loop(listener: UnixListener, state: Arc<DaemonState>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&state);
                thread::spawn(move || handle_connection(stream, &state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn handle_connection(mut stream: UnixStream, state: &DaemonState) {
    let Some(_slot) = ConnectionSlot::acquire(&state.active_connections) else {
        warn!(limit = MAX_ACTIVE_CONNECTIONS, "Rejecting connection; too many active");
        let response = Response::error(None, ERROR_TOO_MANY_CONNECTIONS, "daemon is busy");
        let _ = write_response(&mut stream, response);
        return;
    };

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, state);
    if let Err(err) = write_response(&mut stream, response) {
        debug!(error = %err, "Client went away before the response was written");
    }
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
