//! Unix domain socket request server.
//!
//! Listens on a well-known socket path, decodes one JSON [`Request`] per
//! connection, dispatches it against the session, writes one JSON
//! [`Response`], and closes. Connections are served concurrently; the only
//! cross-connection state is the session itself and the shutdown signal.
//!
//! Malformed or truncated requests close the connection without a
//! response. A client that disappears before the response is written is
//! logged and abandoned — every side effect happens before the response,
//! so nothing is left half-done.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;

use crate::constants::{GRID_COLS, GRID_ROWS, MAX_REQUEST_BYTES};
use crate::font::FontBook;
use crate::protocol::{Op, Request, Response};
use crate::session::Session;

/// State shared by every connection handler.
struct ServerState {
    session: Session,
    fonts: FontBook,
    /// Fired by the kill handler after its response is on the wire; the
    /// accept loop exits on it.
    shutdown: Notify,
}

/// Run the server until an orderly `kill` shutdown.
///
/// Removes any stale socket at `socket_path`, binds, spawns the session
/// for `argv`, and serves requests. The socket file is removed again
/// before this returns, on both the orderly and the spawn-failure path.
///
/// # Errors
///
/// Returns an error when the font book, the listener, or the session
/// cannot be set up. Per-connection failures never propagate here.
pub async fn run(socket_path: PathBuf, argv: Vec<String>) -> Result<()> {
    let fonts = FontBook::load().context("Failed to load a monospace font")?;

    if socket_path.exists() {
        std::fs::remove_file(&socket_path).with_context(|| {
            format!("Failed to remove stale socket: {}", socket_path.display())
        })?;
    }

    let listener = std::os::unix::net::UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;
    listener.set_nonblocking(true)?;
    let listener = UnixListener::from_std(listener)?;

    let session = match Session::spawn(&argv, GRID_ROWS, GRID_COLS) {
        Ok(session) => session,
        Err(e) => {
            drop(listener);
            remove_socket(&socket_path);
            return Err(e);
        }
    };

    log::info!(
        "specter listening on {} (session: {:?})",
        socket_path.display(),
        argv
    );

    let state = Arc::new(ServerState {
        session,
        fonts,
        shutdown: Notify::new(),
    });

    loop {
        tokio::select! {
            _ = state.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    tokio::spawn(handle_connection(stream, Arc::clone(&state)));
                }
                Err(e) => {
                    // One bad accept must not take the server down
                    log::error!("Accept error: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    drop(listener);
    remove_socket(&socket_path);
    log::info!("specter shut down");
    Ok(())
}

fn remove_socket(socket_path: &Path) {
    if let Err(e) = std::fs::remove_file(socket_path) {
        log::warn!("Failed to remove socket {}: {e}", socket_path.display());
    }
}

/// Serve one connection: one request in, one response out.
async fn handle_connection(mut stream: UnixStream, state: Arc<ServerState>) {
    let Some(req) = read_request(&mut stream).await else {
        return;
    };

    let shutdown_after = req.op == Op::Kill;
    let resp = dispatch(req, &state).await;

    match serde_json::to_vec(&resp) {
        Ok(body) => {
            if let Err(e) = stream.write_all(&body).await {
                log::debug!("Client went away before response: {e}");
            }
        }
        Err(e) => log::error!("Failed to encode response: {e}"),
    }

    // Only after the response had its chance on the wire
    if shutdown_after {
        state.shutdown.notify_one();
    }
}

/// Read exactly one JSON request value from the stream.
///
/// The wire carries no framing, so the value is parsed incrementally:
/// after each read the buffer is tried as a complete JSON value, and an
/// "unexpected end of input" error just means more bytes are needed.
/// Returns `None` on malformed input, early EOF, or an oversized request.
async fn read_request(stream: &mut UnixStream) -> Option<Request> {
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    let mut chunk = [0u8; 1024];
    loop {
        let mut values = serde_json::Deserializer::from_slice(&buf).into_iter::<Request>();
        match values.next() {
            Some(Ok(req)) => return Some(req),
            Some(Err(e)) if e.is_eof() => {}
            Some(Err(e)) => {
                log::debug!("Malformed request: {e}");
                return None;
            }
            None => {}
        }

        if buf.len() >= MAX_REQUEST_BYTES {
            log::debug!("Request exceeds {MAX_REQUEST_BYTES} bytes, dropping connection");
            return None;
        }
        match stream.read(&mut chunk).await {
            Ok(0) => {
                log::debug!("Connection closed mid-request");
                return None;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                log::debug!("Request read error: {e}");
                return None;
            }
        }
    }
}

/// Route a request to its handler.
async fn dispatch(req: Request, state: &ServerState) -> Response {
    match req.op {
        Op::Type => handle_type(req, state),
        Op::Capture => handle_capture(req, state),
        Op::History => handle_history(state),
        Op::Wait => handle_wait(state).await,
        Op::Kill => handle_kill(state),
        Op::Spawn | Op::Unknown => Response::error("Unknown operation"),
    }
}

/// `type`: write `payload[0]` to the pty, then record it in history.
fn handle_type(req: Request, state: &ServerState) -> Response {
    if state.session.is_exited() {
        return Response::error("Process has exited");
    }
    let Some(text) = req.payload.first() else {
        return Response::ok();
    };
    if let Err(e) = state.session.write_input(text.as_bytes()) {
        return Response::error(format!("Failed to write: {e}"));
    }
    state.session.record_input(text);
    Response::ok()
}

/// `capture`: snapshot the screen as text or PNG per the `format` option.
///
/// Unrecognized formats fall back to text.
fn handle_capture(req: Request, state: &ServerState) -> Response {
    let format = req
        .options
        .get("format")
        .map(String::as_str)
        .unwrap_or("text");

    if format == "png" {
        match state.session.capture_png(&state.fonts) {
            Ok(bytes) => Response::ok_with_data(BASE64.encode(bytes)),
            Err(e) => Response::error(format!("Failed to render PNG: {e}")),
        }
    } else {
        match state.session.capture_text() {
            Ok(text) => Response::ok_with_data(text),
            Err(e) => Response::error(format!("Failed to capture: {e}")),
        }
    }
}

/// `history`: the input history as a JSON array encoded into `data`.
fn handle_history(state: &ServerState) -> Response {
    match serde_json::to_string(&state.session.history()) {
        Ok(json) => Response::ok_with_data(json),
        Err(e) => Response::error(format!("Failed to encode history: {e}")),
    }
}

/// `wait`: block until the child exits, return the decimal exit code.
async fn handle_wait(state: &ServerState) -> Response {
    match state.session.await_exit().await {
        Ok(code) => Response::ok_with_data(code.to_string()),
        Err(e) => Response::error(e.to_string()),
    }
}

/// `kill`: terminate the session; the caller schedules server shutdown
/// once the response is written.
fn handle_kill(state: &ServerState) -> Response {
    state.session.kill();
    Response::ok_with_message("Server shutting down")
}
