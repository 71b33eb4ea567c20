//! Application-wide constants for specter.
//!
//! Centralizes the magic numbers shared between the session, server and
//! renderer so they are documented in one place.

// ============================================================================
// Transport
// ============================================================================

/// Socket file name, created in the server's working directory.
///
/// Clients find the server by resolving this name against their own cwd,
/// which is what scopes a specter instance to one project directory.
pub const SOCKET_NAME: &str = ".specter.sock";

/// Upper bound on a single request's encoded size.
///
/// A `type` payload is the only request that carries client data and even
/// pathological paste buffers stay far below this. Anything larger is
/// treated as a malformed request and the connection is dropped.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

// ============================================================================
// Terminal geometry
// ============================================================================

/// Emulated screen height in rows. Fixed for the lifetime of a session.
pub const GRID_ROWS: u16 = 30;

/// Emulated screen width in columns. Fixed for the lifetime of a session.
pub const GRID_COLS: u16 = 100;

/// Read buffer size for the pty reader thread.
///
/// 4 KiB matches the typical pty kernel buffer; larger reads don't reduce
/// wakeups and smaller ones fragment escape sequences more than necessary
/// (the vt100 parser handles fragments either way).
pub const PTY_READ_BUF: usize = 4096;
