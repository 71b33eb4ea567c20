//! Specter - programmatic test harness for terminal applications.
//!
//! Specter launches a child program attached to a pseudo-terminal, feeds
//! its output through an in-memory terminal emulator, and serves
//! inspection and input requests over a local unix socket, so scripted
//! drivers can exercise TUIs the way a user at a real terminal would.
//!
//! # Architecture
//!
//! - [`session`] - child process, pty plumbing, reader thread, exit signal
//! - [`emulator`] - vt100-backed screen grid
//! - [`render`] / [`font`] - text and PNG snapshots of the live grid
//! - [`server`] - one-request-per-connection JSON socket server
//! - [`protocol`] - the request/response wire schema

pub mod constants;
pub mod emulator;
pub mod font;
pub mod protocol;
pub mod render;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use emulator::{CellSnapshot, Emulator};
pub use font::FontBook;
pub use protocol::{Op, Request, Response, Status};
pub use session::Session;
