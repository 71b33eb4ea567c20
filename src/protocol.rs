//! Wire protocol types for the specter socket.
//!
//! One UTF-8 JSON value per direction per connection: the client sends a
//! [`Request`], the server answers with a [`Response`] and closes. Binary
//! response payloads (PNG captures) are base64-encoded into `data`.

// Rust guideline compliant 2026-02

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Operation selector for a [`Request`].
///
/// `Unknown` catches any unrecognized `op` string so the server can answer
/// with a proper error response instead of dropping the connection as
/// malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Start a new session. Handled client-side in the single-session
    /// surface; the server answers it like any unknown operation.
    Spawn,
    /// Write `payload[0]` verbatim to the session's pty.
    Type,
    /// Snapshot the emulated screen (`options.format`: `text` or `png`).
    Capture,
    /// Return the session's input history.
    History,
    /// Block until the child exits, then return its exit code.
    Wait,
    /// Terminate the child and shut the server down.
    Kill,
    /// Any op string the server does not recognize.
    #[serde(other)]
    Unknown,
}

/// A single client request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Requested operation.
    pub op: Op,
    /// Session key. Accepted for forward compatibility; the single-session
    /// server ignores it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Operation arguments. For `type`: `[text]`, written verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<String>,
    /// Operation options. Recognized: `format` for `capture`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, String>,
}

impl Request {
    /// Build a request with no payload or options.
    pub fn new(op: Op) -> Self {
        Self {
            op,
            id: String::new(),
            payload: Vec::new(),
            options: HashMap::new(),
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Vec<String>) -> Self {
        self.payload = payload;
        self
    }

    /// Attach one option key/value pair.
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }
}

/// Request outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// A single server response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// `ok` or `error`.
    pub status: Status,
    /// Human-readable detail. Always set on errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation result: screen text, base64 PNG, JSON-encoded history, or
    /// a decimal exit code, depending on the op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Response {
    /// Success with neither message nor data.
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            message: None,
            data: None,
        }
    }

    /// Success carrying a data payload.
    pub fn ok_with_data(data: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: None,
            data: Some(data.into()),
        }
    }

    /// Success carrying a human message.
    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Failure with a human message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            data: None,
        }
    }

    /// True when the status is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}
