//! Wire protocol between sheetd clients and the worker process.
//!
//! The protocol is JSON in length-prefixed frames over a localhost TCP
//! connection: each frame is a 4-byte big-endian payload length followed by
//! one serialized [`Request`] or [`Response`]. Requests and responses are
//! correlated by a `u64` id chosen by the client; the worker echoes it back,
//! so concurrent requests on one connection can be told apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod transport;

pub use transport::{FrameReader, FrameWriter, Transport};

/// Default localhost port the worker listens on.
pub const DEFAULT_PORT: u16 = 34275;

/// Well-known command names understood by the worker itself.
///
/// Everything else (`worksheet.add`, `range.set-values`, ...) is passed
/// through to the engine document of the addressed session.
pub mod commands {
    /// Open a workbook and create a session. Args: `{"path": string}`.
    pub const BATCH_BEGIN: &str = "batch.begin";
    /// Save (optionally) and dispose a session. Args: `{"save": bool}`.
    pub const BATCH_COMMIT: &str = "batch.commit";
    /// Snapshot of live sessions. No args.
    pub const BATCH_LIST: &str = "batch.list";
    /// Liveness probe. No session, no args.
    pub const WORKER_PING: &str = "worker.ping";
    /// Drain all sessions and exit. No session, no args.
    pub const WORKER_SHUTDOWN: &str = "worker.shutdown";
}

/// A command sent from a client to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, unique per connection among in-flight requests.
    pub id: u64,
    /// Namespaced command name, `"category.action"`.
    pub command: String,
    /// Target session, absent for no-session commands like `worker.ping`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Command arguments, opaque to the transport layer.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
    /// Per-request timeout override in milliseconds. The worker clamps
    /// this to its configured hard maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Request {
    pub fn new(id: u64, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
            session: None,
            args: Value::Null,
            timeout_ms: None,
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// A response sent from the worker back to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request id this response corresponds to.
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// The result of a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Outcome {
    #[serde(rename = "ok")]
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename = "error")]
    Error {
        /// Human-readable failure description.
        message: String,
        /// Machine-checkable error kind, one of the taxonomy strings
        /// (`conflict`, `not-found`, `engine`, `timeout`, `timeout-max`,
        /// `transport`, `missing-parameter`).
        kind: String,
        /// Opaque native error code passed through from the engine
        /// (e.g. an HRESULT). Never interpreted by this layer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        native_code: Option<String>,
    },
}

impl Response {
    pub fn ok(id: u64, data: Option<Value>) -> Self {
        Self {
            id,
            outcome: Outcome::Ok { data },
        }
    }

    pub fn error(
        id: u64,
        kind: impl Into<String>,
        message: impl Into<String>,
        native_code: Option<String>,
    ) -> Self {
        Self {
            id,
            outcome: Outcome::Error {
                message: message.into(),
                kind: kind.into(),
                native_code,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok { .. })
    }
}

/// Errors that can occur at the wire level.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("frame of {size} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WireError>;
