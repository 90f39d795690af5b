//! Error taxonomy for sheetd.
//!
//! Every failure a caller can see is one of these kinds. They cross the wire
//! as `(kind, message, native_code)` triples and are reconstructed on the
//! client side, so the taxonomy is shared by local and forwarded paths.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

// A wire-reconstructed MissingParameter has no action and carries the full
// remote message in `param`.
fn missing_parameter_message(action: &str, param: &str) -> String {
    if action.is_empty() {
        param.to_string()
    } else {
        format!("action '{action}' requires parameter '{param}'")
    }
}

/// Whether a timed-out wait is worth retrying with a larger budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The wait used a caller-supplied or default budget below the hard
    /// maximum; retrying with a larger budget is sane.
    Transient,
    /// The wait already used the hard maximum; retrying will not help.
    MaximumReached,
}

/// Errors that can occur in the sheetd session and forwarding layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A required tool parameter was absent. Resolved at the boundary,
    /// never reaches the engine or the wire.
    #[error("{}", missing_parameter_message(action, param))]
    MissingParameter { action: String, param: String },

    /// A live session already exists for the file.
    #[error("a session is already open for {}", path.display())]
    Conflict { path: PathBuf },

    /// Unknown or already-committed session id.
    #[error("session '{id}' does not exist or was already committed")]
    NotFound { id: String },

    /// Native automation failure. The message and code are opaque
    /// passthrough from the engine.
    #[error("engine error: {message}")]
    Engine {
        message: String,
        native_code: Option<String>,
    },

    /// A bounded wait elapsed before the operation finished.
    #[error("operation did not complete within {}ms{}", waited.as_millis(),
            if *kind == TimeoutKind::MaximumReached { " (maximum timeout reached)" } else { "" })]
    Timeout { waited: Duration, kind: TimeoutKind },

    /// The worker process is unreachable or the connection broke mid-call.
    #[error("worker transport error: {message}")]
    Transport { message: String },
}

impl Error {
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine {
            message: message.into(),
            native_code: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    pub fn missing_parameter(action: impl Into<String>, param: impl Into<String>) -> Self {
        Error::MissingParameter {
            action: action.into(),
            param: param.into(),
        }
    }

    /// Stable machine-checkable kind string, used on the wire and in the
    /// tool envelope's `exceptionType`.
    pub fn wire_kind(&self) -> &'static str {
        match self {
            Error::MissingParameter { .. } => "missing-parameter",
            Error::Conflict { .. } => "conflict",
            Error::NotFound { .. } => "not-found",
            Error::Engine { .. } => "engine",
            Error::Timeout {
                kind: TimeoutKind::Transient,
                ..
            } => "timeout",
            Error::Timeout {
                kind: TimeoutKind::MaximumReached,
                ..
            } => "timeout-max",
            Error::Transport { .. } => "transport",
        }
    }

    /// Opaque native error code, if the engine reported one.
    pub fn native_code(&self) -> Option<&str> {
        match self {
            Error::Engine { native_code, .. } => native_code.as_deref(),
            _ => None,
        }
    }

    /// Reconstruct an error from its wire representation. Unknown kinds
    /// collapse into [`Error::Engine`] so a newer worker cannot crash an
    /// older client.
    pub fn from_wire(kind: &str, message: String, native_code: Option<String>) -> Self {
        match kind {
            "missing-parameter" => Error::MissingParameter {
                action: String::new(),
                param: message,
            },
            "conflict" => Error::Conflict {
                path: PathBuf::from(message),
            },
            "not-found" => Error::NotFound { id: message },
            "timeout" => Error::Timeout {
                waited: Duration::ZERO,
                kind: TimeoutKind::Transient,
            },
            "timeout-max" => Error::Timeout {
                waited: Duration::ZERO,
                kind: TimeoutKind::MaximumReached,
            },
            "transport" => Error::Transport { message },
            _ => Error::Engine {
                message,
                native_code,
            },
        }
    }

    /// The message carried on the wire. For `Conflict` and `NotFound` this
    /// is the value `from_wire` restores the variant from.
    pub fn wire_message(&self) -> String {
        match self {
            Error::Conflict { path } => path.display().to_string(),
            Error::NotFound { id } => id.clone(),
            other => other.to_string(),
        }
    }
}
