//! # sheetd-core
//!
//! Session lifecycle for spreadsheet automation: the registry that enforces
//! at-most-one-session-per-file, the session handle that serializes access
//! to one open workbook on its own affinity thread, and the error taxonomy
//! shared by every layer above.
//!
//! The native automation binding is abstracted behind
//! [`WorkbookEngine`] / [`EngineDocument`]; [`scratch::ScratchEngine`] is a
//! small in-tree stand-in so the whole stack runs without one.

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod scratch;
pub mod session;

pub use config::{Budget, TimeoutPolicy};
pub use engine::{EngineDocument, WorkbookEngine};
pub use error::{Error, Result, TimeoutKind};
pub use registry::{CommitOutcome, SessionInfo, SessionRegistry};
pub use session::{SessionHandle, SessionId};
