//! The seam between sheetd and the native automation layer.
//!
//! The engine imposes thread affinity: a document's automation objects must
//! only be touched from the thread that created them. sheetd satisfies this
//! by construction — [`WorkbookEngine::open`] is invoked on the session's
//! dedicated host thread and the returned [`EngineDocument`] never leaves
//! it, which is why the document trait carries no `Send` bound.

use std::path::Path;

use serde_json::Value;

use crate::error::Result;

/// Factory for open workbook documents. Implementations wrap whatever
/// automation binding actually drives the spreadsheet application.
pub trait WorkbookEngine: Send + Sync + 'static {
    /// Open the workbook at `path`. Called on the session's host thread;
    /// fails if the file does not exist, is locked, or the automation host
    /// rejects it.
    fn open(&self, path: &Path) -> Result<Box<dyn EngineDocument>>;
}

/// One open workbook, exclusively owned by one session.
pub trait EngineDocument: std::fmt::Debug {
    /// Execute a namespaced feature command (`"table.sort"`, ...) with
    /// opaque JSON arguments, returning an opaque JSON result.
    fn execute(&mut self, command: &str, args: &Value) -> Result<Value>;

    /// Persist the workbook to its backing file.
    fn save(&mut self) -> Result<()>;

    /// Release all automation resources. Called exactly once, after which
    /// the document is never touched again.
    fn close(&mut self) -> Result<()>;
}
