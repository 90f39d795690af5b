//! A live session ("batch"): one open workbook bound to one exclusive owner.
//!
//! Each session owns a dedicated OS thread that opens the engine document
//! and executes every operation against it, so the engine's thread-affinity
//! requirement holds by construction. Async callers talk to the thread over
//! a channel; every wait is bounded by a [`Budget`].

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::config::Budget;
use crate::engine::WorkbookEngine;
use crate::error::{Error, Result, TimeoutKind};

/// Opaque session identifier. Generated at creation, never derived from the
/// file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("b-{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

enum DocRequest {
    Execute {
        command: String,
        args: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
    Save {
        reply: oneshot::Sender<Result<()>>,
    },
    Dispose {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a live session.
///
/// Operations targeting the same session are serialized by an internal gate;
/// the engine is never invoked concurrently for one open workbook.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    path: PathBuf,
    created_at: DateTime<Utc>,
    tx: mpsc::Sender<DocRequest>,
    gate: tokio::sync::Mutex<()>,
}

impl SessionHandle {
    /// Spawn the host thread, open the document on it, and wait (bounded by
    /// `open_budget`) for the open to finish.
    ///
    /// If the wait times out the thread is left to finish opening on its
    /// own; it detects the abandoned handle and closes the document.
    pub(crate) async fn open(
        engine: Arc<dyn WorkbookEngine>,
        id: SessionId,
        path: PathBuf,
        open_budget: Budget,
    ) -> Result<Arc<Self>> {
        let (opened_tx, opened_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel();

        let thread_path = path.clone();
        thread::Builder::new()
            .name(format!("sheetd-session-{id}"))
            .spawn(move || host_loop(engine, thread_path, opened_tx, rx))
            .map_err(|e| Error::engine(format!("cannot spawn session host thread: {e}")))?;

        match tokio::time::timeout(open_budget.wait, opened_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(_)) => return Err(Error::engine("session host thread terminated during open")),
            Err(_) => {
                return Err(Error::Timeout {
                    waited: open_budget.wait,
                    kind: timeout_kind(open_budget),
                })
            }
        }

        Ok(Arc::new(Self {
            id,
            path,
            created_at: Utc::now(),
            tx,
            gate: tokio::sync::Mutex::new(()),
        }))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Execute a feature command against the document.
    ///
    /// A timeout (or dropping the returned future) abandons the wait only:
    /// the engine call itself is not interruptible mid-flight and will run
    /// to completion on the host thread before the next queued operation.
    pub async fn execute(&self, command: &str, args: &Value, budget: Budget) -> Result<Value> {
        let _gate = self.gate.lock().await;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(DocRequest::Execute {
            command: command.to_string(),
            args: args.clone(),
            reply: reply_tx,
        })?;
        await_reply(reply_rx, budget).await
    }

    /// Save the workbook. Same cancellation caveat as [`Self::execute`].
    pub async fn save(&self, budget: Budget) -> Result<()> {
        let _gate = self.gate.lock().await;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(DocRequest::Save { reply: reply_tx })?;
        await_reply(reply_rx, budget).await
    }

    /// Release the document's engine resources and stop the host thread.
    ///
    /// Queued after any in-flight operation; if a preceding save is still
    /// running past its budget, the dispose executes once it finishes.
    pub async fn dispose(&self, budget: Budget) -> Result<()> {
        let _gate = self.gate.lock().await;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(DocRequest::Dispose { reply: reply_tx })?;
        await_reply(reply_rx, budget).await
    }

    fn submit(&self, request: DocRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| Error::engine("session host thread terminated"))
    }
}

fn timeout_kind(budget: Budget) -> TimeoutKind {
    if budget.at_maximum {
        TimeoutKind::MaximumReached
    } else {
        TimeoutKind::Transient
    }
}

async fn await_reply<T>(rx: oneshot::Receiver<Result<T>>, budget: Budget) -> Result<T> {
    match tokio::time::timeout(budget.wait, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(Error::engine("session host thread terminated")),
        Err(_) => Err(Error::Timeout {
            waited: budget.wait,
            kind: timeout_kind(budget),
        }),
    }
}

fn host_loop(
    engine: Arc<dyn WorkbookEngine>,
    path: PathBuf,
    opened: oneshot::Sender<Result<()>>,
    rx: mpsc::Receiver<DocRequest>,
) {
    let mut doc = match engine.open(&path) {
        Ok(doc) => doc,
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };

    if opened.send(Ok(())).is_err() {
        // The opener stopped waiting; nobody owns this document.
        tracing::warn!(path = %path.display(), "open abandoned, closing workbook");
        if let Err(e) = doc.close() {
            tracing::warn!(path = %path.display(), error = %e, "close after abandoned open failed");
        }
        return;
    }

    while let Ok(request) = rx.recv() {
        match request {
            DocRequest::Execute {
                command,
                args,
                reply,
            } => {
                let _ = reply.send(doc.execute(&command, &args));
            }
            DocRequest::Save { reply } => {
                let _ = reply.send(doc.save());
            }
            DocRequest::Dispose { reply } => {
                let _ = reply.send(doc.close());
                return;
            }
        }
    }

    // Handle dropped without an explicit dispose.
    if let Err(e) = doc.close() {
        tracing::warn!(path = %path.display(), error = %e, "close on dropped session failed");
    }
}
