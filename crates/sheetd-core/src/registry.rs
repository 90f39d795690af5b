//! The session registry: single source of truth for which file has a live
//! session.
//!
//! Two maps guard two different invariants. A path set enforces exclusive
//! per-file ownership via atomic check-and-insert at begin; the id map is
//! the lookup table every feature call goes through. Commit removes the id
//! *before* touching the engine, so a crash mid-save can never leave a
//! session both active and half-closed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::TimeoutPolicy;
use crate::engine::WorkbookEngine;
use crate::error::{Error, Result};
use crate::session::{SessionHandle, SessionId};

/// Snapshot entry returned by [`SessionRegistry::list`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub path: PathBuf,
    pub saved: bool,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<SessionHandle>>,
    paths: HashSet<PathBuf>,
}

/// Concurrent mapping from session ids to live sessions, enforcing
/// at-most-one-session-per-file.
///
/// An explicitly-owned object with its own lifecycle: construct one at
/// process start, call [`SessionRegistry::shutdown`] at process end.
pub struct SessionRegistry {
    engine: Arc<dyn WorkbookEngine>,
    timeouts: TimeoutPolicy,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn WorkbookEngine>, timeouts: TimeoutPolicy) -> Self {
        Self {
            engine,
            timeouts,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    /// Open a workbook and create a session for it.
    ///
    /// Fails with [`Error::Conflict`] if the normalized path already has a
    /// live session, and with [`Error::Engine`] if the file does not exist
    /// or the engine refuses to open it.
    pub async fn begin(&self, path: &Path) -> Result<Arc<SessionHandle>> {
        let normalized = path
            .canonicalize()
            .map_err(|e| Error::engine(format!("cannot open {}: {e}", path.display())))?;

        {
            let mut inner = self.lock();
            if inner.paths.contains(&normalized) {
                return Err(Error::Conflict { path: normalized });
            }
            inner.paths.insert(normalized.clone());
        }

        let id = SessionId::generate();
        let handle = match SessionHandle::open(
            self.engine.clone(),
            id.clone(),
            normalized.clone(),
            self.timeouts.open_budget(),
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.lock().paths.remove(&normalized);
                return Err(e);
            }
        };

        let lost_race = {
            let mut inner = self.lock();
            if inner.sessions.contains_key(&id) {
                true
            } else {
                inner.sessions.insert(id.clone(), handle.clone());
                false
            }
        };
        if lost_race {
            // Lost the insert race on the id: tear the fresh document down
            // rather than leak it.
            self.dispose_quietly(&handle).await;
            self.lock().paths.remove(&normalized);
            return Err(Error::Conflict { path: normalized });
        }

        tracing::info!(session = %id, path = %normalized.display(), "session opened");
        Ok(handle)
    }

    /// Non-blocking lookup used by every feature call.
    pub fn get(&self, id: &SessionId) -> Result<Arc<SessionHandle>> {
        self.lock()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                id: id.to_string(),
            })
    }

    /// Save (optionally) and dispose a session.
    ///
    /// The id is removed from the registry before save/dispose run, so a
    /// second commit of the same id observes [`Error::NotFound`] instead of
    /// racing the first. Dispose is attempted unconditionally; its own
    /// failures are logged and swallowed so the save outcome is what gets
    /// reported.
    pub async fn commit(
        &self,
        id: &SessionId,
        save: bool,
        timeout: Option<Duration>,
    ) -> Result<CommitOutcome> {
        let handle = self
            .lock()
            .sessions
            .remove(id)
            .ok_or_else(|| Error::NotFound {
                id: id.to_string(),
            })?;

        let path = handle.path().to_path_buf();

        let save_result = if save {
            handle.save(self.timeouts.save_budget(timeout)).await
        } else {
            Ok(())
        };

        self.dispose_quietly(&handle).await;
        self.lock().paths.remove(&path);

        match save_result {
            Ok(()) => {
                tracing::info!(session = %id, path = %path.display(), saved = save, "session committed");
                Ok(CommitOutcome { path, saved: save })
            }
            Err(e) => {
                tracing::warn!(session = %id, path = %path.display(), error = %e, "commit failed");
                Err(e)
            }
        }
    }

    /// Snapshot of live sessions. Never blocks on engine state.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.lock()
            .sessions
            .values()
            .map(|handle| SessionInfo {
                id: handle.id().clone(),
                path: handle.path().to_path_buf(),
                created_at: handle.created_at(),
            })
            .collect()
    }

    /// Drain the registry, disposing every live session best-effort. One
    /// bad session cannot block cleanup of the rest.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<SessionHandle>> = {
            let mut inner = self.lock();
            inner.paths.clear();
            inner.sessions.drain().map(|(_, handle)| handle).collect()
        };

        if drained.is_empty() {
            return;
        }

        tracing::info!(count = drained.len(), "disposing live sessions at shutdown");
        for handle in drained {
            self.dispose_quietly(&handle).await;
        }
    }

    async fn dispose_quietly(&self, handle: &SessionHandle) {
        if let Err(e) = handle.dispose(self.timeouts.dispose_budget()).await {
            tracing::warn!(session = %handle.id(), error = %e, "dispose failed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning means a panic inside a map operation, which is an
        // invariant violation already.
        self.inner.lock().expect("session registry lock poisoned")
    }
}
