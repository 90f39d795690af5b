//! Supervised forwarding: the command channel plus one restart-and-retry
//! on transport failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use sheetd_core::{Error, Result};
use sheetd_protocol::commands;

use crate::channel::CommandClient;
use crate::supervisor::WorkerSupervisor;

/// A committed-or-live session as reported by the worker.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub id: String,
    pub path: PathBuf,
}

/// Result of `batch.begin`.
#[derive(Debug, Clone)]
pub struct BeginOutcome {
    pub session: String,
    pub path: PathBuf,
}

/// Result of `batch.commit`.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub path: PathBuf,
    pub saved: bool,
}

/// Forwards commands to the worker, supervising it across failures.
///
/// A `Transport` failure triggers exactly one `ensure_running` followed by
/// one retry; everything else is surfaced as-is. Timeouts are never
/// retried here — the caller knows whether retrying a possibly-completed
/// operation is safe.
pub struct Forwarder {
    supervisor: Arc<WorkerSupervisor>,
    client: CommandClient,
}

impl Forwarder {
    pub fn new(supervisor: Arc<WorkerSupervisor>, client: CommandClient) -> Self {
        Self { supervisor, client }
    }

    /// Forward one command, restarting the worker once if the transport
    /// breaks.
    pub async fn call(
        &self,
        command: &str,
        session: Option<&str>,
        args: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        match self.client.send(command, session, args, timeout).await {
            Err(original @ Error::Transport { .. }) => {
                tracing::warn!(command, error = %original, "transport failure, re-supervising worker");
                if !self.supervisor.ensure_running().await? {
                    return Err(original);
                }
                self.client.send(command, session, args, timeout).await
            }
            other => other,
        }
    }

    pub async fn begin(&self, path: &Path) -> Result<BeginOutcome> {
        let data = self
            .call(
                commands::BATCH_BEGIN,
                None,
                &json!({ "path": path }),
                None,
            )
            .await?;
        Ok(BeginOutcome {
            session: require_str(&data, "session")?,
            path: PathBuf::from(require_str(&data, "path")?),
        })
    }

    pub async fn commit(
        &self,
        session: &str,
        save: bool,
        timeout: Option<Duration>,
    ) -> Result<CommitSummary> {
        let data = self
            .call(
                commands::BATCH_COMMIT,
                Some(session),
                &json!({ "save": save }),
                timeout,
            )
            .await?;
        Ok(CommitSummary {
            path: PathBuf::from(require_str(&data, "path")?),
            saved: data.get("saved").and_then(Value::as_bool).unwrap_or(save),
        })
    }

    pub async fn list(&self) -> Result<Vec<SessionEntry>> {
        let data = self.call(commands::BATCH_LIST, None, &Value::Null, None).await?;
        let sessions = data
            .get("sessions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        sessions
            .iter()
            .map(|entry| {
                Ok(SessionEntry {
                    id: require_str(entry, "id")?,
                    path: PathBuf::from(require_str(entry, "path")?),
                })
            })
            .collect()
    }

    pub async fn ping(&self) -> Result<Value> {
        self.call(commands::WORKER_PING, None, &Value::Null, None)
            .await
    }

    /// Ask the worker to drain its sessions and exit.
    pub async fn shutdown_worker(&self) -> Result<()> {
        self.call(commands::WORKER_SHUTDOWN, None, &Value::Null, None)
            .await?;
        Ok(())
    }
}

fn require_str(data: &Value, key: &str) -> Result<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::transport(format!("malformed worker response: missing '{key}'")))
}
