//! The command channel client: one request/response pair per call, with
//! timeout, over the worker's TCP protocol.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use sheetd_core::{Error, Result, TimeoutKind};
use sheetd_protocol::{commands, Outcome, Request, Transport};

/// Command channel configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// How long to wait for a response when the caller supplies no
    /// per-request timeout. Generous: the worker enforces its own budgets
    /// and answers with a classified timeout error well before this.
    pub default_timeout: Duration,
    /// Slack added on top of a caller-supplied timeout so the worker's own
    /// timeout answer can arrive before the client gives up waiting.
    pub timeout_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: sheetd_protocol::DEFAULT_PORT,
            default_timeout: Duration::from_secs(330),
            timeout_grace: Duration::from_secs(10),
        }
    }
}

/// A client-side endpoint of the command channel.
///
/// One request is in flight per client instance at a time; callers that
/// want parallel commands use one instance each. The connection is
/// established lazily, reused across calls, and dropped on timeout or
/// transport failure so a stale late reply can never be correlated with a
/// newer request.
pub struct CommandClient {
    config: ClientConfig,
    conn: Mutex<Option<Transport>>,
    next_id: AtomicU64,
}

impl CommandClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Send one command and wait for its correlated response.
    ///
    /// A timeout is reported as [`Error::Timeout`], transport breakage as
    /// [`Error::Transport`]; the caller decides whether to re-supervise the
    /// worker and retry.
    pub async fn send(
        &self,
        command: &str,
        session: Option<&str>,
        args: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            let transport = Transport::connect(&self.config.host, self.config.port)
                .await
                .map_err(|e| Error::transport(e.to_string()))?;
            *guard = Some(transport);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = Request::new(id, command).with_args(args.clone());
        if let Some(session) = session {
            request = request.with_session(session);
        }
        if let Some(timeout) = timeout {
            request = request.with_timeout_ms(timeout.as_millis() as u64);
        }

        tracing::trace!(id, command, "sending request");
        let sent = guard
            .as_mut()
            .expect("connection just established")
            .send_request(&request)
            .await;
        if let Err(e) = sent {
            *guard = None;
            return Err(Error::transport(format!("failed to send request: {e}")));
        }

        let wait = timeout
            .map(|t| t + self.config.timeout_grace)
            .unwrap_or(self.config.default_timeout);
        let deadline = tokio::time::Instant::now() + wait;

        let received = recv_correlated(
            guard.as_mut().expect("connection just established"),
            id,
            deadline,
        )
        .await;

        match received {
            Received::Response(outcome) => match outcome {
                Outcome::Ok { data } => Ok(data.unwrap_or(Value::Null)),
                Outcome::Error {
                    message,
                    kind,
                    native_code,
                } => Err(Error::from_wire(&kind, message, native_code)),
            },
            Received::TimedOut => {
                // Drop the connection: its next frame would be the reply to
                // this request, which nobody is waiting for.
                *guard = None;
                Err(Error::Timeout {
                    waited: wait,
                    kind: TimeoutKind::Transient,
                })
            }
            Received::Broken(message) => {
                *guard = None;
                Err(Error::transport(message))
            }
        }
    }

    /// Liveness probe: true iff the worker answers a ping within `wait`.
    pub async fn ping(&self, wait: Duration) -> bool {
        matches!(
            tokio::time::timeout(
                wait,
                self.send(commands::WORKER_PING, None, &Value::Null, None)
            )
            .await,
            Ok(Ok(_))
        )
    }

    /// Drop the cached connection; the next call reconnects.
    pub async fn disconnect(&self) {
        *self.conn.lock().await = None;
    }
}

enum Received {
    Response(Outcome),
    TimedOut,
    Broken(String),
}

/// Wait for the response correlated with `id`, discarding stale frames left
/// over from an abandoned earlier wait on the same connection.
async fn recv_correlated(
    transport: &mut Transport,
    id: u64,
    deadline: tokio::time::Instant,
) -> Received {
    loop {
        let response = match tokio::time::timeout_at(deadline, transport.recv_response()).await {
            Err(_) => return Received::TimedOut,
            Ok(Err(e)) => return Received::Broken(format!("failed to read response: {e}")),
            Ok(Ok(response)) => response,
        };

        if response.id != id {
            tracing::warn!(
                expected = id,
                got = response.id,
                "discarding uncorrelated response"
            );
            continue;
        }

        return Received::Response(response.outcome);
    }
}
