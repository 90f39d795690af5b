//! TCP server loop for the worker process.
//!
//! Each client connection is served sequentially: one request is read,
//! dispatched, and answered before the next is read. Clients that want
//! concurrency open one connection per in-flight request; requests on
//! different connections run concurrently against the shared registry.
//! Responses carry the request's correlation id either way.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use sheetd_core::{SessionRegistry, TimeoutPolicy, WorkbookEngine};
use sheetd_protocol::{Transport, WireError};

use crate::dispatch::dispatch;

/// Worker process configuration.
pub struct WorkerConfig {
    /// Interface to bind. Loopback only by design; the worker trusts its
    /// callers.
    pub host: String,
    pub port: u16,
    pub timeouts: TimeoutPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: sheetd_protocol::DEFAULT_PORT,
            timeouts: TimeoutPolicy::default(),
        }
    }
}

/// Bind and serve until a `worker.shutdown` command arrives.
pub async fn run(config: WorkerConfig, engine: Arc<dyn WorkbookEngine>) -> std::io::Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "sheetd worker listening");
    let registry = Arc::new(SessionRegistry::new(engine, config.timeouts));
    serve(listener, registry).await
}

/// Serve an already-bound listener. Returns after a `worker.shutdown`
/// command has been answered and every live session has been disposed.
pub async fn serve(listener: TcpListener, registry: Arc<SessionRegistry>) -> std::io::Result<()> {
    let shutdown = Arc::new(Notify::new());

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.notified() => break,
        };

        match accepted {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "client connected");
                let registry = registry.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    handle_connection(registry, stream, shutdown).await;
                    tracing::debug!(%peer, "client disconnected");
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }

    tracing::info!("draining sessions and shutting down");
    registry.shutdown().await;
    Ok(())
}

async fn handle_connection(
    registry: Arc<SessionRegistry>,
    stream: TcpStream,
    shutdown: Arc<Notify>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "set_nodelay failed");
    }
    let mut transport = Transport::new(stream);

    loop {
        let request = match transport.recv_request().await {
            Ok(request) => request,
            Err(WireError::ConnectionClosed) => return,
            Err(e) => {
                // A malformed frame leaves no id to correlate an error
                // response to; drop the connection.
                tracing::warn!(error = %e, "dropping connection on protocol error");
                return;
            }
        };

        tracing::trace!(id = request.id, command = %request.command, "request");
        let out = dispatch(&registry, request).await;

        if let Err(e) = transport.send_response(&out.response).await {
            tracing::warn!(error = %e, "failed to write response");
            return;
        }

        if out.shutdown {
            // Response is flushed; now stop the accept loop. notify_one
            // stores a permit in case the accept loop is mid-poll.
            shutdown.notify_one();
            return;
        }
    }
}
