//! Worker process supervision: ensure exactly one live worker, starting it
//! on demand.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;

use sheetd_core::{Error, Result};

use crate::channel::{ClientConfig, CommandClient};

/// Observed liveness of the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    /// Never spawned by this supervisor and not answering pings.
    NotStarted,
    /// Spawned but not yet confirmed responsive.
    Starting,
    /// Answering pings.
    Running,
    /// Spawned, still alive, but not answering pings.
    Unresponsive,
    /// Spawned and observed to have exited.
    Crashed,
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub host: String,
    pub port: u16,
    /// Bound on waiting for a freshly spawned worker to answer its first
    /// ping.
    pub startup_timeout: Duration,
    /// Bound on a single liveness probe.
    pub probe_timeout: Duration,
    /// Delay between connect attempts while the worker starts up.
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: sheetd_protocol::DEFAULT_PORT,
            startup_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// How the supervisor actually starts a worker. Abstracted so tests can
/// host the worker in-process and count launch attempts.
pub trait Launch: Send + Sync {
    /// Start the worker. Returns the child process handle when one exists;
    /// in-process launchers return `None`.
    fn launch(&self) -> Result<Option<Child>>;
}

/// Spawns the `sheetd-worker` executable.
pub struct ProcessLauncher {
    pub executable: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Launch for ProcessLauncher {
    fn launch(&self) -> Result<Option<Child>> {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--host")
            .arg(&self.host)
            .arg("--port")
            .arg(self.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            // Worker diagnostics go to our stderr.
            .stderr(Stdio::inherit());

        tracing::info!(executable = %self.executable.display(), port = self.port, "starting worker");
        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::transport(format!(
                    "worker executable not found at {}",
                    self.executable.display()
                ))
            } else {
                Error::transport(format!("failed to spawn worker: {e}"))
            }
        })?;
        Ok(Some(child))
    }
}

struct State {
    child: Option<Child>,
    spawned: bool,
}

/// Guarantees a single running worker process.
///
/// The spawn path is serialized by an async mutex, so K concurrent
/// `ensure_running` calls collapse into one spawn attempt; late arrivals
/// find the worker already responsive and return immediately.
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    launcher: Box<dyn Launch>,
    probe: CommandClient,
    state: Mutex<State>,
}

impl WorkerSupervisor {
    pub fn new(config: SupervisorConfig, launcher: Box<dyn Launch>) -> Self {
        let probe = CommandClient::new(ClientConfig {
            host: config.host.clone(),
            port: config.port,
            ..ClientConfig::default()
        });
        Self {
            config,
            launcher,
            probe,
            state: Mutex::new(State {
                child: None,
                spawned: false,
            }),
        }
    }

    /// Supervisor over the `sheetd-worker` executable at `executable`.
    pub fn with_executable(config: SupervisorConfig, executable: PathBuf) -> Self {
        let launcher = ProcessLauncher {
            executable,
            host: config.host.clone(),
            port: config.port,
        };
        Self::new(config, Box::new(launcher))
    }

    /// Confirm a live worker, spawning one if needed.
    ///
    /// Returns `true` once the worker answers a ping. Returns `false` if a
    /// freshly spawned worker could not be confirmed within the startup
    /// bound (retryable on the next call). Spawn failures are errors and
    /// are not retried here.
    pub async fn ensure_running(&self) -> Result<bool> {
        let mut state = self.state.lock().await;

        if self.probe().await {
            return Ok(true);
        }

        // A previously spawned worker that stopped answering: reap it if it
        // exited so the spawn below is a restart, not a duplicate.
        if let Some(child) = state.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::warn!(%status, "worker exited, restarting");
                    state.child = None;
                }
                Ok(None) => {
                    tracing::warn!("worker alive but unresponsive");
                    return Ok(false);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot check worker status");
                    state.child = None;
                }
            }
        }

        state.child = self.launcher.launch()?;
        state.spawned = true;

        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;
        loop {
            if self.probe().await {
                tracing::info!("worker confirmed live");
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    timeout = ?self.config.startup_timeout,
                    "worker did not become responsive"
                );
                return Ok(false);
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Snapshot of the worker's liveness as seen from here.
    pub async fn health(&self) -> WorkerHealth {
        if self.probe().await {
            return WorkerHealth::Running;
        }
        let mut state = self.state.lock().await;
        if !state.spawned {
            return WorkerHealth::NotStarted;
        }
        match state.child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(_))) => WorkerHealth::Crashed,
            Some(Ok(None)) => WorkerHealth::Unresponsive,
            Some(Err(_)) => WorkerHealth::Unresponsive,
            None => WorkerHealth::Starting,
        }
    }

    async fn probe(&self) -> bool {
        let live = self.probe.ping(self.config.probe_timeout).await;
        if !live {
            self.probe.disconnect().await;
        }
        live
    }
}
