//! Supervisor and forwarder tests against an in-process worker.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use sheetd_client::{
    ClientConfig, CommandClient, Forwarder, Launch, SupervisorConfig, WorkerSupervisor,
};
use sheetd_core::engine::{EngineDocument, WorkbookEngine};
use sheetd_core::scratch::ScratchEngine;
use sheetd_core::{Result as CoreResult, SessionRegistry, TimeoutPolicy};
use tokio::process::Child;

/// Reserve a free loopback port.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Hosts the worker inside the test process, counting launch attempts.
struct InProcessLauncher {
    port: u16,
    launches: Arc<AtomicUsize>,
    engine: Arc<dyn WorkbookEngine>,
}

impl Launch for InProcessLauncher {
    fn launch(&self) -> CoreResult<Option<Child>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let port = self.port;
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            let registry = Arc::new(SessionRegistry::new(engine, TimeoutPolicy::default()));
            let _ = sheetd_worker::serve(listener, registry).await;
        });
        Ok(None)
    }
}

/// Counts launch attempts but never actually starts anything.
struct DeadLauncher {
    launches: Arc<AtomicUsize>,
}

impl Launch for DeadLauncher {
    fn launch(&self) -> CoreResult<Option<Child>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

fn test_config(port: u16) -> SupervisorConfig {
    SupervisorConfig {
        port,
        startup_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
        ..SupervisorConfig::default()
    }
}

fn supervisor_with_scratch(port: u16) -> (Arc<WorkerSupervisor>, Arc<AtomicUsize>) {
    supervisor_with_engine(port, Arc::new(ScratchEngine))
}

fn supervisor_with_engine(
    port: u16,
    engine: Arc<dyn WorkbookEngine>,
) -> (Arc<WorkerSupervisor>, Arc<AtomicUsize>) {
    let launches = Arc::new(AtomicUsize::new(0));
    let launcher = InProcessLauncher {
        port,
        launches: launches.clone(),
        engine,
    };
    let supervisor = Arc::new(WorkerSupervisor::new(test_config(port), Box::new(launcher)));
    (supervisor, launches)
}

fn forwarder(port: u16, supervisor: Arc<WorkerSupervisor>) -> Forwarder {
    let client = CommandClient::new(ClientConfig {
        port,
        ..ClientConfig::default()
    });
    Forwarder::new(supervisor, client)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_ensure_running_spawns_exactly_once() {
    let port = free_port();
    let (supervisor, launches) = supervisor_with_scratch(port);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let supervisor = supervisor.clone();
        tasks.push(tokio::spawn(
            async move { supervisor.ensure_running().await },
        ));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }

    assert_eq!(launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ensure_running_skips_spawn_when_worker_is_live() {
    let port = free_port();
    let (supervisor, launches) = supervisor_with_scratch(port);

    // First call starts the worker; second finds it responsive.
    assert!(supervisor.ensure_running().await.unwrap());
    assert!(supervisor.ensure_running().await.unwrap());
    assert_eq!(launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn spawn_failure_is_reported_not_retried() {
    let port = free_port();
    let supervisor = WorkerSupervisor::with_executable(
        test_config(port),
        "/nonexistent/sheetd-worker".into(),
    );

    let err = supervisor.ensure_running().await.unwrap_err();
    assert_eq!(err.wire_kind(), "transport");
}

#[tokio::test]
async fn unconfirmed_worker_yields_false_and_is_retryable() {
    let port = free_port();
    let launches = Arc::new(AtomicUsize::new(0));
    let supervisor = WorkerSupervisor::new(
        SupervisorConfig {
            port,
            startup_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            ..SupervisorConfig::default()
        },
        Box::new(DeadLauncher {
            launches: launches.clone(),
        }),
    );

    assert!(!supervisor.ensure_running().await.unwrap());
    assert_eq!(launches.load(Ordering::SeqCst), 1);

    // The next call is a fresh attempt.
    assert!(!supervisor.ensure_running().await.unwrap());
    assert_eq!(launches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn forwarder_starts_worker_on_first_transport_failure() {
    let port = free_port();
    let (supervisor, launches) = supervisor_with_scratch(port);
    let fwd = forwarder(port, supervisor);

    // No worker running yet: the first send fails, the forwarder
    // supervises and retries once.
    let pong = fwd.ping().await.unwrap();
    assert_eq!(pong["pong"], json!(true));
    assert_eq!(launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forwarder_begin_commit_list_round_trip() {
    let port = free_port();
    let (supervisor, _) = supervisor_with_scratch(port);
    let fwd = forwarder(port, supervisor);

    let file = tempfile::NamedTempFile::new().unwrap();
    let begun = fwd.begin(file.path()).await.unwrap();
    assert!(begun.session.starts_with("b-"));

    let listed = fwd.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, begun.session);

    let summary = fwd.commit(&begun.session, true, None).await.unwrap();
    assert!(summary.saved);

    assert!(fwd.list().await.unwrap().is_empty());

    let err = fwd.commit(&begun.session, true, None).await.unwrap_err();
    assert_eq!(err.wire_kind(), "not-found");
}

#[tokio::test]
async fn conflict_surfaces_through_the_forwarder() {
    let port = free_port();
    let (supervisor, _) = supervisor_with_scratch(port);
    let fwd = forwarder(port, supervisor);

    let file = tempfile::NamedTempFile::new().unwrap();
    let begun = fwd.begin(file.path()).await.unwrap();

    let err = fwd.begin(file.path()).await.unwrap_err();
    assert_eq!(err.wire_kind(), "conflict");

    fwd.commit(&begun.session, false, None).await.unwrap();
    fwd.begin(file.path()).await.unwrap();
}

struct SlowSaveEngine;

#[derive(Debug)]
struct SlowSaveDoc;

impl WorkbookEngine for SlowSaveEngine {
    fn open(&self, _path: &Path) -> CoreResult<Box<dyn EngineDocument>> {
        Ok(Box::new(SlowSaveDoc))
    }
}

impl EngineDocument for SlowSaveDoc {
    fn execute(&mut self, _command: &str, args: &serde_json::Value) -> CoreResult<serde_json::Value> {
        Ok(args.clone())
    }

    fn save(&mut self) -> CoreResult<()> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn save_timeout_is_classified_and_session_released() {
    let port = free_port();
    let (supervisor, _) = supervisor_with_engine(port, Arc::new(SlowSaveEngine));
    let fwd = forwarder(port, supervisor);

    let file = tempfile::NamedTempFile::new().unwrap();
    let begun = fwd.begin(file.path()).await.unwrap();

    let err = fwd
        .commit(&begun.session, true, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(err.wire_kind(), "timeout");

    // The session's resources were released despite the failed save.
    assert!(fwd.list().await.unwrap().is_empty());
}
