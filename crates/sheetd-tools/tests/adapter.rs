//! Tool adapter tests against an in-process worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use sheetd_client::{
    ClientConfig, CommandClient, Forwarder, Launch, SupervisorConfig, WorkerSupervisor,
};
use sheetd_core::scratch::ScratchEngine;
use sheetd_core::{Result as CoreResult, SessionRegistry, TimeoutPolicy};
use sheetd_tools::ToolAdapter;
use tokio::process::Child;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct InProcessLauncher {
    port: u16,
    launches: Arc<AtomicUsize>,
}

impl Launch for InProcessLauncher {
    fn launch(&self) -> CoreResult<Option<Child>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let port = self.port;
        tokio::spawn(async move {
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            let registry = Arc::new(SessionRegistry::new(
                Arc::new(ScratchEngine),
                TimeoutPolicy::default(),
            ));
            let _ = sheetd_worker::serve(listener, registry).await;
        });
        Ok(None)
    }
}

fn adapter(port: u16) -> (ToolAdapter, Arc<AtomicUsize>) {
    let launches = Arc::new(AtomicUsize::new(0));
    let supervisor = Arc::new(WorkerSupervisor::new(
        SupervisorConfig {
            port,
            startup_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            ..SupervisorConfig::default()
        },
        Box::new(InProcessLauncher {
            port,
            launches: launches.clone(),
        }),
    ));
    let client = CommandClient::new(ClientConfig {
        port,
        ..ClientConfig::default()
    });
    let forwarder = Arc::new(Forwarder::new(supervisor, client));
    (ToolAdapter::new(forwarder), launches)
}

#[tokio::test]
async fn begin_info_commit_happy_path() {
    let (adapter, _) = adapter(free_port());
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), b"cells").unwrap();

    let begun = adapter
        .run("batch.begin", &json!({"path": file.path()}))
        .await;
    assert!(begun.success && !begun.is_error);
    let session = begun.result.as_ref().unwrap()["session"]
        .as_str()
        .unwrap()
        .to_string();

    let info = adapter
        .run("workbook.info", &json!({"session": session}))
        .await;
    assert!(info.success);
    assert_eq!(info.result.as_ref().unwrap()["size"], json!(5));

    let committed = adapter
        .run("batch.commit", &json!({"session": session, "save": false}))
        .await;
    assert!(committed.success);
    assert_eq!(committed.result.as_ref().unwrap()["saved"], json!(false));
}

#[tokio::test]
async fn missing_parameter_fails_fast_without_forwarding() {
    // No worker, and a launcher that would record any attempt to start one.
    let (adapter, launches) = adapter(free_port());

    let envelope = adapter.run("batch.begin", &Value::Null).await;
    assert!(!envelope.success);
    assert!(envelope.is_error);
    assert_eq!(envelope.exception_type.as_deref(), Some("missing-parameter"));
    assert!(envelope
        .error_message
        .as_ref()
        .unwrap()
        .contains("batch.begin"));

    // The validation failure never touched the supervisor.
    assert_eq!(launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_action_is_rejected_locally() {
    let (adapter, launches) = adapter(free_port());
    let envelope = adapter.run("vba.run-macro", &json!({"session": "b-1"})).await;
    assert!(envelope.is_error);
    assert_eq!(envelope.exception_type.as_deref(), Some("unknown-action"));
    assert_eq!(launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn forwarded_errors_share_the_envelope_shape() {
    let (adapter, _) = adapter(free_port());

    // not-found comes back from the worker; missing-parameter is produced
    // locally. Both envelopes must be structurally identical.
    let remote = adapter
        .run("workbook.info", &json!({"session": "b-unknown"}))
        .await;
    assert!(!remote.success && remote.is_error);
    assert_eq!(remote.exception_type.as_deref(), Some("not-found"));

    let local = adapter.run("workbook.info", &Value::Null).await;
    assert!(!local.success && local.is_error);
    assert_eq!(local.exception_type.as_deref(), Some("missing-parameter"));

    for envelope in [&remote, &local] {
        let v = serde_json::to_value(envelope).unwrap();
        assert!(v["errorMessage"].is_string());
        assert_eq!(v["isError"], json!(true));
        assert_eq!(v["success"], json!(false));
    }
}

#[tokio::test]
async fn engine_rejection_carries_engine_kind() {
    let (adapter, _) = adapter(free_port());
    let file = tempfile::NamedTempFile::new().unwrap();

    let begun = adapter
        .run("batch.begin", &json!({"path": file.path()}))
        .await;
    let session = begun.result.as_ref().unwrap()["session"]
        .as_str()
        .unwrap()
        .to_string();

    // The scratch engine supports none of the feature commands.
    let envelope = adapter
        .run(
            "worksheet.add",
            &json!({"session": session, "name": "Data"}),
        )
        .await;
    assert!(envelope.is_error);
    assert_eq!(envelope.exception_type.as_deref(), Some("engine"));
}
