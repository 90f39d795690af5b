//! Maps wire requests onto the session registry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sheetd_core::{Error, Result, SessionId, SessionRegistry};
use sheetd_protocol::{commands, Request, Response};

/// Outcome of dispatching one request.
pub(crate) struct Dispatched {
    pub response: Response,
    /// Set by `worker.shutdown`: the server should stop accepting and drain.
    pub shutdown: bool,
}

pub(crate) async fn dispatch(registry: &Arc<SessionRegistry>, request: Request) -> Dispatched {
    let id = request.id;
    let shutdown = request.command == commands::WORKER_SHUTDOWN;

    let result = handle(registry, &request).await;
    let response = match result {
        Ok(data) => Response::ok(id, data),
        Err(e) => {
            tracing::debug!(command = %request.command, error = %e, "command failed");
            Response::error(
                id,
                e.wire_kind(),
                e.wire_message(),
                e.native_code().map(str::to_string),
            )
        }
    };

    Dispatched { response, shutdown }
}

async fn handle(registry: &Arc<SessionRegistry>, request: &Request) -> Result<Option<Value>> {
    match request.command.as_str() {
        commands::WORKER_PING => Ok(Some(json!({ "pong": true, "pid": std::process::id() }))),

        commands::WORKER_SHUTDOWN => {
            tracing::info!("shutdown requested");
            Ok(None)
        }

        commands::BATCH_BEGIN => {
            let path = require_str(&request.args, &request.command, "path")?;
            let handle = registry.begin(std::path::Path::new(&path)).await?;
            Ok(Some(json!({
                "session": handle.id(),
                "path": handle.path().display().to_string(),
            })))
        }

        commands::BATCH_COMMIT => {
            let session = require_session(request)?;
            let save = request
                .args
                .get("save")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let outcome = registry.commit(&session, save, timeout_of(request)).await?;
            Ok(Some(json!({
                "path": outcome.path.display().to_string(),
                "saved": outcome.saved,
            })))
        }

        commands::BATCH_LIST => {
            let sessions = registry.list();
            Ok(Some(json!({ "sessions": sessions })))
        }

        // Everything else is a feature command executed against the
        // addressed session's engine document.
        _ => {
            let session = require_session(request)?;
            let handle = registry.get(&session)?;
            let budget = registry.timeouts().command_budget(timeout_of(request));
            let result = handle
                .execute(&request.command, &request.args, budget)
                .await?;
            if result.is_null() {
                Ok(None)
            } else {
                Ok(Some(result))
            }
        }
    }
}

fn require_session(request: &Request) -> Result<SessionId> {
    request
        .session
        .as_deref()
        .map(SessionId::from)
        .ok_or_else(|| Error::missing_parameter(request.command.clone(), "session"))
}

fn require_str(args: &Value, action: &str, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::missing_parameter(action, key))
}

fn timeout_of(request: &Request) -> Option<Duration> {
    request.timeout_ms.map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetd_core::scratch::ScratchEngine;
    use sheetd_core::TimeoutPolicy;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(ScratchEngine),
            TimeoutPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn ping_needs_no_session() {
        let reg = registry();
        let out = dispatch(&reg, Request::new(1, commands::WORKER_PING)).await;
        assert!(out.response.is_ok());
        assert!(!out.shutdown);
    }

    #[tokio::test]
    async fn begin_without_path_is_missing_parameter() {
        let reg = registry();
        let out = dispatch(&reg, Request::new(2, commands::BATCH_BEGIN)).await;
        match out.response.outcome {
            sheetd_protocol::Outcome::Error { kind, .. } => {
                assert_eq!(kind, "missing-parameter")
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn feature_command_without_session_is_missing_parameter() {
        let reg = registry();
        let out = dispatch(&reg, Request::new(3, "table.sort")).await;
        match out.response.outcome {
            sheetd_protocol::Outcome::Error { kind, message, .. } => {
                assert_eq!(kind, "missing-parameter");
                assert!(message.contains("table.sort"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn feature_command_with_unknown_session_is_not_found() {
        let reg = registry();
        let req = Request::new(4, "range.get-values").with_session("b-missing");
        let out = dispatch(&reg, req).await;
        match out.response.outcome {
            sheetd_protocol::Outcome::Error { kind, .. } => assert_eq!(kind, "not-found"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_flag_is_set() {
        let reg = registry();
        let out = dispatch(&reg, Request::new(5, commands::WORKER_SHUTDOWN)).await;
        assert!(out.response.is_ok());
        assert!(out.shutdown);
    }
}
