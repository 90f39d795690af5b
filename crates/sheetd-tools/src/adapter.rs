//! Ties validation to forwarding: parse locally, forward through the
//! supervised channel, shape the outcome into the uniform envelope.

use std::sync::Arc;

use serde_json::Value;

use sheetd_client::Forwarder;

use crate::action::ToolAction;
use crate::envelope::ToolEnvelope;
use crate::ToolError;

/// Executes tool calls against the worker.
pub struct ToolAdapter {
    forwarder: Arc<Forwarder>,
}

impl ToolAdapter {
    pub fn new(forwarder: Arc<Forwarder>) -> Self {
        Self { forwarder }
    }

    /// Run one tool call. Parameter problems are resolved here without a
    /// transport round-trip; everything else is forwarded.
    pub async fn run(&self, action: &str, params: &Value) -> ToolEnvelope {
        let parsed = match ToolAction::parse(action, params) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(action, error = %e, "rejected before forwarding");
                return ToolEnvelope::failure(&e);
            }
        };

        match self
            .forwarder
            .call(
                parsed.command(),
                parsed.session(),
                &parsed.args(),
                parsed.timeout(),
            )
            .await
        {
            Ok(result) => ToolEnvelope::success(result),
            Err(e) => ToolEnvelope::failure(&ToolError::Core(e)),
        }
    }
}
