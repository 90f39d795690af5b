//! The uniform result envelope returned by every tool call.
//!
//! Success and failure have the same structure on both the local and the
//! forwarded path, so callers cannot tell where a command actually ran.
//! `hresult` and `innerError` are opaque passthrough from the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(rename = "exceptionType", default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hresult: Option<String>,
    #[serde(rename = "innerError", default, skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<String>,
}

impl ToolEnvelope {
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result: if result.is_null() { None } else { Some(result) },
            error_message: None,
            is_error: false,
            exception_type: None,
            hresult: None,
            inner_error: None,
        }
    }

    pub fn failure(error: &ToolError) -> Self {
        Self {
            success: false,
            result: None,
            error_message: Some(error.to_string()),
            is_error: true,
            exception_type: Some(error.kind().to_string()),
            hresult: error.native_code().map(str::to_string),
            inner_error: None,
        }
    }
}
