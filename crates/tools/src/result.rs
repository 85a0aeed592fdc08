use crate::error::{ErrorKind, ToolError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Outcome of one tool invocation.
///
/// Fields are private so a result is always built whole: either a payload
/// without an error, or an error without a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    success: bool,
    result: Option<Value>,
    error: Option<String>,
    /// Seconds.
    execution_time: f64,
    metadata: Map<String, Value>,
    #[serde(skip)]
    kind: Option<ErrorKind>,
}

impl ToolResult {
    pub fn ok(result: Value, elapsed: Duration, metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            execution_time: elapsed.as_secs_f64(),
            metadata,
            kind: None,
        }
    }

    /// Tags the metadata with `error_kind` and, for denials, `deny_reason`.
    pub fn failed(err: &ToolError, elapsed: Duration, mut metadata: Map<String, Value>) -> Self {
        let kind = err.kind();
        metadata.insert("error_kind".into(), Value::String(kind.as_str().into()));
        if let Some(reason) = err.deny_reason() {
            metadata.insert("deny_reason".into(), Value::String(reason.as_str().into()));
        }
        Self {
            success: false,
            result: None,
            error: Some(err.to_string()),
            execution_time: elapsed.as_secs_f64(),
            metadata,
            kind: Some(kind),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn execution_time(&self) -> f64 {
        self.execution_time
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    pub fn deny_reason(&self) -> Option<&str> {
        self.metadata.get("deny_reason").and_then(Value::as_str)
    }

    /// Wire form: `{success, result, error, execution_time, metadata}`.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
