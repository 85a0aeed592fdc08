use crate::engine::ToolEngine;
use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::result::ToolResult;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Looks tools up by name and runs them through the engine.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    engine: ToolEngine,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, engine: ToolEngine) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run `name` unless it is unknown or filtered out by `allowed` (empty
    /// admits every registered tool). Unknown names yield a
    /// `validation_failed` result rather than an error.
    pub async fn dispatch(&self, name: &str, params: Value, allowed: &[String]) -> ToolResult {
        let admitted = allowed.is_empty() || allowed.iter().any(|a| a == name);
        let found = self
            .registry
            .get(name)
            .zip(self.registry.stats(name))
            .filter(|_| admitted);

        match found {
            Some((tool, stats)) => self.engine.execute(&tool, &stats, params).await,
            None => {
                warn!(tool = %name, "Requested tool is not available");
                let err = ToolError::Validation(format!("Unknown or disallowed tool: {}", name));
                let mut meta = Map::new();
                meta.insert("tool_name".into(), Value::String(name.to_string()));
                meta.insert("parameters".into(), params);
                meta.insert("timestamp".into(), Value::String(chrono::Utc::now().to_rfc3339()));
                ToolResult::failed(&err, Duration::ZERO, meta)
            }
        }
    }
}
