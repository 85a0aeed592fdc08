use crate::config::ToolConfig;
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use toolwarden_policy::PolicyViolation;

/// A capability exposed to the completion model.
///
/// Implementors only describe themselves, vet parameters and do the work;
/// timeouts, retries, statistics and result shaping belong to
/// [`ToolEngine`](crate::engine::ToolEngine).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    fn config(&self) -> ToolConfig;

    /// Policy check run before every attempt, with no side effects.
    fn check_security(&self, _params: &Value) -> Result<(), PolicyViolation> {
        Ok(())
    }

    async fn run(&self, params: Value) -> Result<Value, ToolError>;

    /// Release watchers, caches or connections.
    async fn shutdown(&self) {}
}
