use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every tool. Embedded (flattened) in each tool's own
/// config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub enabled: bool,
    pub max_execution_time_ms: u64,
    pub retry_attempts: u32,
    pub safe_mode: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_execution_time_ms: 30_000,
            retry_attempts: 0,
            safe_mode: true,
        }
    }
}

impl ToolConfig {
    pub fn max_execution_time(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }
}
