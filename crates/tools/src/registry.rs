use crate::stats::{StatsSnapshot, ToolStats};
use crate::traits::Tool;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

struct Registered {
    tool: Arc<dyn Tool>,
    stats: Arc<ToolStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub enabled: bool,
    pub statistics: StatsSnapshot,
}

/// Name-keyed tool table. Each tool carries its own statistics.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(
            tool.name().to_string(),
            Registered {
                tool,
                stats: Arc::new(ToolStats::new()),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|r| Arc::clone(&r.tool))
    }

    pub fn stats(&self, name: &str) -> Option<Arc<ToolStats>> {
        self.tools.get(name).map(|r| Arc::clone(&r.stats))
    }

    /// Sorted tool names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// True when `name` is enabled and passes the `allowed` filter (an empty
    /// filter admits everything).
    pub fn is_available(&self, name: &str, allowed: &[String]) -> bool {
        let admitted = allowed.is_empty() || allowed.iter().any(|a| a == name);
        admitted
            && self
                .tools
                .get(name)
                .map(|r| r.tool.config().enabled)
                .unwrap_or(false)
    }

    /// `{name, description, parameters}` per available tool, sorted by name.
    pub fn function_specs(&self, allowed: &[String]) -> Vec<Value> {
        self.list()
            .into_iter()
            .filter(|name| self.is_available(name, allowed))
            .filter_map(|name| self.get(&name))
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.schema()
                })
            })
            .collect()
    }

    /// Function specs wrapped in the `{"type": "function", ...}` envelope
    /// chat-completion APIs expect.
    pub fn schemas(&self, allowed: &[String]) -> Vec<Value> {
        self.function_specs(allowed)
            .into_iter()
            .map(|spec| json!({"type": "function", "function": spec}))
            .collect()
    }

    pub fn available_tools(&self) -> Vec<ToolInfo> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(&name))
            .map(|r| {
                let enabled = r.tool.config().enabled;
                ToolInfo {
                    name: r.tool.name().to_string(),
                    description: r.tool.description().to_string(),
                    schema: r.tool.schema(),
                    enabled,
                    statistics: r.stats.snapshot(r.tool.name(), enabled),
                }
            })
            .collect()
    }

    pub fn statistics(&self) -> Vec<StatsSnapshot> {
        self.available_tools().into_iter().map(|t| t.statistics).collect()
    }

    pub fn reset_statistics(&self, name: &str) -> bool {
        match self.tools.get(name) {
            Some(r) => {
                r.stats.reset();
                tracing::info!(tool = %name, "Reset tool statistics");
                true
            }
            None => false,
        }
    }

    pub async fn shutdown_all(&self) {
        for name in self.list() {
            if let Some(tool) = self.get(&name) {
                tool.shutdown().await;
            }
        }
    }
}
