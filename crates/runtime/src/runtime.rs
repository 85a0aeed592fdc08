//! Explicitly constructed runtime instance: owns the tool registry, the
//! session store and the completion client.

use crate::agent_loop::{LoopOutcome, ToolLoop};
use crate::config::RuntimeConfig;
use crate::interfaces::{CompletionClient, RuntimeError};
use crate::llm_client::OpenAIClient;
use crate::session::{SessionInfo, SessionStore, SessionSummary};
use crate::types::Message;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolwarden_policy::AllowedPaths;
use toolwarden_tools::{
    ExponentialBackoff, FileSystemTool, RetryStrategy, StatsSnapshot, Tool, ToolDispatcher,
    ToolEngine, ToolInfo, ToolRegistry, ToolResult, WebSearchTool,
};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatistics {
    pub tools: Vec<StatsSnapshot>,
    pub sessions: SessionSummary,
    pub tools_available: usize,
    pub tools_enabled: usize,
}

pub struct ToolRuntime {
    config: RuntimeConfig,
    dispatcher: ToolDispatcher,
    sessions: Arc<SessionStore>,
    client: Arc<dyn CompletionClient>,
    allowed_paths: Option<AllowedPaths>,
}

impl ToolRuntime {
    /// Runtime with both built-in tools and an OpenAI-compatible client.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ToolRuntimeBuilder {
        ToolRuntimeBuilder::default()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Allowlist handle of the built-in filesystem tool, if registered.
    pub fn allowed_paths(&self) -> Option<&AllowedPaths> {
        self.allowed_paths.as_ref()
    }

    /// Run the tool-calling loop over `messages`.
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        session_id: Option<&str>,
    ) -> Result<LoopOutcome, RuntimeError> {
        ToolLoop::new(
            Arc::clone(&self.client),
            self.dispatcher.clone(),
            Arc::clone(&self.sessions),
            self.config.allowed_tools.clone(),
            self.config.max_iterations,
        )
        .with_system_prompt(self.config.inject_system_prompt)
        .run(messages, session_id)
        .await
    }

    /// Invoke a registered tool directly. Returns the session id the call
    /// was recorded under together with the result.
    pub async fn execute_tool(
        &self,
        name: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> (String, ToolResult) {
        let session_id = self.sessions.get_or_create(session_id);
        let result = self.dispatcher.dispatch(name, params.clone(), &[]).await;
        self.sessions.record(&session_id, name, params, result.clone());
        (session_id, result)
    }

    pub fn available_tools(&self) -> Vec<ToolInfo> {
        self.registry().available_tools()
    }

    pub fn statistics(&self) -> RuntimeStatistics {
        let tools = self.registry().statistics();
        let tools_enabled = tools.iter().filter(|t| t.enabled).count();
        RuntimeStatistics {
            tools_available: tools.len(),
            tools_enabled,
            tools,
            sessions: self.sessions.summary(self.config.active_session_window()),
        }
    }

    pub fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.info(session_id)
    }

    /// Remove sessions idle longer than `max_age`; returns how many.
    pub fn sweep_sessions(&self, max_age: Duration) -> usize {
        self.sessions.sweep(max_age)
    }

    /// Release tool resources such as watchers and caches.
    pub async fn shutdown(&self) {
        info!("Shutting down tool runtime");
        self.registry().shutdown_all().await;
    }
}

#[derive(Default)]
pub struct ToolRuntimeBuilder {
    config: Option<RuntimeConfig>,
    tools: Vec<Arc<dyn Tool>>,
    retry: Option<Arc<dyn RetryStrategy>>,
    client: Option<Arc<dyn CompletionClient>>,
    base_dir: Option<PathBuf>,
    skip_builtin: bool,
}

impl ToolRuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an extra tool. A tool with a built-in name replaces it.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn retry_strategy(mut self, retry: Arc<dyn RetryStrategy>) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Directory relative filesystem paths resolve against. Defaults to the
    /// process working directory.
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn without_builtin_tools(mut self) -> Self {
        self.skip_builtin = true;
        self
    }

    pub fn build(self) -> Result<ToolRuntime, RuntimeError> {
        let config = self.config.unwrap_or_default();
        let mut registry = ToolRegistry::new();
        let mut allowed_paths = None;

        if !self.skip_builtin {
            let base_dir = match self.base_dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let file_system = FileSystemTool::with_base_dir(config.file_system.clone(), base_dir);
            allowed_paths = Some(file_system.allowed_paths());
            let web_search = WebSearchTool::new(config.web_search.clone())
                .map_err(|e| RuntimeError::Config(format!("web_search: {}", e)))?;
            registry.register(Arc::new(file_system));
            registry.register(Arc::new(web_search));
        }
        for tool in self.tools {
            registry.register(tool);
        }

        let retry = self
            .retry
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::default()));
        let dispatcher = ToolDispatcher::new(Arc::new(registry), ToolEngine::new(retry));
        let client = match self.client {
            Some(client) => client,
            None => Arc::new(OpenAIClient::from_config(&config.completion)),
        };

        info!(
            tools = dispatcher.registry().count(),
            max_iterations = config.max_iterations,
            "Tool runtime ready"
        );

        Ok(ToolRuntime {
            config,
            dispatcher,
            sessions: Arc::new(SessionStore::new()),
            client,
            allowed_paths,
        })
    }
}
