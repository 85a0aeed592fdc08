//! Tool-calling loop - drives the completion client and folds tool results
//! back into the conversation until the model answers or the bound is hit.

use crate::interfaces::{CompletionClient, RuntimeError};
use crate::session::SessionStore;
use crate::types::{CompletionResponse, Message, Role, ToolCallRequest};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use toolwarden_tools::{ToolDispatcher, ToolError, ToolResult};
use tracing::{debug, error, info, warn};

const ITERATION_LIMIT_RESPONSE: &str =
    "I encountered an issue while processing your request with tools.";

/// How a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Completed,
    IterationLimitReached,
}

/// A tool call made during the loop, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallOutcome {
    pub tool: String,
    pub arguments: Value,
    pub result: ToolResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopOutcome {
    pub response: String,
    pub tool_calls: Vec<ToolCallOutcome>,
    pub iterations: usize,
    pub session_id: String,
    pub status: LoopStatus,
    pub total_tools_available: usize,
}

/// Bounded reason-then-act loop.
///
/// Every tool call counts as one iteration. Calls listed in a single reply
/// run sequentially in the order given, so a later call sees the effects of
/// an earlier one.
pub struct ToolLoop {
    client: Arc<dyn CompletionClient>,
    dispatcher: ToolDispatcher,
    sessions: Arc<SessionStore>,
    allowed_tools: Vec<String>,
    max_iterations: usize,
    inject_system_prompt: bool,
}

impl ToolLoop {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        dispatcher: ToolDispatcher,
        sessions: Arc<SessionStore>,
        allowed_tools: Vec<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            client,
            dispatcher,
            sessions,
            allowed_tools,
            max_iterations,
            inject_system_prompt: true,
        }
    }

    pub fn with_system_prompt(mut self, inject: bool) -> Self {
        self.inject_system_prompt = inject;
        self
    }

    /// Run the loop over `messages`.
    ///
    /// Tool failures never abort the run; they are handed back to the model as
    /// tool output. Only a failing completion client yields an error.
    pub async fn run(
        &self,
        messages: Vec<Message>,
        session_id: Option<&str>,
    ) -> Result<LoopOutcome, RuntimeError> {
        let session_id = self.sessions.get_or_create(session_id);
        let registry = self.dispatcher.registry();
        let specs = registry.function_specs(&self.allowed_tools);
        let schemas = registry.schemas(&self.allowed_tools);

        let mut conversation = messages;
        if self.inject_system_prompt
            && !specs.is_empty()
            && !conversation.iter().any(|m| m.role == Role::System)
        {
            conversation.insert(0, Message::system(system_prompt(&specs)));
        }

        info!(
            session = %session_id,
            tools = specs.len(),
            max_iterations = self.max_iterations,
            "Starting tool loop"
        );

        let mut iterations = 0;
        let mut tool_calls = Vec::new();
        let mut last_text: Option<String> = None;

        while iterations < self.max_iterations {
            debug!(session = %session_id, iterations, "Requesting completion");

            let reply = self
                .client
                .complete(&conversation, &schemas)
                .await
                .map_err(|e| {
                    error!(session = %session_id, "Completion failed: {}", e);
                    e
                })?;

            let (content, calls) = match reply {
                CompletionResponse::Final { content } => {
                    info!(session = %session_id, iterations, "Tool loop completed");
                    return Ok(LoopOutcome {
                        response: content,
                        tool_calls,
                        iterations,
                        session_id,
                        status: LoopStatus::Completed,
                        total_tools_available: specs.len(),
                    });
                }
                CompletionResponse::ToolCalls { content, calls } if calls.is_empty() => {
                    info!(session = %session_id, iterations, "Reply carried no tool calls, completing");
                    return Ok(LoopOutcome {
                        response: content.or(last_text).unwrap_or_default(),
                        tool_calls,
                        iterations,
                        session_id,
                        status: LoopStatus::Completed,
                        total_tools_available: specs.len(),
                    });
                }
                CompletionResponse::ToolCalls { content, calls } => (content, calls),
            };

            if content.is_some() {
                last_text = content.clone();
            }
            conversation.push(Message::assistant_tool_calls(content, calls.clone()));

            let mut skip_reason: Option<&str> = None;
            for call in &calls {
                if skip_reason.is_none() && iterations >= self.max_iterations {
                    skip_reason = Some("iteration limit reached");
                }
                if let Some(reason) = skip_reason {
                    debug!(tool = %call.name, reason, "Skipping tool call");
                    conversation.push(Message::tool_result(&call.id, skipped(reason)));
                    continue;
                }

                iterations += 1;
                let (arguments, result, malformed) = self.execute_call(call, &session_id).await;
                conversation.push(Message::tool_result(&call.id, result.to_json().to_string()));
                self.sessions
                    .record(&session_id, &call.name, arguments.clone(), result.clone());
                tool_calls.push(ToolCallOutcome {
                    tool: call.name.clone(),
                    arguments,
                    result,
                });

                if malformed {
                    skip_reason = Some("previous call had malformed arguments");
                }
            }
        }

        warn!(
            session = %session_id,
            iterations,
            "Tool loop stopped at iteration limit"
        );
        crate::metrics::increment_iteration_limit();

        Ok(LoopOutcome {
            response: last_text.unwrap_or_else(|| ITERATION_LIMIT_RESPONSE.to_string()),
            tool_calls,
            iterations,
            session_id,
            status: LoopStatus::IterationLimitReached,
            total_tools_available: specs.len(),
        })
    }

    /// Returns the parsed arguments, the result and whether the arguments
    /// were malformed.
    async fn execute_call(&self, call: &ToolCallRequest, session_id: &str) -> (Value, ToolResult, bool) {
        let arguments = if call.arguments.trim().is_empty() {
            Ok(Value::Object(Map::new()))
        } else {
            serde_json::from_str::<Value>(&call.arguments)
        };

        match arguments {
            Ok(arguments) => {
                info!(session = %session_id, tool = %call.name, "Executing requested tool");
                let result = self
                    .dispatcher
                    .dispatch(&call.name, arguments.clone(), &self.allowed_tools)
                    .await;
                (arguments, result, false)
            }
            Err(e) => {
                warn!(
                    session = %session_id,
                    tool = %call.name,
                    "Malformed tool arguments: {}",
                    e
                );
                let err = ToolError::Validation(format!(
                    "Invalid JSON arguments for tool {}: {}",
                    call.name, e
                ));
                let raw = Value::String(call.arguments.clone());
                let mut meta = Map::new();
                meta.insert("tool_name".into(), Value::String(call.name.clone()));
                meta.insert("parameters".into(), raw.clone());
                meta.insert("timestamp".into(), Value::String(chrono::Utc::now().to_rfc3339()));
                (raw, ToolResult::failed(&err, Duration::ZERO, meta), true)
            }
        }
    }
}

fn skipped(reason: &str) -> String {
    json!({
        "success": false,
        "result": null,
        "error": format!("Tool call skipped: {}", reason),
        "execution_time": 0.0,
        "metadata": {"skipped": true},
    })
    .to_string()
}

/// System instruction listing every offered tool as `- name: description`.
pub fn system_prompt(specs: &[Value]) -> String {
    let listing: Vec<String> = specs
        .iter()
        .filter_map(|spec| {
            let name = spec.get("name")?.as_str()?;
            let description = spec.get("description").and_then(Value::as_str).unwrap_or("");
            Some(format!("- {}: {}", name, description))
        })
        .collect();

    format!(
        "You are a helpful AI assistant with access to the following tools:\n\n{}\n\n\
         Call a tool whenever it helps answer the request. Tool results come back as \
         JSON; if a call fails, read the error and decide how to recover. When you have \
         enough information, answer in plain text.",
        listing.join("\n")
    )
}
