//! OpenAI-compatible chat-completion client.

use crate::config::CompletionConfig;
use crate::interfaces::{CompletionClient, RuntimeError};
use crate::types::{CompletionResponse, Message, Role, ToolCallRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// OpenAI-compatible request format.
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// OpenAI-compatible response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Circuit breaker state.
struct CircuitBreaker {
    consecutive_failures: AtomicUsize,
    breaker_open: AtomicBool,
    opened_at: Mutex<Option<Instant>>,
    failure_threshold: usize,
    cooldown_duration: Duration,
}

impl CircuitBreaker {
    fn new(failure_threshold: usize, cooldown_duration: Duration) -> Self {
        Self {
            consecutive_failures: AtomicUsize::new(0),
            breaker_open: AtomicBool::new(false),
            opened_at: Mutex::new(None),
            failure_threshold,
            cooldown_duration,
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.breaker_open.store(false, Ordering::SeqCst);
        *self.opened_at.lock() = None;
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            self.breaker_open.store(true, Ordering::SeqCst);
            *self.opened_at.lock() = Some(Instant::now());
        }
    }

    fn should_allow_request(&self) -> Result<(), RuntimeError> {
        if !self.breaker_open.load(Ordering::SeqCst) {
            return Ok(());
        }

        let opened_at = self.opened_at.lock();
        if let Some(opened_time) = *opened_at {
            if opened_time.elapsed() >= self.cooldown_duration {
                // Allow trial request
                return Ok(());
            }
        }

        Err(RuntimeError::Completion(
            "Circuit breaker open: completion service unavailable".to_string(),
        ))
    }
}

/// Chat-completion client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAIClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    max_retries: u32,
    circuit_breaker: Arc<CircuitBreaker>,
    api_key: Option<String>,
}

impl OpenAIClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API, e.g. `https://api.openai.com/v1`
    /// * `model` - Model identifier sent with each request
    /// * `max_retries` - Maximum number of retries on failure
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, max_retries: u32) -> Self {
        Self::with_timeout(base_url, model, max_retries, Duration::from_secs(60))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into(),
            model: model.into(),
            client,
            max_retries,
            circuit_breaker: Arc::new(CircuitBreaker::new(5, Duration::from_secs(30))),
            api_key: None,
        }
    }

    /// Build from configuration, reading the API key from the configured
    /// environment variable when it is set.
    pub fn from_config(config: &CompletionConfig) -> Self {
        let client = Self::with_timeout(
            config.base_url.clone(),
            config.model.clone(),
            config.max_retries,
            Duration::from_secs(config.request_timeout_secs),
        );
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => client.with_api_key(key),
            _ => {
                debug!(var = %config.api_key_env, "No completion API key in environment");
                client
            }
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn retry_delay_for_error(&self, attempt: u32, err: &RuntimeError) -> Duration {
        let msg = err.to_string().to_lowercase();
        if msg.contains("rate limit") || msg.contains("429") {
            if let Some(seconds) = extract_retry_seconds(&msg) {
                return Duration::from_secs(seconds.min(90));
            }
            return Duration::from_secs((2_u64.saturating_pow(attempt + 1)).min(30));
        }
        Duration::from_millis((250_u64.saturating_mul(2_u64.saturating_pow(attempt))).min(5000))
    }

    /// Call the completion endpoint with retry logic.
    ///
    /// # Errors
    /// Returns error if all retries fail or the circuit breaker is open.
    pub async fn call(
        &self,
        messages: &[Message],
        tool_schemas: &[Value],
    ) -> Result<CompletionResponse, RuntimeError> {
        let _timer = crate::metrics::MetricTimer::new("completion_latency_ms");

        self.circuit_breaker.should_allow_request()?;

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            debug!("Completion attempt {}/{}", attempt + 1, self.max_retries + 1);

            match self.call_once(messages, tool_schemas).await {
                Ok(response) => {
                    self.circuit_breaker.record_success();
                    return Ok(response);
                }
                Err(e) => {
                    warn!("Completion failed (attempt {}): {}", attempt + 1, e);
                    let delay = self.retry_delay_for_error(attempt, &e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.circuit_breaker.record_failure();

        Err(RuntimeError::Completion(format!(
            "Completion failed after {} attempts: {}",
            self.max_retries + 1,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    async fn call_once(
        &self,
        messages: &[Message],
        tool_schemas: &[Value],
    ) -> Result<CompletionResponse, RuntimeError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let has_tools = !tool_schemas.is_empty();
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: messages.iter().map(to_wire).collect(),
            tools: has_tools.then(|| tool_schemas.to_vec()),
            tool_choice: has_tools.then(|| "auto".to_string()),
            temperature: Some(0.2),
        };

        debug!(url = %url, tools = tool_schemas.len(), "Sending completion request");

        let mut req_builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                RuntimeError::Completion("Network connection failed".to_string())
            } else {
                RuntimeError::Completion(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            let error_msg = match status.as_u16() {
                401 => format!("Authentication failed. Check your API key. Details: {}", error_body),
                404 => format!("Invalid endpoint (404 Not Found). Details: {}", error_body),
                429 => format!("Rate limit exceeded (429). Details: {}", error_body),
                500..=599 => format!("Server error: {}. Details: {}", status, error_body),
                _ => format!("HTTP error: {}. Details: {}", status, error_body),
            };
            return Err(RuntimeError::Completion(error_msg));
        }

        let parsed: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::Completion(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::Completion("No choices in response".to_string()))?;

        normalize(choice.message)
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> Result<CompletionResponse, RuntimeError> {
        self.call(messages, tools).await
    }
}

/// Encode a conversation message in strict OpenAI format.
fn to_wire(msg: &Message) -> Value {
    match msg.role {
        Role::Assistant if !msg.tool_calls.is_empty() => json!({
            "role": "assistant",
            "content": msg.content,
            "tool_calls": msg.tool_calls.iter().map(|call| json!({
                "id": call.id,
                "type": "function",
                "function": {"name": call.name, "arguments": call.arguments}
            })).collect::<Vec<_>>(),
        }),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content.clone().unwrap_or_default(),
        }),
        role => json!({
            "role": role.as_str(),
            "content": msg.content.clone().unwrap_or_default(),
        }),
    }
}

fn normalize(message: OpenAIMessage) -> Result<CompletionResponse, RuntimeError> {
    let calls: Vec<ToolCallRequest> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCallRequest {
            id: call.id.unwrap_or_else(|| format!("call_{}", index)),
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    if !calls.is_empty() {
        if calls.iter().any(|c| c.name.trim().is_empty()) {
            return Err(RuntimeError::Completion(
                "Tool call missing function name".to_string(),
            ));
        }
        return Ok(CompletionResponse::ToolCalls {
            content: message.content.filter(|c| !c.is_empty()),
            calls,
        });
    }

    Ok(CompletionResponse::Final {
        content: message.content.unwrap_or_default(),
    })
}

fn extract_retry_seconds(msg: &str) -> Option<u64> {
    for token in msg.split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '.') {
        if let Some(stripped) = token.strip_suffix('s') {
            if let Ok(v) = stripped.parse::<u64>() {
                if v > 0 {
                    return Some(v);
                }
            }
        }
    }
    None
}
