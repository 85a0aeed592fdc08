use crate::error::ToolError;
use crate::result::ToolResult;
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::stats::ToolStats;
use crate::traits::Tool;
use crate::validation::validate_params;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Wraps every tool call with validation, the tool's security check, a
/// cancelling timeout, retries and statistics. Always yields a [`ToolResult`].
#[derive(Clone)]
pub struct ToolEngine {
    retry: Arc<dyn RetryStrategy>,
}

impl Default for ToolEngine {
    fn default() -> Self {
        Self::new(Arc::new(ExponentialBackoff::default()))
    }
}

impl ToolEngine {
    pub fn new(retry: Arc<dyn RetryStrategy>) -> Self {
        Self { retry }
    }

    pub async fn execute(&self, tool: &Arc<dyn Tool>, stats: &ToolStats, params: Value) -> ToolResult {
        let name = tool.name().to_string();
        let config = tool.config();
        let timestamp = Utc::now();

        if !config.enabled {
            let err = ToolError::Disabled(name.clone());
            warn!(tool = %name, "Invocation of disabled tool");
            stats.record(false, Duration::ZERO, timestamp);
            record_metrics(&name, &Err(err.clone()), Duration::ZERO);
            return ToolResult::failed(&err, Duration::ZERO, metadata(&name, &params, timestamp, 0));
        }

        debug!(tool = %name, "Executing tool");
        let started = Instant::now();

        let mut attempts = 0;
        let outcome = match validate_params(&tool.schema(), &params) {
            Err(e) => Err(e),
            Ok(()) => {
                let max_attempts = config.retry_attempts.saturating_add(1);
                loop {
                    attempts += 1;
                    match self.attempt(tool, &params, config.max_execution_time()).await {
                        Err(e) if self.retry.should_retry(&e, attempts, max_attempts) => {
                            let delay = self.retry.delay(attempts);
                            warn!(
                                tool = %name,
                                attempt = attempts,
                                delay_ms = delay.as_millis() as u64,
                                "Tool attempt failed, retrying: {}",
                                e
                            );
                            tokio::time::sleep(delay).await;
                        }
                        other => break other,
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        stats.record(outcome.is_ok(), elapsed, timestamp);
        record_metrics(&name, &outcome, elapsed);
        let meta = metadata(&name, &params, timestamp, attempts);

        match outcome {
            Ok(value) => {
                info!(tool = %name, elapsed_ms = elapsed.as_millis() as u64, "Tool execution succeeded");
                ToolResult::ok(value, elapsed, meta)
            }
            Err(err) => {
                match err.deny_reason() {
                    Some(reason) => warn!(tool = %name, reason = %reason, "Tool call denied by policy"),
                    None => warn!(
                        tool = %name,
                        kind = %err.kind(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Tool execution failed: {}",
                        err
                    ),
                }
                ToolResult::failed(&err, elapsed, meta)
            }
        }
    }

    async fn attempt(&self, tool: &Arc<dyn Tool>, params: &Value, limit: Duration) -> Result<Value, ToolError> {
        // Re-evaluated on every attempt so a retry never outlives a policy change.
        tool.check_security(params)?;

        let task_tool = Arc::clone(tool);
        let task_params = params.clone();
        let mut handle = tokio::spawn(async move { task_tool.run(task_params).await });

        match timeout(limit, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!(tool = %tool.name(), "Tool execution panicked");
                    Err(ToolError::Execution("Tool panicked during execution".into()))
                } else {
                    error!(tool = %tool.name(), "Tool execution cancelled");
                    Err(ToolError::Execution("Tool execution was cancelled".into()))
                }
            }
            Err(_) => {
                handle.abort();
                warn!(tool = %tool.name(), limit_ms = limit.as_millis() as u64, "Tool execution timed out");
                Err(ToolError::Timeout(limit))
            }
        }
    }
}

fn metadata(name: &str, params: &Value, timestamp: DateTime<Utc>, attempts: u32) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("tool_name".into(), Value::String(name.to_string()));
    meta.insert("parameters".into(), params.clone());
    meta.insert("timestamp".into(), Value::String(timestamp.to_rfc3339()));
    meta.insert("attempts".into(), Value::from(attempts));
    meta
}

fn record_metrics(name: &str, outcome: &Result<Value, ToolError>, elapsed: Duration) {
    let label = match outcome {
        Ok(_) => "success",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!("tool_executions_total", 1, "tool" => name.to_string(), "outcome" => label);
    metrics::histogram!(
        "tool_execution_latency_ms",
        elapsed.as_secs_f64() * 1000.0,
        "tool" => name.to_string()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use toolwarden_policy::{DenyReason, PolicyViolation};

    struct ScriptedTool {
        config: ToolConfig,
        calls: AtomicU32,
        fail_first: u32,
        sleep: Option<Duration>,
        deny: bool,
        panic: bool,
    }

    impl ScriptedTool {
        fn new() -> Self {
            Self {
                config: ToolConfig::default(),
                calls: AtomicU32::new(0),
                fail_first: 0,
                sleep: None,
                deny: false,
                panic: false,
            }
        }
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn name(&self) -> &str {
            "scripted"
        }

        fn description(&self) -> &str {
            "Test tool"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"input": {"type": "string"}},
                "required": ["input"]
            })
        }

        fn config(&self) -> ToolConfig {
            self.config.clone()
        }

        fn check_security(&self, _params: &Value) -> Result<(), PolicyViolation> {
            if self.deny {
                return Err(PolicyViolation::new(DenyReason::OutsideAllowlist, "no"));
            }
            Ok(())
        }

        async fn run(&self, params: Value) -> Result<Value, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic {
                panic!("boom");
            }
            if let Some(d) = self.sleep {
                tokio::time::sleep(d).await;
            }
            if n <= self.fail_first {
                return Err(ToolError::Execution("transient".into()));
            }
            Ok(params["input"].clone())
        }
    }

    fn fast_engine() -> ToolEngine {
        ToolEngine::new(Arc::new(ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(5),
        )))
    }

    #[tokio::test]
    async fn test_success_metadata() {
        let tool: Arc<dyn Tool> = Arc::new(ScriptedTool::new());
        let stats = ToolStats::new();
        let result = fast_engine().execute(&tool, &stats, json!({"input": "hi"})).await;

        assert!(result.success());
        assert_eq!(result.result(), Some(&json!("hi")));
        assert_eq!(result.metadata()["tool_name"], json!("scripted"));
        assert_eq!(result.metadata()["attempts"], json!(1));
        assert_eq!(stats.snapshot("scripted", true).success_count, 1);
    }

    #[tokio::test]
    async fn test_disabled_short_circuits() {
        let mut inner = ScriptedTool::new();
        inner.config.enabled = false;
        let inner = Arc::new(inner);
        let tool: Arc<dyn Tool> = inner.clone();
        let stats = ToolStats::new();

        let result = fast_engine().execute(&tool, &stats, json!({"input": "hi"})).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Disabled));
        assert_eq!(result.execution_time(), 0.0);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);

        let snap = stats.snapshot("scripted", false);
        assert_eq!(snap.execution_count, 1);
        assert_eq!(snap.error_count, 1);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_run() {
        let inner = Arc::new(ScriptedTool::new());
        let tool: Arc<dyn Tool> = inner.clone();
        let result = fast_engine().execute(&tool, &ToolStats::new(), json!({})).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ValidationFailed));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_denial_is_not_retried() {
        let mut inner = ScriptedTool::new();
        inner.deny = true;
        inner.config.retry_attempts = 3;
        let inner = Arc::new(inner);
        let tool: Arc<dyn Tool> = inner.clone();

        let result = fast_engine().execute(&tool, &ToolStats::new(), json!({"input": "x"})).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::SecurityDenied));
        assert_eq!(result.deny_reason(), Some("outside_allowlist"));
        assert_eq!(result.metadata()["attempts"], json!(1));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let mut inner = ScriptedTool::new();
        inner.fail_first = 2;
        inner.config.retry_attempts = 2;
        let inner = Arc::new(inner);
        let tool: Arc<dyn Tool> = inner.clone();

        let result = fast_engine().execute(&tool, &ToolStats::new(), json!({"input": "ok"})).await;
        assert!(result.success());
        assert_eq!(result.metadata()["attempts"], json!(3));
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let mut inner = ScriptedTool::new();
        inner.fail_first = 1;
        let inner = Arc::new(inner);
        let tool: Arc<dyn Tool> = inner.clone();

        let result = fast_engine().execute(&tool, &ToolStats::new(), json!({"input": "ok"})).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ExecutionError));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let mut inner = ScriptedTool::new();
        inner.sleep = Some(Duration::from_secs(10));
        inner.config.max_execution_time_ms = 100;
        let tool: Arc<dyn Tool> = Arc::new(inner);

        let result = fast_engine().execute(&tool, &ToolStats::new(), json!({"input": "x"})).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::TimedOut));
        assert!(result.execution_time() < 1.0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let mut inner = ScriptedTool::new();
        inner.panic = true;
        let tool: Arc<dyn Tool> = Arc::new(inner);

        let result = fast_engine().execute(&tool, &ToolStats::new(), json!({"input": "x"})).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ExecutionError));
        assert!(result.error().unwrap().contains("panicked"));
    }
}
