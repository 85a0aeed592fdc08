//! Abstract interfaces for runtime dependencies.

use crate::types::{CompletionResponse, Message};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Runtime errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Chat-completion backend. Receives the conversation and the tool schemas in
/// OpenAI function format and answers with text or tool calls.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> Result<CompletionResponse, RuntimeError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::Session("unknown session".to_string());
        assert_eq!(err.to_string(), "Session error: unknown session");

        let err = RuntimeError::Config("empty file".to_string());
        assert_eq!(err.to_string(), "Config error: empty file");
    }

    #[test]
    fn test_io_error_converts() {
        let err: RuntimeError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, RuntimeError::Io(_)));
    }
}
