use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use toolwarden_policy::{DenyReason, PolicyViolation};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool {0} is disabled")]
    Disabled(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Security denied ({})", .0)]
    SecurityDenied(#[from] PolicyViolation),

    #[error("Tool execution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Disabled(_) => ErrorKind::Disabled,
            ToolError::Validation(_) => ErrorKind::ValidationFailed,
            ToolError::SecurityDenied(_) => ErrorKind::SecurityDenied,
            ToolError::Timeout(_) => ErrorKind::TimedOut,
            ToolError::Execution(_) => ErrorKind::ExecutionError,
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            ToolError::SecurityDenied(v) => Some(v.reason),
            _ => None,
        }
    }

    /// Denials and bad input never change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Timeout(_) | ToolError::Execution(_))
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::Execution(err.to_string())
    }
}

/// Closed set of failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Disabled,
    ValidationFailed,
    SecurityDenied,
    TimedOut,
    ExecutionError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Disabled => "disabled",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::SecurityDenied => "security_denied",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::ExecutionError => "execution_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let denied = ToolError::from(PolicyViolation::new(DenyReason::TraversalDetected, "x"));
        assert_eq!(denied.kind(), ErrorKind::SecurityDenied);
        assert_eq!(denied.deny_reason(), Some(DenyReason::TraversalDetected));
        assert!(!denied.is_retryable());

        let timeout = ToolError::Timeout(Duration::from_millis(150));
        assert_eq!(timeout.kind().as_str(), "timed_out");
        assert_eq!(timeout.to_string(), "Tool execution timed out after 150ms");
        assert!(timeout.is_retryable());
    }

    #[test]
    fn test_io_error_is_execution() {
        let err: ToolError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
    }
}
