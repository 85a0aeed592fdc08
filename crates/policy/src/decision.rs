use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which rule rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    OutsideAllowlist,
    BlockedExtension,
    BlockedPattern,
    TraversalDetected,
    BlockedDomain,
    DomainNotAllowed,
    SsrfSuspected,
    InjectionSuspected,
    MalformedTarget,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::OutsideAllowlist => "outside_allowlist",
            DenyReason::BlockedExtension => "blocked_extension",
            DenyReason::BlockedPattern => "blocked_pattern",
            DenyReason::TraversalDetected => "traversal_detected",
            DenyReason::BlockedDomain => "blocked_domain",
            DenyReason::DomainNotAllowed => "domain_not_allowed",
            DenyReason::SsrfSuspected => "ssrf_suspected",
            DenyReason::InjectionSuspected => "injection_suspected",
            DenyReason::MalformedTarget => "malformed_target",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy rejection: the reason class plus a human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {message}")]
pub struct PolicyViolation {
    pub reason: DenyReason,
    pub message: String,
}

impl PolicyViolation {
    pub fn new(reason: DenyReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Outcome of a single policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityDecision {
    Allow,
    Deny(PolicyViolation),
}

impl SecurityDecision {
    pub fn deny(reason: DenyReason, message: impl Into<String>) -> Self {
        SecurityDecision::Deny(PolicyViolation::new(reason, message))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, SecurityDecision::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            SecurityDecision::Allow => None,
            SecurityDecision::Deny(v) => Some(v.reason),
        }
    }

    pub fn into_result(self) -> Result<(), PolicyViolation> {
        match self {
            SecurityDecision::Allow => Ok(()),
            SecurityDecision::Deny(v) => Err(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_carries_reason() {
        let decision = SecurityDecision::deny(DenyReason::BlockedPattern, "node_modules");
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason(), Some(DenyReason::BlockedPattern));

        let err = decision.into_result().unwrap_err();
        assert_eq!(err.to_string(), "blocked_pattern: node_modules");
    }

    #[test]
    fn test_allow_into_result() {
        assert!(SecurityDecision::Allow.into_result().is_ok());
        assert_eq!(SecurityDecision::Allow.reason(), None);
    }

    #[test]
    fn test_reason_display_matches_tag() {
        assert_eq!(DenyReason::SsrfSuspected.to_string(), "ssrf_suspected");
        assert_eq!(DenyReason::TraversalDetected.as_str(), "traversal_detected");
    }
}
