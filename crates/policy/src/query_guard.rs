use crate::decision::{DenyReason, PolicyViolation};
use regex::RegexSet;
use std::sync::OnceLock;

const INJECTION_PATTERNS: &[&str] = &[
    r"(?i)javascript\s*:",
    r"(?i)vbscript\s*:",
    r"(?i)data\s*:\s*text/html",
    r"(?i)file://",
    r"(?i)<\s*script",
    r"(?i)<\s*/\s*script",
    r"(?i)\bon[a-z]+\s*=",
];

fn patterns() -> Option<&'static RegexSet> {
    static SET: OnceLock<Option<RegexSet>> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(INJECTION_PATTERNS).ok()).as_ref()
}

/// Screens free-form query text before it is sent to a search engine.
pub struct QueryGuard;

impl QueryGuard {
    pub fn validate(query: &str) -> Result<(), PolicyViolation> {
        if query.contains('\0') {
            return Err(PolicyViolation::new(
                DenyReason::InjectionSuspected,
                "Query contains a NUL byte",
            ));
        }

        let hit = match patterns() {
            Some(set) => set.matches(query).into_iter().next(),
            // Patterns are static; a failed compile means nothing can be trusted.
            None => Some(0),
        };

        if let Some(idx) = hit {
            tracing::warn!(pattern = INJECTION_PATTERNS[idx], "Rejected search query");
            return Err(PolicyViolation::new(
                DenyReason::InjectionSuspected,
                "Query contains script injection markers",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_queries_pass() {
        for q in ["rust async runtime", "what is 2 + 2?", "information theory", "on call rotation"] {
            assert!(QueryGuard::validate(q).is_ok(), "{} should pass", q);
        }
    }

    #[test]
    fn test_injection_markers_rejected() {
        for q in [
            "javascript:alert(1)",
            "<script>alert(1)</script>",
            "< SCRIPT src=x>",
            "img onerror=alert(1)",
            "file:///etc/passwd",
            "VBScript:msgbox",
        ] {
            let err = QueryGuard::validate(q).unwrap_err();
            assert_eq!(err.reason, DenyReason::InjectionSuspected, "{}", q);
        }
    }
}
