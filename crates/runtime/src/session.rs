//! In-memory per-conversation state.
//!
//! Sessions are created lazily, updated after every tool call and removed
//! only by an explicit age-based sweep. Each session sits behind its own
//! lock, so different sessions never contend with each other.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use toolwarden_tools::ToolResult;
use tracing::{debug, info};
use uuid::Uuid;

/// One tool invocation as seen by a session. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub parameters: Value,
    pub result: ToolResult,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    records: Vec<ToolCallRecord>,
    total_executions: u64,
    successful_executions: u64,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: now,
            records: Vec::new(),
            total_executions: 0,
            successful_executions: 0,
        }
    }

    fn push(&mut self, record: ToolCallRecord) {
        self.total_executions += 1;
        if record.result.success() {
            self.successful_executions += 1;
        }
        self.last_activity = record.timestamp;
        self.records.push(record);
    }

    fn info(&self) -> SessionInfo {
        let success_rate = if self.total_executions > 0 {
            self.successful_executions as f64 / self.total_executions as f64 * 100.0
        } else {
            0.0
        };
        SessionInfo {
            session_id: self.id.clone(),
            created_at: self.created_at.to_rfc3339(),
            last_activity: self.last_activity.to_rfc3339(),
            total_tool_executions: self.total_executions,
            successful_executions: self.successful_executions,
            success_rate,
            tool_calls_count: self.records.len(),
        }
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: String,
    pub last_activity: String,
    pub total_tool_executions: u64,
    pub successful_executions: u64,
    /// Percent.
    pub success_rate: f64,
    pub tool_calls_count: usize,
}

/// Aggregate counters across all live sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_tool_calls: u64,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of an existing session, creating it first when needed.
    /// `None` or a blank id allocates a fresh one.
    pub fn get_or_create(&self, session_id: Option<&str>) -> String {
        let id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        if self.sessions.read().contains_key(&id) {
            return id;
        }
        self.sessions
            .write()
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(session = %id, "Session created");
                Arc::new(Mutex::new(Session::new(id.clone())))
            });
        id
    }

    /// Append a tool-call record, creating the session if it does not exist.
    pub fn record(&self, session_id: &str, tool_name: &str, parameters: Value, result: ToolResult) {
        let session = self.handle(session_id);
        session.lock().push(ToolCallRecord {
            tool_name: tool_name.to_string(),
            parameters,
            result,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, session_id: &str) -> Option<SessionInfo> {
        let session = self.sessions.read().get(session_id).cloned()?;
        let info = session.lock().info();
        Some(info)
    }

    /// Copy of a session's call log, oldest first.
    pub fn records(&self, session_id: &str) -> Vec<ToolCallRecord> {
        match self.sessions.read().get(session_id).cloned() {
            Some(session) => session.lock().records.clone(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Remove sessions idle for longer than `max_age`. Returns how many went.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.lock().idle_for(now) <= max_age);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Swept idle sessions");
            crate::metrics::record_sessions_swept(removed);
        }
        removed
    }

    /// Totals over all sessions; `active_window` decides which count as active.
    pub fn summary(&self, active_window: Duration) -> SessionSummary {
        let now = Utc::now();
        let sessions = self.sessions.read();
        let mut summary = SessionSummary {
            total_sessions: sessions.len(),
            active_sessions: 0,
            total_tool_calls: 0,
        };
        for session in sessions.values() {
            let session = session.lock();
            if session.idle_for(now) <= active_window {
                summary.active_sessions += 1;
            }
            summary.total_tool_calls += session.total_executions;
        }
        summary
    }

    fn handle(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().get(session_id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(session_id.to_string())))),
        )
    }

    #[cfg(test)]
    fn backdate(&self, session_id: &str, by: Duration) {
        if let Some(session) = self.sessions.read().get(session_id) {
            let mut session = session.lock();
            let by = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
            session.last_activity -= by;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use toolwarden_tools::ToolError;

    fn ok_result() -> ToolResult {
        ToolResult::ok(json!({"done": true}), Duration::from_millis(3), Map::new())
    }

    fn failed_result() -> ToolResult {
        let err = ToolError::Execution("disk full".to_string());
        ToolResult::failed(&err, Duration::from_millis(1), Map::new())
    }

    #[test]
    fn test_get_or_create_reuses_id() {
        let store = SessionStore::new();
        let id = store.get_or_create(Some("conv-1"));
        assert_eq!(id, "conv-1");
        assert_eq!(store.get_or_create(Some("conv-1")), "conv-1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let store = SessionStore::new();
        let a = store.get_or_create(None);
        let b = store.get_or_create(Some("   "));
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_counters_match_records() {
        let store = SessionStore::new();
        let id = store.get_or_create(None);
        store.record(&id, "file_system", json!({"operation": "read"}), ok_result());
        store.record(&id, "file_system", json!({"operation": "write"}), failed_result());
        store.record(&id, "web_search", json!({"operation": "search"}), ok_result());

        let info = store.info(&id).unwrap();
        assert_eq!(info.total_tool_executions, 3);
        assert_eq!(info.successful_executions, 2);
        assert_eq!(info.tool_calls_count, 3);
        assert!((info.success_rate - 66.666).abs() < 0.01);

        let records = store.records(&id);
        assert_eq!(records[1].tool_name, "file_system");
        assert!(!records[1].result.success());
    }

    #[test]
    fn test_record_creates_missing_session() {
        let store = SessionStore::new();
        store.record("late", "web_search", json!({}), ok_result());
        assert_eq!(store.info("late").unwrap().tool_calls_count, 1);
    }

    #[test]
    fn test_unknown_session_info() {
        let store = SessionStore::new();
        assert!(store.info("missing").is_none());
        assert!(store.records("missing").is_empty());
    }

    #[test]
    fn test_sweep_removes_only_idle_sessions() {
        let store = SessionStore::new();
        let old = store.get_or_create(Some("old"));
        let fresh = store.get_or_create(Some("fresh"));
        store.backdate(&old, Duration::from_secs(2 * 3600));

        let removed = store.sweep(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(store.info(&old).is_none());
        assert!(store.info(&fresh).is_some());
    }

    #[test]
    fn test_summary() {
        let store = SessionStore::new();
        let a = store.get_or_create(Some("a"));
        let b = store.get_or_create(Some("b"));
        store.record(&a, "file_system", json!({}), ok_result());
        store.record(&b, "file_system", json!({}), ok_result());
        store.record(&b, "file_system", json!({}), failed_result());
        store.backdate(&b, Duration::from_secs(7200));

        let summary = store.summary(Duration::from_secs(3600));
        assert_eq!(summary.total_sessions, 2);
        assert_eq!(summary.active_sessions, 1);
        assert_eq!(summary.total_tool_calls, 3);
    }
}
