use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running counters for one tool. Updated once per invocation, whatever the
/// outcome.
#[derive(Debug, Default)]
pub struct ToolStats {
    executions: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    total_micros: AtomicU64,
    last_execution: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub tool_name: String,
    pub execution_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Percent.
    pub success_rate: f64,
    /// Seconds.
    pub total_execution_time: f64,
    pub average_execution_time: f64,
    pub last_execution: Option<String>,
    pub enabled: bool,
}

impl ToolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, success: bool, elapsed: Duration, at: DateTime<Utc>) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        *self.last_execution.lock() = Some(at);
    }

    pub fn snapshot(&self, tool_name: &str, enabled: bool) -> StatsSnapshot {
        let executions = self.executions.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total = self.total_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;

        let (success_rate, average) = if executions > 0 {
            (
                successes as f64 / executions as f64 * 100.0,
                total / executions as f64,
            )
        } else {
            (0.0, 0.0)
        };

        StatsSnapshot {
            tool_name: tool_name.to_string(),
            execution_count: executions,
            success_count: successes,
            error_count: errors,
            success_rate,
            total_execution_time: total,
            average_execution_time: average,
            last_execution: self.last_execution.lock().map(|t| t.to_rfc3339()),
            enabled,
        }
    }

    pub fn reset(&self) {
        self.executions.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.total_micros.store(0, Ordering::Relaxed);
        *self.last_execution.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_rate() {
        let stats = ToolStats::new();
        stats.record(true, Duration::from_millis(100), Utc::now());
        stats.record(true, Duration::from_millis(100), Utc::now());
        stats.record(false, Duration::from_millis(100), Utc::now());
        stats.record(false, Duration::ZERO, Utc::now());

        let snap = stats.snapshot("file_system", true);
        assert_eq!(snap.execution_count, 4);
        assert_eq!(snap.success_count, 2);
        assert_eq!(snap.error_count, 2);
        assert_eq!(snap.success_rate, 50.0);
        assert!((snap.total_execution_time - 0.3).abs() < 1e-9);
        assert!(snap.last_execution.is_some());
    }

    #[test]
    fn test_reset() {
        let stats = ToolStats::new();
        stats.record(true, Duration::from_millis(5), Utc::now());
        stats.reset();
        let snap = stats.snapshot("x", false);
        assert_eq!(snap.execution_count, 0);
        assert_eq!(snap.success_rate, 0.0);
        assert!(snap.last_execution.is_none());
        assert!(!snap.enabled);
    }
}
