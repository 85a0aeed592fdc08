//! Metrics instrumentation for runtime observability.

use std::time::Instant;

/// Count a tool loop that stopped at its iteration bound.
pub fn increment_iteration_limit() {
    metrics::counter!("tool_loop_iteration_limit_total", 1);
}

/// Count a swept session.
pub fn record_sessions_swept(count: usize) {
    metrics::counter!("sessions_swept_total", count as u64);
}

/// RAII timer; records elapsed milliseconds into the histogram it was
/// created for.
pub struct MetricTimer {
    start: Instant,
    metric_name: &'static str,
}

impl MetricTimer {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!(self.metric_name, duration_ms);
    }
}
