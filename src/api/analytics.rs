//! Fire-and-forget analytics events

use tracing::info;

/// Receives analytics events; implementations must not fail the caller
pub trait AnalyticsSink: Send + Sync {
    /// Record an event. `category` is `"<owner>/<repo>"`.
    fn track(&self, event: &str, category: &str);
}

/// Forwards events to the `analytics` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn track(&self, event: &str, category: &str) {
        info!(target: "analytics", event, category, "analytics event");
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn track(&self, _event: &str, _category: &str) {}
}
