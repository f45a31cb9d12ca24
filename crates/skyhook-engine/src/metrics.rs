//! Observability metrics for the decision engine.
//!
//! Metrics are exposed via the `metrics` crate facade; wire an exporter
//! (e.g. `metrics_exporter_prometheus`) at process startup to publish them.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `skyhook_events_ingested_total` | Counter | `observatory`, `classification` | Alerts accepted by the grouper |
//! | `skyhook_groups_created_total` | Counter | `classification` | New event groups |
//! | `skyhook_decision_transitions_total` | Counter | `from_state`, `to_state` | Decision state transitions |
//! | `skyhook_dispatches_total` | Counter | `telescope`, `outcome` | Dispatch attempts by final outcome |
//! | `skyhook_dispatch_retries_total` | Counter | `telescope` | Retries after transient failures |
//! | `skyhook_dispatch_duration_seconds` | Histogram | `telescope` | End-to-end dispatch latency |
//! | `skyhook_notify_failures_total` | Counter | - | Dropped decision notifications |

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Alerts accepted by the grouper.
    pub const EVENTS_INGESTED_TOTAL: &str = "skyhook_events_ingested_total";
    /// Counter: New event groups created.
    pub const GROUPS_CREATED_TOTAL: &str = "skyhook_groups_created_total";
    /// Counter: Decision state transitions.
    pub const DECISION_TRANSITIONS_TOTAL: &str = "skyhook_decision_transitions_total";
    /// Counter: Dispatch attempts by final outcome.
    pub const DISPATCHES_TOTAL: &str = "skyhook_dispatches_total";
    /// Counter: Retries after transient backend failures.
    pub const DISPATCH_RETRIES_TOTAL: &str = "skyhook_dispatch_retries_total";
    /// Histogram: End-to-end dispatch latency in seconds.
    pub const DISPATCH_DURATION_SECONDS: &str = "skyhook_dispatch_duration_seconds";
    /// Counter: Dropped decision notifications.
    pub const NOTIFY_FAILURES_TOTAL: &str = "skyhook_notify_failures_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Originating instrument.
    pub const OBSERVATORY: &str = "observatory";
    /// Source classification (GRB, GW, NU, FS).
    pub const CLASSIFICATION: &str = "classification";
    /// Previous decision state.
    pub const FROM_STATE: &str = "from_state";
    /// Target decision state.
    pub const TO_STATE: &str = "to_state";
    /// Telescope name.
    pub const TELESCOPE: &str = "telescope";
    /// Dispatch outcome (accepted, rejected, exhausted, reused).
    pub const OUTCOME: &str = "outcome";
}

/// High-level interface for recording engine metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics;

impl EngineMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records an accepted alert.
    pub fn record_event_ingested(&self, observatory: &str, classification: &str) {
        counter!(
            names::EVENTS_INGESTED_TOTAL,
            labels::OBSERVATORY => observatory.to_string(),
            labels::CLASSIFICATION => classification.to_string(),
        )
        .increment(1);
    }

    /// Records a newly created event group.
    pub fn record_group_created(&self, classification: &str) {
        counter!(
            names::GROUPS_CREATED_TOTAL,
            labels::CLASSIFICATION => classification.to_string(),
        )
        .increment(1);
    }

    /// Records a decision state transition.
    pub fn record_decision_transition(&self, from_state: &str, to_state: &str) {
        counter!(
            names::DECISION_TRANSITIONS_TOTAL,
            labels::FROM_STATE => from_state.to_string(),
            labels::TO_STATE => to_state.to_string(),
        )
        .increment(1);
    }

    /// Records a completed dispatch with its final outcome.
    pub fn record_dispatch(&self, telescope: &str, outcome: &str) {
        counter!(
            names::DISPATCHES_TOTAL,
            labels::TELESCOPE => telescope.to_string(),
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
    }

    /// Records one retry after a transient backend failure.
    pub fn record_dispatch_retry(&self, telescope: &str) {
        counter!(
            names::DISPATCH_RETRIES_TOTAL,
            labels::TELESCOPE => telescope.to_string(),
        )
        .increment(1);
    }

    /// Records end-to-end dispatch latency.
    pub fn observe_dispatch_duration(&self, telescope: &str, duration: Duration) {
        histogram!(
            names::DISPATCH_DURATION_SECONDS,
            labels::TELESCOPE => telescope.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    /// Records a dropped decision notification.
    pub fn record_notify_failure(&self) {
        counter!(names::NOTIFY_FAILURES_TOTAL).increment(1);
    }
}
