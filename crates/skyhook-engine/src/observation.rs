//! Immutable records of dispatched observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skyhook_core::{DecisionId, EventId, SkyPosition};

use crate::dispatch::DispatchReason;

/// One accepted observation at a telescope backend.
///
/// The `request_id` is the backend's own identifier and serves as the
/// primary key; a multi-beam backend returns several of them for a single
/// submission and each becomes its own record. Records are immutable after
/// creation except for attaching the backend's full response payload, which
/// can arrive after the identifiers do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Backend-assigned observation identifier.
    pub request_id: String,
    /// The telescope that accepted the observation.
    pub telescope: String,
    /// The decision this observation fulfils.
    pub decision_id: DecisionId,
    /// The event that prompted the dispatch.
    pub event_id: EventId,
    /// Why the dispatch happened (first observation or repoint).
    pub reason: DispatchReason,
    /// Pointing used, when the request carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SkyPosition>,
    /// Sub-array pointings submitted in place of a single target when the
    /// alert carried no localization.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sub_pointings: Vec<SkyPosition>,
    /// Observation duration, seconds.
    pub duration_secs: f64,
    /// Full backend response payload, attached when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// When the observation was recorded (UTC).
    pub created_at: DateTime<Utc>,
}

impl Observation {
    /// Creates an observation record for one backend-returned request id.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        telescope: impl Into<String>,
        decision_id: DecisionId,
        event_id: EventId,
        reason: DispatchReason,
        duration_secs: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            telescope: telescope.into(),
            decision_id,
            event_id,
            reason,
            position: None,
            sub_pointings: Vec::new(),
            duration_secs,
            response: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the pointing.
    #[must_use]
    pub const fn with_position(mut self, position: SkyPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Sets the sub-array pointings.
    #[must_use]
    pub fn with_sub_pointings(mut self, pointings: Vec<SkyPosition>) -> Self {
        self.sub_pointings = pointings;
        self
    }
}
