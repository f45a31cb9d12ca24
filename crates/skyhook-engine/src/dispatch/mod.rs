//! Telescope dispatch abstraction.
//!
//! This module provides:
//!
//! - [`TelescopeBackend`]: Trait for submitting observations to telescopes
//! - [`ObservationRequest`]: Serializable submission payload
//! - [`Dispatcher`]: Retry, timeout and idempotency around a backend
//! - [`memory::InMemoryBackend`]: Scripted backend for testing
//!
//! ## Design Principles
//!
//! - **Backend agnostic**: Same interface for multi-beam and compact-array
//!   facilities
//! - **At-most-once**: The dispatcher never submits a first observation for a
//!   decision that already has one recorded
//! - **Bounded retry**: Transient failures retry with exponential backoff;
//!   definitive rejections never retry

pub mod http;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use skyhook_core::SkyPosition;

use crate::config::EngineConfig;
use crate::decision::{DecisionState, ProposalDecision};
use crate::error::{Error, Result};
use crate::event::{AlertRole, Event, EventGroup};
use crate::metrics::EngineMetrics;
use crate::observation::Observation;
use crate::proposal::{BackendKind, Proposal};
use crate::store::ObservationStore;

/// Why an observation is being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchReason {
    /// First observation for this (trigger id, proposal) pair.
    FirstObservation,
    /// A refined localization moved far enough to warrant repointing.
    Repoint,
}

impl std::fmt::Display for DispatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstObservation => write!(f, "first observation"),
            Self::Repoint => write!(f, "repoint"),
        }
    }
}

/// Payload for one observation submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRequest {
    /// Target telescope.
    pub telescope: String,
    /// Facility project code the time is charged to.
    pub project_id: String,
    /// Human-readable observation name, unique per submission.
    pub obs_name: String,
    /// Primary pointing, when localized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SkyPosition>,
    /// Sub-array pointings used by multi-beam facilities to tile the sky
    /// when the alert carries no localization.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sub_pointings: Vec<SkyPosition>,
    /// Observation duration, seconds.
    pub duration_secs: f64,
    /// Scheduling priority (lower is more urgent).
    pub priority: i32,
    /// Validate but do not schedule.
    pub pretend: bool,
}

/// A backend's answer to a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse {
    /// Whether the observation was scheduled.
    pub accepted: bool,
    /// Backend-assigned observation identifiers; multi-beam facilities
    /// return one per beam.
    #[serde(default)]
    pub request_ids: Vec<String>,
    /// Backend-provided explanation, mostly useful on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Full response payload for the audit record.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A telescope scheduling interface.
#[async_trait]
pub trait TelescopeBackend: Send + Sync {
    /// The telescope this backend schedules for.
    fn telescope(&self) -> &str;

    /// Which submission family the backend belongs to.
    fn kind(&self) -> BackendKind;

    /// Submits one observation request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] for definitive refusals and
    /// [`Error::BackendUnavailable`] for transient faults worth retrying.
    async fn submit(&self, request: &ObservationRequest) -> Result<BackendResponse>;
}

/// The result of one dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Request ids recorded for this decision, in backend order.
    pub request_ids: Vec<String>,
    /// Submission attempts made (0 when an existing observation was reused).
    pub attempts: u32,
    /// True when the idempotency guard found observations already recorded
    /// and no submission happened.
    pub reused_existing: bool,
}

/// Submits observations with timeout, bounded retry and idempotency.
pub struct Dispatcher {
    backends: HashMap<String, Arc<dyn TelescopeBackend>>,
    observations: Arc<ObservationStore>,
    config: EngineConfig,
    metrics: EngineMetrics,
}

impl Dispatcher {
    /// Creates a dispatcher over a set of backends.
    #[must_use]
    pub fn new(
        backends: Vec<Arc<dyn TelescopeBackend>>,
        observations: Arc<ObservationStore>,
        config: EngineConfig,
        metrics: EngineMetrics,
    ) -> Self {
        let backends = backends
            .into_iter()
            .map(|b| (b.telescope().to_string(), b))
            .collect();
        Self {
            backends,
            observations,
            config,
            metrics,
        }
    }

    /// Dispatches an observation for a decision and records the result.
    ///
    /// For [`DispatchReason::FirstObservation`] the call is idempotent: when
    /// observations already exist for the decision, they are returned without
    /// contacting the backend. A [`DispatchReason::Repoint`] always submits.
    ///
    /// On acceptance the decision moves to `Triggered` (a repoint of an
    /// already-triggered decision only appends to its log) and one
    /// [`Observation`] is recorded per backend request id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendNotConfigured`] when no backend serves the
    /// proposal's telescope, [`Error::BackendRejected`] on definitive refusal,
    /// and [`Error::DispatchExhausted`] when every attempt failed
    /// transiently. The decision is left untouched on error.
    #[tracing::instrument(skip_all, fields(trig_id = %group.trig_id, proposal = %proposal.code, reason = %reason))]
    pub async fn dispatch(
        &self,
        decision: &mut ProposalDecision,
        proposal: &Proposal,
        group: &EventGroup,
        event: &Event,
        reason: DispatchReason,
    ) -> Result<DispatchOutcome> {
        if reason == DispatchReason::FirstObservation {
            let existing = self.observations.for_decision(decision.id)?;
            if !existing.is_empty() {
                info!(
                    decision_id = %decision.id,
                    observations = existing.len(),
                    "observations already recorded, skipping dispatch"
                );
                self.metrics.record_dispatch(&proposal.telescope.telescope, "reused");
                return Ok(DispatchOutcome {
                    request_ids: existing.into_iter().map(|o| o.request_id).collect(),
                    attempts: 0,
                    reused_existing: true,
                });
            }
        }

        let telescope = proposal.telescope.telescope.as_str();
        let backend = self
            .backends
            .get(telescope)
            .ok_or_else(|| Error::BackendNotConfigured {
                telescope: telescope.to_string(),
            })?;

        let request = self.build_request(decision, proposal, group, event);
        let started = Instant::now();
        let result = self.submit_with_retry(backend.as_ref(), &request).await;
        self.metrics
            .observe_dispatch_duration(telescope, started.elapsed());

        let (response, attempts) = match result {
            Ok(ok) => ok,
            Err(err) => {
                let outcome = match &err {
                    Error::BackendRejected { .. } => "rejected",
                    Error::DispatchExhausted { .. } => "exhausted",
                    _ => "failed",
                };
                self.metrics.record_dispatch(telescope, outcome);
                return Err(err);
            }
        };

        for request_id in &response.request_ids {
            let mut observation = Observation::new(
                request_id,
                telescope,
                decision.id,
                event.id,
                reason,
                request.duration_secs,
            )
            .with_sub_pointings(request.sub_pointings.clone());
            if let Some(position) = request.position {
                observation = observation.with_position(position);
            }
            observation.response = Some(response.payload.clone());
            self.observations.insert(observation)?;
        }

        decision.position = request.position;
        decision.duration_secs = Some(request.duration_secs);
        let summary = format!(
            "Observation accepted by {telescope} ({reason}), request ids: {}.",
            response.request_ids.join(", ")
        );
        if decision.state == DecisionState::Triggered {
            decision.append_reason(Some(event.id), summary);
        } else {
            let from = decision.state.to_string();
            decision.append_reason(Some(event.id), summary);
            decision.transition_to(DecisionState::Triggered, format!("{reason} accepted"))?;
            self.metrics.record_decision_transition(&from, "TRIGGERED");
        }
        self.metrics.record_dispatch(telescope, "accepted");

        Ok(DispatchOutcome {
            request_ids: response.request_ids,
            attempts,
            reused_existing: false,
        })
    }

    /// Builds the submission payload for a proposal and its best event.
    fn build_request(
        &self,
        decision: &ProposalDecision,
        proposal: &Proposal,
        group: &EventGroup,
        event: &Event,
    ) -> ObservationRequest {
        let binding = &proposal.telescope;
        // With no localization a multi-beam facility tiles the sky with its
        // configured sub-array pointings instead of a single target.
        let sub_pointings = if binding.kind == BackendKind::MultiBeam && group.position.is_none() {
            binding.default_pointings.clone()
        } else {
            Vec::new()
        };
        ObservationRequest {
            telescope: binding.telescope.clone(),
            project_id: binding.project_id.clone(),
            obs_name: format!(
                "{}_{}_{}",
                proposal.code,
                group.trig_id,
                decision.state.as_code()
            ),
            position: group.position,
            sub_pointings,
            duration_secs: binding.default_duration_secs,
            priority: proposal.priority,
            pretend: self.config.pretend || event.role == AlertRole::Test,
        }
    }

    /// Runs the attempt loop for one request.
    ///
    /// Timeouts and `BackendUnavailable` retry with backoff until the
    /// attempt budget runs out; a rejection or an unexpected error returns
    /// immediately.
    async fn submit_with_retry(
        &self,
        backend: &dyn TelescopeBackend,
        request: &ObservationRequest,
    ) -> Result<(BackendResponse, u32)> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let deadline = self.config.timeout_for(backend.kind());
        let mut last_message = String::new();

        for attempt in 1..=max_attempts {
            let submitted = tokio::time::timeout(deadline, backend.submit(request)).await;
            let error = match submitted {
                Ok(Ok(response)) => {
                    if response.accepted {
                        return Ok((response, attempt));
                    }
                    return Err(Error::BackendRejected {
                        telescope: request.telescope.clone(),
                        status: None,
                        message: response
                            .message
                            .unwrap_or_else(|| "observation refused".to_string()),
                    });
                }
                Ok(Err(err)) => err,
                Err(_) => Error::BackendUnavailable {
                    telescope: request.telescope.clone(),
                    message: format!("submission timed out after {deadline:?}"),
                },
            };

            if !error.is_retryable() {
                return Err(error);
            }
            last_message = error.to_string();
            warn!(attempt, error = %last_message, "transient dispatch failure");
            if attempt < max_attempts {
                self.metrics.record_dispatch_retry(&request.telescope);
                tokio::time::sleep(self.config.retry.backoff_for(attempt - 1)).await;
            }
        }

        Err(Error::DispatchExhausted {
            telescope: request.telescope.clone(),
            attempts: max_attempts,
            message: last_message,
        })
    }
}
