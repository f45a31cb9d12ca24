//! The decision engine.
//!
//! [`DecisionEngine`] ties the pipeline together: an ingested alert is
//! grouped by trigger id, every matching active proposal is evaluated in
//! `(priority, id)` order, and each verdict is resolved into a decision
//! state, dispatching an observation when the verdict says to trigger.
//!
//! All processing for one trigger id runs under a per-id async lock, held
//! for the whole evaluate-decide-dispatch-record unit. Alerts for distinct
//! trigger ids proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{info, warn};

use skyhook_core::ProposalId;

use crate::decision::{DecisionState, ProposalDecision};
use crate::dispatch::{DispatchOutcome, DispatchReason, Dispatcher};
use crate::error::{Error, Result};
use crate::event::{Event, EventGroup};
use crate::grouper::{EventGroupRef, EventGrouper};
use crate::metrics::EngineMetrics;
use crate::notify::{AlertNotifier, DecisionNotice};
use crate::proposal::{Proposal, ProposalRegistry};
use crate::store::DecisionStore;
use crate::worthiness;

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("engine lock poisoned")
}

/// One async mutex per trigger id, created on first use.
#[derive(Debug, Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn lock_for(&self, trig_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.inner.lock().map_err(poison_err)?;
        Ok(Arc::clone(
            locks
                .entry(trig_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        ))
    }
}

/// How one (trigger id, proposal) pair resolved during a processing unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    /// The trigger id processed.
    pub trig_id: String,
    /// The proposal evaluated.
    pub proposal_id: ProposalId,
    /// The proposal's short code.
    pub proposal_code: String,
    /// State after resolution.
    pub state: DecisionState,
    /// Dispatch result when an observation was submitted or reused.
    pub dispatch: Option<DispatchOutcome>,
}

/// Orchestrates grouping, evaluation, decisions and dispatch.
pub struct DecisionEngine {
    grouper: EventGrouper,
    registry: RwLock<ProposalRegistry>,
    decisions: Arc<DecisionStore>,
    dispatcher: Dispatcher,
    notifier: Arc<dyn AlertNotifier>,
    locks: KeyedLocks,
    metrics: EngineMetrics,
}

impl DecisionEngine {
    /// Creates an engine over a loaded registry.
    #[must_use]
    pub fn new(
        registry: ProposalRegistry,
        decisions: Arc<DecisionStore>,
        dispatcher: Dispatcher,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        Self {
            grouper: EventGrouper::new(),
            registry: RwLock::new(registry),
            decisions,
            dispatcher,
            notifier,
            locks: KeyedLocks::default(),
            metrics: EngineMetrics::new(),
        }
    }

    /// The event grouper, for inspection and operator group actions.
    #[must_use]
    pub fn grouper(&self) -> &EventGrouper {
        &self.grouper
    }

    /// The decision store, for inspection.
    #[must_use]
    pub fn decisions(&self) -> &Arc<DecisionStore> {
        &self.decisions
    }

    /// The current registry snapshot.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the registry lock is poisoned.
    pub fn registry(&self) -> Result<ProposalRegistry> {
        Ok(self.registry.read().map_err(poison_err)?.clone())
    }

    /// Replaces the registry with a fresh registration list.
    ///
    /// Units of work already holding the previous snapshot finish against
    /// it; only subsequent units see the new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryLoad`] if the new active set would be empty.
    pub fn reload_registry(&self, registrations: Vec<Proposal>) -> Result<()> {
        let mut registry = self.registry.write().map_err(poison_err)?;
        *registry = registry.reload(registrations)?;
        info!(active = registry.active_count(), "proposal registry reloaded");
        Ok(())
    }

    /// Ingests one alert and runs the full processing unit for its group.
    ///
    /// # Errors
    ///
    /// Returns an error only for faults of the unit itself (empty trigger
    /// id, storage faults). Per-proposal evaluation and dispatch failures
    /// park the affected pair in `Error` and are reported through the
    /// returned outcomes instead.
    #[tracing::instrument(skip_all, fields(trig_id = %event.trig_id, observatory = %event.observatory))]
    pub async fn ingest(&self, event: Event) -> Result<Vec<DecisionOutcome>> {
        self.metrics.record_event_ingested(
            &event.observatory.to_string(),
            &event.classification.to_string(),
        );
        let group_ref = self.grouper.ingest(event)?;
        if group_ref.is_new_group {
            let classification = self
                .grouper
                .group(&group_ref.trig_id)?
                .map(|g| g.classification.to_string())
                .unwrap_or_default();
            self.metrics.record_group_created(&classification);
        }
        self.process(&group_ref).await
    }

    /// Runs one processing unit for a previously ingested event.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the grouper no longer holds the event or
    /// group, or when a lock is poisoned.
    pub async fn process(&self, group_ref: &EventGroupRef) -> Result<Vec<DecisionOutcome>> {
        let unit_lock = self.locks.lock_for(&group_ref.trig_id)?;
        let _guard = unit_lock.lock().await;

        let event = self
            .grouper
            .event(group_ref.event_id)?
            .ok_or_else(|| Error::storage(format!("event {} not found", group_ref.event_id)))?;
        if event.ignored {
            info!("event ignored at ingestion, skipping evaluation");
            return Ok(Vec::new());
        }
        let group = self
            .grouper
            .group(&group_ref.trig_id)?
            .ok_or_else(|| Error::GroupNotFound {
                trig_id: group_ref.trig_id.clone(),
            })?;
        if group.ignored {
            info!("group is ignored, skipping evaluation");
            return Ok(Vec::new());
        }

        let registry = self.registry()?;
        let mut outcomes = Vec::new();
        for proposal in registry.matching(group.classification, event.role) {
            let outcome = self.resolve_pair(proposal, &group, &event).await?;
            if let Some(outcome) = outcome {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Evaluates and resolves one (group, proposal) pair.
    ///
    /// Returns `None` when the pair is closed to automatic processing and
    /// nothing changed.
    async fn resolve_pair(
        &self,
        proposal: &Proposal,
        group: &EventGroup,
        event: &Event,
    ) -> Result<Option<DecisionOutcome>> {
        let mut decision = match self.decisions.for_pair(&group.trig_id, proposal.id)? {
            Some(decision) => decision,
            None => {
                let mut decision =
                    ProposalDecision::new(&group.trig_id, proposal.id, &proposal.version);
                decision.append_reason(
                    Some(event.id),
                    format!("Decision created for proposal {}.", proposal.code),
                );
                decision
            }
        };

        match decision.state {
            DecisionState::Cancelled => return Ok(None),
            DecisionState::Error => {
                decision.append_reason(
                    Some(event.id),
                    "Pair is in error, awaiting an operator, so not evaluating.",
                );
                self.decisions.upsert(decision)?;
                return Ok(None);
            }
            DecisionState::Triggered => {
                return self.maybe_repoint(decision, proposal, group, event).await;
            }
            DecisionState::Pending | DecisionState::Ignored => {}
        }

        let dispatch = match worthiness::assess(group, event, proposal) {
            Ok(assessment) => {
                decision.append_raw(&assessment.log);
                self.apply_assessment(&mut decision, proposal, group, event, &assessment)
                    .await
            }
            Err(err) => {
                self.park_in_error(&mut decision, event, &err)?;
                None
            }
        };

        let outcome = DecisionOutcome {
            trig_id: group.trig_id.clone(),
            proposal_id: proposal.id,
            proposal_code: proposal.code.clone(),
            state: decision.state,
            dispatch,
        };
        self.finish(decision, proposal).await?;
        Ok(Some(outcome))
    }

    /// Resolves a worthiness verdict into a decision state, dispatching on
    /// trigger.
    async fn apply_assessment(
        &self,
        decision: &mut ProposalDecision,
        proposal: &Proposal,
        group: &EventGroup,
        event: &Event,
        assessment: &worthiness::Assessment,
    ) -> Option<DispatchOutcome> {
        let from = decision.state;

        if assessment.trigger {
            match self
                .dispatcher
                .dispatch(decision, proposal, group, event, DispatchReason::FirstObservation)
                .await
            {
                Ok(outcome) => return Some(outcome),
                Err(err) => {
                    if let Err(park_err) = self.park_in_error(decision, event, &err) {
                        warn!(error = %park_err, "failed to park decision in error");
                    }
                    return None;
                }
            }
        }

        let (target, reason) = if assessment.pending {
            (DecisionState::Pending, "waiting for a human's decision")
        } else {
            (DecisionState::Ignored, "no trigger condition met")
        };
        if let Err(err) = decision.transition_to(target, reason) {
            warn!(error = %err, "verdict transition refused");
        } else if from != target {
            self.metrics
                .record_decision_transition(&from.to_string(), &target.to_string());
        }
        None
    }

    /// Parks a pair in `Error` after an evaluation or dispatch failure.
    fn park_in_error(
        &self,
        decision: &mut ProposalDecision,
        event: &Event,
        err: &Error,
    ) -> Result<()> {
        warn!(proposal_id = %decision.proposal_id, error = %err, "pair parked in error");
        let from = decision.state;
        decision.append_reason(Some(event.id), format!("Processing failed: {err}."));
        decision.transition_to(DecisionState::Error, "awaiting operator")?;
        self.metrics
            .record_decision_transition(&from.to_string(), "ERROR");
        Ok(())
    }

    /// Considers a repoint for an already-triggered pair.
    async fn maybe_repoint(
        &self,
        mut decision: ProposalDecision,
        proposal: &Proposal,
        group: &EventGroup,
        event: &Event,
    ) -> Result<Option<DecisionOutcome>> {
        if !proposal.telescope.repoint_allowed {
            return Ok(None);
        }
        let (Some(current), Some(dispatched)) = (group.position, decision.position) else {
            return Ok(None);
        };
        let separation = current.separation_deg(&dispatched);
        if separation <= proposal.telescope.repoint_threshold_deg {
            return Ok(None);
        }

        decision.append_reason(
            Some(event.id),
            format!(
                "Updated position is {separation:.3} deg from the observed one (threshold {:.3}), repointing.",
                proposal.telescope.repoint_threshold_deg
            ),
        );
        let dispatch = match self
            .dispatcher
            .dispatch(&mut decision, proposal, group, event, DispatchReason::Repoint)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                // A failed repoint does not invalidate the original
                // observation; log it and leave the pair triggered.
                warn!(error = %err, "repoint dispatch failed");
                decision.append_reason(Some(event.id), format!("Repoint failed: {err}."));
                None
            }
        };

        let outcome = DecisionOutcome {
            trig_id: group.trig_id.clone(),
            proposal_id: proposal.id,
            proposal_code: proposal.code.clone(),
            state: decision.state,
            dispatch,
        };
        self.finish(decision, proposal).await?;
        Ok(Some(outcome))
    }

    /// Persists a resolved decision and publishes its notice.
    ///
    /// Notification failures are logged and counted, never propagated.
    async fn finish(&self, decision: ProposalDecision, proposal: &Proposal) -> Result<()> {
        let notice = DecisionNotice {
            decision_id: decision.id,
            trig_id: decision.trig_id.clone(),
            proposal_id: decision.proposal_id,
            proposal_code: proposal.code.clone(),
            state: decision.state,
            reason_summary: decision
                .reason_log
                .lines()
                .last()
                .unwrap_or_default()
                .to_string(),
        };
        self.decisions.upsert(decision)?;

        if let Err(err) = self.notifier.notify(&notice).await {
            warn!(error = %err, "decision notification dropped");
            self.metrics.record_notify_failure();
        }
        Ok(())
    }

    /// Operator action: clears an errored pair back to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecisionNotFound`] for an unknown pair and
    /// [`Error::InvalidStateTransition`] when the pair is not in `Error`.
    pub async fn clear_error(
        &self,
        trig_id: &str,
        proposal_id: ProposalId,
        operator: &str,
    ) -> Result<ProposalDecision> {
        let unit_lock = self.locks.lock_for(trig_id)?;
        let _guard = unit_lock.lock().await;

        let mut decision = self.require_decision(trig_id, proposal_id)?;
        decision.transition_to(
            DecisionState::Pending,
            format!("error cleared by {operator}"),
        )?;
        self.decisions.upsert(decision.clone())?;
        Ok(decision)
    }

    /// Operator action: cancels a pair, closing it permanently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecisionNotFound`] for an unknown pair and
    /// [`Error::InvalidStateTransition`] when the pair is already cancelled.
    pub async fn cancel(
        &self,
        trig_id: &str,
        proposal_id: ProposalId,
        operator: &str,
    ) -> Result<ProposalDecision> {
        let unit_lock = self.locks.lock_for(trig_id)?;
        let _guard = unit_lock.lock().await;

        let mut decision = self.require_decision(trig_id, proposal_id)?;
        let from = decision.state;
        decision.transition_to(DecisionState::Cancelled, format!("cancelled by {operator}"))?;
        self.metrics
            .record_decision_transition(&from.to_string(), "CANCELLED");
        self.decisions.upsert(decision.clone())?;
        Ok(decision)
    }

    fn require_decision(&self, trig_id: &str, proposal_id: ProposalId) -> Result<ProposalDecision> {
        self.decisions
            .for_pair(trig_id, proposal_id)?
            .ok_or_else(|| Error::DecisionNotFound {
                trig_id: trig_id.to_string(),
                proposal_id,
            })
    }
}
