//! In-memory stores for decisions and observations.
//!
//! Both stores guard their maps with a [`RwLock`] and surface poisoning as a
//! storage error, matching the grouper. The decision store enforces the
//! one-decision-per-(trigger id, proposal) uniqueness the engine relies on
//! for idempotency; the observation store enforces request-id uniqueness so
//! a duplicate backend acknowledgement cannot mint a second record.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use skyhook_core::{DecisionId, ProposalId};

use crate::decision::ProposalDecision;
use crate::error::{Error, Result};
use crate::observation::Observation;

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("store lock poisoned")
}

#[derive(Debug, Default)]
struct DecisionMaps {
    by_id: HashMap<DecisionId, ProposalDecision>,
    by_pair: HashMap<(String, ProposalId), DecisionId>,
}

/// Store of trigger decisions, unique per (trigger id, proposal).
#[derive(Debug, Default)]
pub struct DecisionStore {
    maps: RwLock<DecisionMaps>,
}

impl DecisionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the decision for its (trigger id, proposal) pair.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn upsert(&self, decision: ProposalDecision) -> Result<()> {
        let mut maps = self.maps.write().map_err(poison_err)?;
        maps.by_pair
            .insert((decision.trig_id.clone(), decision.proposal_id), decision.id);
        maps.by_id.insert(decision.id, decision);
        Ok(())
    }

    /// Looks up the decision for a (trigger id, proposal) pair.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn for_pair(&self, trig_id: &str, proposal_id: ProposalId) -> Result<Option<ProposalDecision>> {
        let maps = self.maps.read().map_err(poison_err)?;
        Ok(maps
            .by_pair
            .get(&(trig_id.to_string(), proposal_id))
            .and_then(|id| maps.by_id.get(id))
            .cloned())
    }

    /// Looks up a decision by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn get(&self, id: DecisionId) -> Result<Option<ProposalDecision>> {
        let maps = self.maps.read().map_err(poison_err)?;
        Ok(maps.by_id.get(&id).cloned())
    }

    /// Returns every decision for a trigger id, ordered by proposal id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn all_for_group(&self, trig_id: &str) -> Result<Vec<ProposalDecision>> {
        let maps = self.maps.read().map_err(poison_err)?;
        let mut decisions: Vec<ProposalDecision> = maps
            .by_id
            .values()
            .filter(|d| d.trig_id == trig_id)
            .cloned()
            .collect();
        decisions.sort_by_key(|d| d.proposal_id);
        Ok(decisions)
    }

    /// Number of stored decisions.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let maps = self.maps.read().map_err(poison_err)?;
        Ok(maps.by_id.len())
    }

    /// Whether the store holds no decisions.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Store of dispatched observations, keyed by backend request id.
#[derive(Debug, Default)]
pub struct ObservationStore {
    observations: RwLock<HashMap<String, Observation>>,
}

impl ObservationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new observation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateObservation`] if the request id is already
    /// recorded, or a storage error if the lock is poisoned.
    pub fn insert(&self, observation: Observation) -> Result<()> {
        let mut observations = self.observations.write().map_err(poison_err)?;
        if observations.contains_key(&observation.request_id) {
            return Err(Error::DuplicateObservation {
                request_id: observation.request_id,
            });
        }
        observations.insert(observation.request_id.clone(), observation);
        Ok(())
    }

    /// Looks up an observation by backend request id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn get(&self, request_id: &str) -> Result<Option<Observation>> {
        let observations = self.observations.read().map_err(poison_err)?;
        Ok(observations.get(request_id).cloned())
    }

    /// Returns all observations recorded for a decision, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn for_decision(&self, decision_id: DecisionId) -> Result<Vec<Observation>> {
        let observations = self.observations.read().map_err(poison_err)?;
        let mut found: Vec<Observation> = observations
            .values()
            .filter(|o| o.decision_id == decision_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.request_id.cmp(&b.request_id)));
        Ok(found)
    }

    /// Attaches the backend's full response payload to an observation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the request id is unknown or the lock is
    /// poisoned.
    pub fn attach_response(&self, request_id: &str, response: serde_json::Value) -> Result<()> {
        let mut observations = self.observations.write().map_err(poison_err)?;
        let observation = observations
            .get_mut(request_id)
            .ok_or_else(|| Error::storage(format!("unknown observation request id {request_id}")))?;
        observation.response = Some(response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchReason;
    use skyhook_core::EventId;

    #[test]
    fn decision_store_is_unique_per_pair() -> Result<()> {
        let store = DecisionStore::new();
        let first = ProposalDecision::new("T1", ProposalId::new(7), "1.0.0");
        let first_id = first.id;
        store.upsert(first)?;

        let replacement = ProposalDecision::new("T1", ProposalId::new(7), "1.0.1");
        let replacement_id = replacement.id;
        store.upsert(replacement)?;

        let found = store.for_pair("T1", ProposalId::new(7))?.unwrap();
        assert_eq!(found.id, replacement_id);
        assert_ne!(found.id, first_id);
        Ok(())
    }

    #[test]
    fn decisions_for_group_sort_by_proposal_id() -> Result<()> {
        let store = DecisionStore::new();
        store.upsert(ProposalDecision::new("T1", ProposalId::new(9), "1"))?;
        store.upsert(ProposalDecision::new("T1", ProposalId::new(2), "1"))?;
        store.upsert(ProposalDecision::new("T2", ProposalId::new(1), "1"))?;

        let decisions = store.all_for_group("T1")?;
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].proposal_id, ProposalId::new(2));
        assert_eq!(decisions[1].proposal_id, ProposalId::new(9));
        Ok(())
    }

    fn observation(request_id: &str, decision_id: DecisionId) -> Observation {
        Observation::new(
            request_id,
            "mwa",
            decision_id,
            EventId::generate(),
            DispatchReason::FirstObservation,
            900.0,
        )
    }

    #[test]
    fn duplicate_request_id_is_rejected() -> Result<()> {
        let store = ObservationStore::new();
        let decision_id = DecisionId::generate();
        store.insert(observation("obs-1", decision_id))?;

        let err = store.insert(observation("obs-1", decision_id)).unwrap_err();
        assert!(matches!(err, Error::DuplicateObservation { .. }));
        Ok(())
    }

    #[test]
    fn response_attaches_after_the_fact() -> Result<()> {
        let store = ObservationStore::new();
        let decision_id = DecisionId::generate();
        store.insert(observation("obs-1", decision_id))?;

        store.attach_response("obs-1", serde_json::json!({"status": "scheduled"}))?;
        let found = store.get("obs-1")?.unwrap();
        assert_eq!(found.response.unwrap()["status"], "scheduled");
        Ok(())
    }

    #[test]
    fn observations_filter_by_decision() -> Result<()> {
        let store = ObservationStore::new();
        let mine = DecisionId::generate();
        let other = DecisionId::generate();
        store.insert(observation("obs-1", mine))?;
        store.insert(observation("obs-2", mine))?;
        store.insert(observation("obs-3", other))?;

        assert_eq!(store.for_decision(mine)?.len(), 2);
        assert_eq!(store.for_decision(other)?.len(), 1);
        Ok(())
    }
}
