//! Science proposals and the registry snapshot.
//!
//! A [`Proposal`] bundles a worthiness threshold set, a telescope backend
//! binding, and trigger parameters under a stable numeric identity. The
//! [`ProposalRegistry`] is an immutable snapshot built from an ordered
//! registration list at process start: decision units read the snapshot
//! without locking, and a reload produces a *new* snapshot rather than
//! mutating shared state — in-flight units keep the view they started with.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use skyhook_core::{ProposalId, SkyPosition};

use crate::error::{Error, Result};
use crate::event::{AlertRole, Classification};
use crate::worthiness::SourceSettings;

/// Which alert roles a proposal is willing to trigger on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerMode {
    /// Only live alerts.
    Real,
    /// Only test alerts (dry runs against the scheduling service).
    Test,
    /// Both live and test alerts.
    Both,
}

impl TriggerMode {
    /// Returns true if the mode accepts an alert of the given role.
    #[must_use]
    pub const fn accepts(&self, role: AlertRole) -> bool {
        match self {
            Self::Both => true,
            Self::Real => matches!(role, AlertRole::Observation),
            Self::Test => matches!(role, AlertRole::Test),
        }
    }
}

/// The backend family a telescope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendKind {
    /// Multi-beam radio array: one submission may schedule several
    /// sub-array pointings, each with its own request id.
    MultiBeam,
    /// Compact array: one submission yields exactly one request id and the
    /// instrument has hard declination limits.
    CompactArray,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultiBeam => write!(f, "multi-beam"),
            Self::CompactArray => write!(f, "compact-array"),
        }
    }
}

/// Binds a proposal to the telescope it schedules on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelescopeBinding {
    /// Telescope name as known to the scheduling service.
    pub telescope: String,
    /// Backend family.
    pub kind: BackendKind,
    /// The scheduling service project this proposal books time under.
    pub project_id: String,
    /// Requested observation duration in seconds.
    pub default_duration_secs: f64,
    /// Whether an already-triggered pair may be re-pointed when the
    /// localization improves.
    #[serde(default)]
    pub repoint_allowed: bool,
    /// Minimum angular separation (degrees) between the dispatched position
    /// and a refined one before a repoint is warranted.
    #[serde(default = "default_repoint_threshold")]
    pub repoint_threshold_deg: f64,
    /// Fallback sub-array pointings used by multi-beam telescopes when an
    /// alert carries no localization (e.g. gravitational-wave early
    /// warnings).
    #[serde(default)]
    pub default_pointings: Vec<SkyPosition>,
}

fn default_repoint_threshold() -> f64 {
    4.0
}

/// A versioned science proposal definition.
///
/// Proposal identity is the numeric id: re-registering under an existing id
/// updates that proposal rather than creating a new one. Inactive proposals
/// are ineligible for new decisions but historical decisions referencing
/// them remain valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Stable numeric identity.
    pub id: ProposalId,
    /// Short human-readable identifier (e.g. `"MWA_GRB_SHORT"`).
    pub code: String,
    /// One-line description distinguishing this proposal from the others.
    pub description: String,
    /// The classification this proposal targets.
    pub classification: Classification,
    /// The telescope this proposal schedules on.
    pub telescope: TelescopeBinding,
    /// Which alert roles trigger this proposal.
    pub trigger_mode: TriggerMode,
    /// Evaluation priority; lower values are evaluated first.
    pub priority: i32,
    /// Only active proposals are eligible for new decisions.
    pub active: bool,
    /// Settings version recorded on every decision this proposal makes.
    pub version: String,
    /// Worthiness thresholds for the targeted classification.
    pub settings: SourceSettings,
}

#[derive(Debug)]
struct RegistryInner {
    /// Proposals sorted by `(priority, id)` for deterministic evaluation.
    proposals: Vec<Proposal>,
    by_id: HashMap<ProposalId, usize>,
}

/// An immutable snapshot of the registered proposals.
///
/// Cheap to clone; decision units hold a clone for the duration of their
/// unit of work.
#[derive(Debug, Clone)]
pub struct ProposalRegistry {
    inner: Arc<RegistryInner>,
}

impl ProposalRegistry {
    /// Builds a registry from an ordered registration list.
    ///
    /// A later registration with an id already seen updates the earlier
    /// entry in place (the proposal was edited, not duplicated).
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryLoad`] if the resulting active set is empty:
    /// the engine must fail startup loudly rather than silently evaluate
    /// nothing.
    pub fn load(registrations: Vec<Proposal>) -> Result<Self> {
        Self::build(registrations, Vec::new())
    }

    /// Builds a new snapshot from a fresh registration list.
    ///
    /// Proposals present in this snapshot but absent from the new list are
    /// carried forward deactivated, never deleted, so historical decisions
    /// keep a resolvable reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryLoad`] if the resulting active set is empty.
    pub fn reload(&self, registrations: Vec<Proposal>) -> Result<Self> {
        Self::build(registrations, self.inner.proposals.clone())
    }

    fn build(registrations: Vec<Proposal>, previous: Vec<Proposal>) -> Result<Self> {
        let mut by_id: HashMap<ProposalId, Proposal> = HashMap::new();

        for mut prior in previous {
            prior.active = false;
            by_id.insert(prior.id, prior);
        }
        for registration in registrations {
            by_id.insert(registration.id, registration);
        }

        if !by_id.values().any(|p| p.active) {
            return Err(Error::RegistryLoad {
                message: "no active proposals registered".into(),
            });
        }

        let mut proposals: Vec<Proposal> = by_id.into_values().collect();
        proposals.sort_by_key(|p| (p.priority, p.id));

        let by_id = proposals
            .iter()
            .enumerate()
            .map(|(index, p)| (p.id, index))
            .collect();

        Ok(Self {
            inner: Arc::new(RegistryInner { proposals, by_id }),
        })
    }

    /// Returns the proposal with the given id, active or not.
    #[must_use]
    pub fn get(&self, id: ProposalId) -> Option<&Proposal> {
        self.inner
            .by_id
            .get(&id)
            .map(|&index| &self.inner.proposals[index])
    }

    /// Returns the active proposals matching a classification and alert
    /// role, in `(priority, id)` order.
    #[must_use]
    pub fn matching(&self, classification: Classification, role: AlertRole) -> Vec<&Proposal> {
        self.inner
            .proposals
            .iter()
            .filter(|p| {
                p.active && p.classification == classification && p.trigger_mode.accepts(role)
            })
            .collect()
    }

    /// Returns all proposals in evaluation order.
    #[must_use]
    pub fn all(&self) -> &[Proposal] {
        &self.inner.proposals
    }

    /// Returns the number of active proposals.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.proposals.iter().filter(|p| p.active).count()
    }
}
