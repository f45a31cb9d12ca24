//! Error types for the follow-up triggering engine.
//!
//! The taxonomy mirrors how failures propagate through a unit of work:
//!
//! - **Ignorable** inputs (empty trigger id, classification mismatch) stop
//!   processing of that item; siblings continue.
//! - **Retryable** backend failures ([`Error::BackendUnavailable`]) are
//!   retried with backoff and escalate to [`Error::DispatchExhausted`] once
//!   the retry budget is spent.
//! - **Decision errors** ([`Error::Worthiness`], [`Error::BackendRejected`])
//!   park a single (group, proposal) pair in the `Error` state without
//!   touching any other pair.
//! - **Fatal** startup failures ([`Error::RegistryLoad`]) abort the process;
//!   the engine must never run with zero proposals.

use skyhook_core::ProposalId;

/// The result type used throughout skyhook-engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An event arrived without a trigger id.
    #[error("event has an empty trigger id")]
    EmptyTriggerId,

    /// An event group was not found for a trigger id.
    #[error("event group not found: {trig_id}")]
    GroupNotFound {
        /// The trigger id that was looked up.
        trig_id: String,
    },

    /// A proposal decision was not found for a (group, proposal) pair.
    #[error("decision not found for trigger {trig_id}, proposal {proposal_id}")]
    DecisionNotFound {
        /// The group trigger id.
        trig_id: String,
        /// The proposal numeric id.
        proposal_id: ProposalId,
    },

    /// An invalid decision state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// A proposal's worthiness strategy failed on malformed science
    /// parameters.
    #[error("worthiness evaluation failed for proposal {proposal}: {message}")]
    Worthiness {
        /// The proposal code.
        proposal: String,
        /// Description of the failure.
        message: String,
    },

    /// The proposal registry could not be built.
    #[error("proposal registry load failed: {message}")]
    RegistryLoad {
        /// Description of the failure.
        message: String,
    },

    /// No backend is registered for a proposal's telescope binding.
    #[error("no backend configured for telescope: {telescope}")]
    BackendNotConfigured {
        /// The telescope name from the proposal binding.
        telescope: String,
    },

    /// The scheduling service rejected the request as invalid.
    ///
    /// Never retried: a validation failure will not heal on its own.
    #[error("backend {telescope} rejected request (status={status:?}): {message}")]
    BackendRejected {
        /// The telescope name.
        telescope: String,
        /// The HTTP status, when the rejection came over the wire.
        status: Option<u16>,
        /// The backend's human-readable message.
        message: String,
    },

    /// A transient backend failure (timeout, 5xx, connection error).
    #[error("backend {telescope} unavailable: {message}")]
    BackendUnavailable {
        /// The telescope name.
        telescope: String,
        /// Description of the failure.
        message: String,
    },

    /// The retry budget for a dispatch was exhausted.
    #[error("dispatch to {telescope} failed after {attempts} attempts: {message}")]
    DispatchExhausted {
        /// The telescope name.
        telescope: String,
        /// How many submit attempts were made.
        attempts: u32,
        /// The last failure observed.
        message: String,
    },

    /// A backend returned a request id that already exists.
    #[error("duplicate observation request id: {request_id}")]
    DuplicateObservation {
        /// The backend-assigned request id.
        request_id: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from skyhook-core.
    #[error("core error: {0}")]
    Core(#[from] skyhook_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a worthiness evaluation error for a proposal.
    #[must_use]
    pub fn worthiness(proposal: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Worthiness {
            proposal: proposal.into(),
            message: message.into(),
        }
    }

    /// Returns true if the failure is transient and dispatch may retry it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}
