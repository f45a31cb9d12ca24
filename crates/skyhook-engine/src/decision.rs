//! Trigger decisions and their state machine.
//!
//! One [`ProposalDecision`] exists per (trigger id, proposal) pair. Its
//! state machine enforces the safety properties the engine relies on:
//! `Triggered` and `Cancelled` are terminal for automatic processing, and an
//! `Error` decision stays parked until an operator clears it.
//!
//! The reason log is append-only: every evaluation, transition and operator
//! action adds a timestamped line, and nothing ever rewrites earlier lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skyhook_core::{DecisionId, EventId, ProposalId, SkyPosition};

use crate::error::{Error, Result};

/// Decision state for one (trigger id, proposal) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionState {
    /// Awaiting a human call or further evidence.
    Pending,
    /// Evaluated as not worth an observation; may still be revisited by a
    /// later, better event.
    Ignored,
    /// Evaluation or dispatch failed; parked until an operator clears it.
    Error,
    /// An observation was dispatched and accepted.
    Triggered,
    /// An operator withdrew the pair; nothing automatic touches it again.
    Cancelled,
}

impl DecisionState {
    /// Single-letter audit code, used in observation names and log lines.
    #[must_use]
    pub const fn as_code(&self) -> char {
        match self {
            Self::Pending => 'P',
            Self::Ignored => 'I',
            Self::Error => 'E',
            Self::Triggered => 'T',
            Self::Cancelled => 'C',
        }
    }

    /// Whether automatic processing may still change this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Triggered | Self::Cancelled)
    }

    /// Validates a state transition.
    ///
    /// `Pending` and `Ignored` move freely (including to themselves, so a
    /// re-evaluation that reaches the same verdict is not an error).
    /// `Error` only leaves via an operator action to `Pending` or
    /// `Cancelled`. `Triggered` only ever moves to `Cancelled`, and
    /// `Cancelled` is final.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Pending | Self::Ignored => true,
            Self::Error => matches!(target, Self::Pending | Self::Cancelled),
            Self::Triggered => matches!(target, Self::Cancelled),
            Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for DecisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Ignored => "IGNORED",
            Self::Error => "ERROR",
            Self::Triggered => "TRIGGERED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// The auditable decision record for one (trigger id, proposal) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDecision {
    /// Unique decision identifier.
    pub id: DecisionId,
    /// The trigger id this decision belongs to.
    pub trig_id: String,
    /// The proposal evaluated.
    pub proposal_id: ProposalId,
    /// Version of the proposal at creation time; a later registry reload
    /// never rewrites it.
    pub proposal_version: String,
    /// Current decision state.
    pub state: DecisionState,
    /// Append-only audit trail of timestamped reason lines.
    pub reason_log: String,
    /// Position the decision was last evaluated or dispatched against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SkyPosition>,
    /// Observation duration used at dispatch, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// When the decision was created (UTC).
    pub created_at: DateTime<Utc>,
    /// When the decision last changed (UTC).
    pub updated_at: DateTime<Utc>,
}

impl ProposalDecision {
    /// Creates a fresh `Pending` decision for a (trigger id, proposal) pair.
    #[must_use]
    pub fn new(trig_id: impl Into<String>, proposal_id: ProposalId, proposal_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DecisionId::generate(),
            trig_id: trig_id.into(),
            proposal_id,
            proposal_version: proposal_version.into(),
            state: DecisionState::Pending,
            reason_log: String::new(),
            position: None,
            duration_secs: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a timestamped line to the reason log.
    pub fn append_reason(&mut self, event_id: Option<EventId>, message: impl AsRef<str>) {
        let now = Utc::now();
        match event_id {
            Some(id) => {
                self.reason_log
                    .push_str(&format!("{now}: Event ID {id}: {}\n", message.as_ref()));
            }
            None => {
                self.reason_log
                    .push_str(&format!("{now}: {}\n", message.as_ref()));
            }
        }
        self.updated_at = now;
    }

    /// Appends an already-formatted block of reason lines verbatim.
    ///
    /// Used for worthiness logs, which carry their own timestamps.
    pub fn append_raw(&mut self, block: &str) {
        self.reason_log.push_str(block);
        self.updated_at = Utc::now();
    }

    /// Moves the decision to `target`, recording the transition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] when the state machine
    /// forbids the move; the decision is left untouched.
    pub fn transition_to(&mut self, target: DecisionState, reason: impl AsRef<str>) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
                reason: reason.as_ref().to_string(),
            });
        }
        if self.state != target {
            self.append_reason(
                None,
                format!("State changed {} -> {}: {}", self.state, target, reason.as_ref()),
            );
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_anywhere() {
        for target in [
            DecisionState::Pending,
            DecisionState::Ignored,
            DecisionState::Error,
            DecisionState::Triggered,
            DecisionState::Cancelled,
        ] {
            assert!(DecisionState::Pending.can_transition_to(target));
        }
    }

    #[test]
    fn triggered_only_cancels() {
        assert!(DecisionState::Triggered.can_transition_to(DecisionState::Cancelled));
        assert!(!DecisionState::Triggered.can_transition_to(DecisionState::Pending));
        assert!(!DecisionState::Triggered.can_transition_to(DecisionState::Triggered));
        assert!(DecisionState::Triggered.is_terminal());
    }

    #[test]
    fn cancelled_is_final() {
        for target in [
            DecisionState::Pending,
            DecisionState::Ignored,
            DecisionState::Error,
            DecisionState::Triggered,
            DecisionState::Cancelled,
        ] {
            assert!(!DecisionState::Cancelled.can_transition_to(target));
        }
    }

    #[test]
    fn error_needs_an_operator() {
        assert!(DecisionState::Error.can_transition_to(DecisionState::Pending));
        assert!(DecisionState::Error.can_transition_to(DecisionState::Cancelled));
        assert!(!DecisionState::Error.can_transition_to(DecisionState::Triggered));
        assert!(!DecisionState::Error.can_transition_to(DecisionState::Ignored));
    }

    #[test]
    fn invalid_transition_leaves_decision_untouched() {
        let mut decision = ProposalDecision::new("T1", ProposalId::new(1), "1.0.0");
        decision
            .transition_to(DecisionState::Triggered, "observation accepted")
            .unwrap();
        let log_before = decision.reason_log.clone();

        let err = decision
            .transition_to(DecisionState::Pending, "should fail")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(decision.state, DecisionState::Triggered);
        assert_eq!(decision.reason_log, log_before);
    }

    #[test]
    fn reason_log_is_append_only_and_timestamped() {
        let mut decision = ProposalDecision::new("T1", ProposalId::new(1), "1.0.0");
        decision.append_reason(None, "first");
        decision.append_reason(None, "second");
        let lines: Vec<&str> = decision.reason_log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": first"));
        assert!(lines[1].ends_with(": second"));
    }

    #[test]
    fn state_codes() {
        assert_eq!(DecisionState::Pending.as_code(), 'P');
        assert_eq!(DecisionState::Triggered.as_code(), 'T');
        assert_eq!(DecisionState::Cancelled.as_code(), 'C');
    }
}
