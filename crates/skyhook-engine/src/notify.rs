//! Decision notifications.
//!
//! The engine publishes a [`DecisionNotice`] after every decision
//! resolution. Delivery is best-effort: a failed notification is logged and
//! counted but never rolls back or blocks the decision it describes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use skyhook_core::{DecisionId, ProposalId};

use crate::decision::DecisionState;
use crate::error::Result;

/// What happened to one (trigger id, proposal) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionNotice {
    /// The decision that changed.
    pub decision_id: DecisionId,
    /// The trigger id involved.
    pub trig_id: String,
    /// The proposal involved.
    pub proposal_id: ProposalId,
    /// The proposal's short code, for human-readable channels.
    pub proposal_code: String,
    /// State after resolution.
    pub state: DecisionState,
    /// Last reason line, as a one-line summary.
    pub reason_summary: String,
}

/// Sink for decision notifications (email, SMS, chat relays).
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Delivers one notice.
    ///
    /// # Errors
    ///
    /// Returns an error when delivery fails; the caller logs and drops it.
    async fn notify(&self, notice: &DecisionNotice) -> Result<()>;
}

/// Notifier that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl AlertNotifier for NoopNotifier {
    async fn notify(&self, _notice: &DecisionNotice) -> Result<()> {
        Ok(())
    }
}

/// Notifier that records every notice, with an optional scripted failure.
///
/// Used by tests to assert the fan-out order and the engine's tolerance of
/// delivery failures.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: std::sync::Mutex<Vec<DecisionNotice>>,
    fail: std::sync::atomic::AtomicBool,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent delivery fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns a copy of all notices recorded so far.
    #[must_use]
    pub fn notices(&self) -> Vec<DecisionNotice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, notice: &DecisionNotice) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::Error::storage("scripted notifier failure"));
        }
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
        Ok(())
    }
}
