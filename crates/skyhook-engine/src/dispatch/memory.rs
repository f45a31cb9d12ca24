//! In-memory telescope backend for testing.
//!
//! [`InMemoryBackend`] replays a script of canned responses and records
//! every request it receives, so tests can drive the dispatcher through
//! timeout, retry and rejection paths deterministically.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No persistence, no real scheduling
//! - **Single-process only**: Requests are not visible across processes

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{BackendResponse, ObservationRequest, TelescopeBackend};
use crate::error::{Error, Result};
use crate::proposal::BackendKind;

/// One scripted answer for the next submission.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Accept the observation with these backend request ids.
    Accept(Vec<String>),
    /// Refuse the observation definitively.
    Reject(String),
    /// Fail transiently, as a down or overloaded scheduler would.
    Unavailable(String),
    /// Never answer; lets the dispatcher's deadline fire.
    Hang,
}

#[derive(Debug, Default)]
struct BackendState {
    script: VecDeque<ScriptedResponse>,
    requests: Vec<ObservationRequest>,
}

/// Scripted backend for tests.
#[derive(Debug)]
pub struct InMemoryBackend {
    telescope: String,
    kind: BackendKind,
    state: Mutex<BackendState>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("backend script lock poisoned")
}

impl InMemoryBackend {
    /// Creates a backend that accepts everything with a single request id.
    #[must_use]
    pub fn new(telescope: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            telescope: telescope.into(),
            kind,
            state: Mutex::new(BackendState::default()),
        }
    }

    /// Appends one scripted response; consumed in FIFO order.
    ///
    /// With an empty script every submission is accepted with a generated
    /// request id.
    pub fn push_response(&self, response: ScriptedResponse) {
        if let Ok(mut state) = self.state.lock() {
            state.script.push_back(response);
        }
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ObservationRequest> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    /// Number of submissions received.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.state.lock().map(|s| s.requests.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TelescopeBackend for InMemoryBackend {
    fn telescope(&self) -> &str {
        &self.telescope
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn submit(&self, request: &ObservationRequest) -> Result<BackendResponse> {
        let scripted = {
            let mut state = self.state.lock().map_err(poison_err)?;
            state.requests.push(request.clone());
            state.script.pop_front()
        };

        match scripted {
            None => Ok(BackendResponse {
                accepted: true,
                request_ids: vec![format!("{}-{}", self.telescope, ulid::Ulid::new())],
                message: None,
                payload: serde_json::json!({"status": "scheduled"}),
            }),
            Some(ScriptedResponse::Accept(request_ids)) => Ok(BackendResponse {
                accepted: true,
                request_ids,
                message: None,
                payload: serde_json::json!({"status": "scheduled"}),
            }),
            Some(ScriptedResponse::Reject(message)) => Err(Error::BackendRejected {
                telescope: self.telescope.clone(),
                status: Some(422),
                message,
            }),
            Some(ScriptedResponse::Unavailable(message)) => Err(Error::BackendUnavailable {
                telescope: self.telescope.clone(),
                message,
            }),
            Some(ScriptedResponse::Hang) => {
                std::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
        }
    }
}
