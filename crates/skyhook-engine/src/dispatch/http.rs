//! HTTP telescope backends.
//!
//! Talks to facility scheduling APIs over JSON. Client errors (4xx) are
//! definitive refusals and never retry; server errors, connect failures and
//! timeouts surface as transient faults for the dispatcher's retry loop.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{BackendResponse, ObservationRequest, TelescopeBackend};
use crate::error::{Error, Result};
use crate::proposal::BackendKind;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A facility scheduling API reachable over HTTP.
pub struct HttpBackend {
    telescope: String,
    kind: BackendKind,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Creates a backend for a multi-beam facility.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the HTTP client cannot be built.
    pub fn multi_beam(telescope: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        Self::build(telescope, BackendKind::MultiBeam, endpoint)
    }

    /// Creates a backend for a compact-array facility.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the HTTP client cannot be built.
    pub fn compact_array(
        telescope: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self> {
        Self::build(telescope, BackendKind::CompactArray, endpoint)
    }

    fn build(
        telescope: impl Into<String>,
        kind: BackendKind,
        endpoint: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::storage(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            telescope: telescope.into(),
            kind,
            endpoint: endpoint.into(),
            api_key: None,
            client,
        })
    }

    /// Attaches an API key sent as a bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Pulls backend request ids out of a response payload.
    ///
    /// Accepts either `{"requestIds": [...]}` or a single `{"requestId": ...}`.
    fn request_ids(payload: &Value) -> Vec<String> {
        if let Some(ids) = payload.get("requestIds").and_then(Value::as_array) {
            return ids
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }
        payload
            .get("requestId")
            .and_then(Value::as_str)
            .map(|id| vec![id.to_string()])
            .unwrap_or_default()
    }
}

#[async_trait]
impl TelescopeBackend for HttpBackend {
    fn telescope(&self) -> &str {
        &self.telescope
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn submit(&self, request: &ObservationRequest) -> Result<BackendResponse> {
        let mut http_request = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await.map_err(|e| {
            Error::BackendUnavailable {
                telescope: self.telescope.clone(),
                message: format!("submission failed: {e}"),
            }
        })?;

        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        debug!(%status, "backend responded");

        if status.is_client_error() {
            return Err(Error::BackendRejected {
                telescope: self.telescope.clone(),
                status: Some(status.as_u16()),
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("observation refused")
                    .to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::BackendUnavailable {
                telescope: self.telescope.clone(),
                message: format!("backend returned {status}"),
            });
        }

        Ok(BackendResponse {
            accepted: true,
            request_ids: Self::request_ids(&payload),
            message: payload
                .get("message")
                .and_then(Value::as_str)
                .map(String::from),
            payload,
        })
    }
}
