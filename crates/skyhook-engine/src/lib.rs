//! # skyhook-engine
//!
//! Event-to-decision-to-trigger engine for rapid telescope follow-up of
//! astronomical transient alerts.
//!
//! This crate implements the triggering domain, providing:
//!
//! - **Event Grouping**: Deduplication of alert streams by trigger id, with
//!   monotonic position refinement
//! - **Proposal Registry**: Immutable snapshots of science proposals,
//!   evaluated in a deterministic priority order
//! - **Decision Engine**: An auditable state machine per (trigger id,
//!   proposal) pair, with idempotent trigger decisions
//! - **Trigger Dispatch**: At-most-once observation submission with bounded
//!   retry and per-backend deadlines
//!
//! ## Core Concepts
//!
//! - **Event**: One normalized transient alert (GRB, GW, neutrino)
//! - **Event group**: All events sharing a trigger id; the unit of follow-up
//! - **Proposal**: A science program with thresholds and a telescope binding
//! - **Decision**: The persistent, append-only verdict for one
//!   (trigger id, proposal) pair
//!
//! ## Guarantees
//!
//! - **At-most-once**: A decision never dispatches a second first
//!   observation, no matter how many alerts re-deliver
//! - **Serialized per trigger**: All processing for one trigger id runs
//!   under a single async lock; distinct ids proceed in parallel
//! - **Explainable**: Every verdict, transition and operator action is a
//!   timestamped line in the decision's reason log
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use skyhook_engine::config::EngineConfig;
//! use skyhook_engine::dispatch::memory::InMemoryBackend;
//! use skyhook_engine::dispatch::Dispatcher;
//! use skyhook_engine::engine::DecisionEngine;
//! use skyhook_engine::error::Result;
//! use skyhook_engine::event::{AlertRole, Classification, Event, Observatory};
//! use skyhook_engine::metrics::EngineMetrics;
//! use skyhook_engine::notify::NoopNotifier;
//! use skyhook_engine::proposal::{BackendKind, ProposalRegistry};
//! use skyhook_engine::store::{DecisionStore, ObservationStore};
//!
//! # async fn run(proposals: Vec<skyhook_engine::proposal::Proposal>) -> Result<()> {
//! let registry = ProposalRegistry::load(proposals)?;
//! let backend = Arc::new(InMemoryBackend::new("mwa", BackendKind::MultiBeam));
//! let dispatcher = Dispatcher::new(
//!     vec![backend],
//!     Arc::new(ObservationStore::new()),
//!     EngineConfig::default(),
//!     EngineMetrics::new(),
//! );
//! let engine = DecisionEngine::new(
//!     registry,
//!     Arc::new(DecisionStore::new()),
//!     dispatcher,
//!     Arc::new(NoopNotifier),
//! );
//!
//! let event = Event::new(
//!     "GRB240101A",
//!     Observatory::Swift,
//!     Classification::Grb,
//!     AlertRole::Observation,
//!     Utc::now(),
//! );
//! let outcomes = engine.ingest(event).await?;
//! for outcome in outcomes {
//!     println!("{}: {}", outcome.proposal_code, outcome.state);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod decision;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod grouper;
pub mod metrics;
pub mod notify;
pub mod observation;
pub mod proposal;
pub mod store;
pub mod worthiness;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EngineConfig, RetryConfig};
    pub use crate::decision::{DecisionState, ProposalDecision};
    pub use crate::dispatch::{
        BackendResponse, DispatchOutcome, DispatchReason, Dispatcher, ObservationRequest,
        TelescopeBackend,
    };
    pub use crate::engine::{DecisionEngine, DecisionOutcome};
    pub use crate::error::{Error, Result};
    pub use crate::event::{AlertRole, Classification, Event, EventGroup, Observatory};
    pub use crate::grouper::EventGrouper;
    pub use crate::metrics::EngineMetrics;
    pub use crate::notify::{AlertNotifier, DecisionNotice, NoopNotifier};
    pub use crate::observation::Observation;
    pub use crate::proposal::{Proposal, ProposalRegistry, TelescopeBinding, TriggerMode};
    pub use crate::store::{DecisionStore, ObservationStore};
    pub use crate::worthiness::{Assessment, SourceSettings};
}
