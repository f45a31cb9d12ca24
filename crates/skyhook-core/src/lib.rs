//! # skyhook-core
//!
//! Core abstractions for the Skyhook transient follow-up engine.
//!
//! This crate provides the foundational types used across all Skyhook
//! components:
//!
//! - **Identifiers**: Strongly-typed IDs for events, decisions, and proposals
//! - **Sky Positions**: Coordinates with uncertainty and refinement semantics
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured logging bootstrap
//!
//! ## Crate Boundary
//!
//! `skyhook-core` is the only crate allowed to define shared primitives.
//! Engine logic (grouping, decisions, dispatch) lives in `skyhook-engine`.
//!
//! ## Example
//!
//! ```rust
//! use skyhook_core::prelude::*;
//!
//! let event = EventId::generate();
//! let position = SkyPosition::new(83.63, 22.01, Some(0.5));
//! assert!(position.uncertainty_deg.is_some());
//! let _ = event;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;
pub mod skycoord;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use skyhook_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{DecisionId, EventId, ProposalId};
    pub use crate::skycoord::SkyPosition;
}

pub use error::{Error, Result};
pub use id::{DecisionId, EventId, ProposalId};
pub use skycoord::SkyPosition;
