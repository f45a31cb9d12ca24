//! Strongly-typed identifiers for Skyhook entities.
//!
//! Identifiers generated by Skyhook itself (events, decisions) are ULIDs:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Lexicographically sortable**: ULIDs encode creation time and sort naturally
//! - **Globally unique**: No coordination required for generation
//!
//! Proposal identity is different: it is a small, stable, operator-assigned
//! number that survives re-registration of the proposal definition, so it is
//! a plain numeric newtype rather than a ULID.
//!
//! # Example
//!
//! ```rust
//! use skyhook_core::id::{DecisionId, EventId, ProposalId};
//!
//! let event = EventId::generate();
//! let decision = DecisionId::generate();
//! let proposal = ProposalId::new(12);
//!
//! // IDs are different types - this won't compile:
//! // let wrong: EventId = decision;
//! # let _ = (event, decision, proposal);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

macro_rules! ulid_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a new unique identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Creates an identifier from a raw ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the creation timestamp encoded in the ID.
            #[must_use]
            pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
                let ms = self.0.timestamp_ms();
                i64::try_from(ms)
                    .ok()
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .unwrap_or_else(chrono::Utc::now)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ulid::from_string(s)
                    .map(Self)
                    .map_err(|e| Error::InvalidId {
                        message: format!(concat!("invalid ", $label, " ID '{}': {}"), s, e),
                    })
            }
        }
    };
}

ulid_id! {
    /// A unique identifier for one normalized alert event.
    ///
    /// Assigned by Skyhook at ingestion; distinct from the externally
    /// assigned trigger id, which may collide across unrelated sources.
    EventId, "event"
}

ulid_id! {
    /// A unique identifier for a proposal decision audit record.
    DecisionId, "decision"
}

/// The stable numeric identity of a science proposal.
///
/// Re-registering a proposal under an existing number updates that proposal
/// in place rather than creating a new one, so historical decisions keep a
/// valid reference across edits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProposalId(u32);

impl ProposalId {
    /// Creates a proposal ID from its stable number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProposalId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
