//! Error types and result aliases shared across Skyhook components.
//!
//! Errors are structured for programmatic handling and include enough
//! context to debug a failed ingestion without reaching for the raw payload.

/// The result type used throughout Skyhook core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A sky coordinate was outside its valid range.
    #[error("invalid coordinate: {message}")]
    InvalidCoordinate {
        /// Description of the offending value.
        message: String,
    },
}
