//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::proposal::BackendKind;

/// Retry behaviour for transient dispatch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total submission attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    #[serde(with = "humantime_millis")]
    pub min_backoff: Duration,
    /// Backoff ceiling.
    #[serde(with = "humantime_millis")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for a zero-based retry index, capped at the
    /// configured ceiling.
    #[must_use]
    pub fn backoff_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Retry policy for transient backend failures.
    pub retry: RetryConfig,
    /// Per-attempt submission deadline for multi-beam backends.
    #[serde(with = "humantime_millis")]
    pub multi_beam_timeout: Duration,
    /// Per-attempt submission deadline for compact-array backends.
    #[serde(with = "humantime_millis")]
    pub compact_array_timeout: Duration,
    /// When true, backends are told to validate but not schedule.
    pub pretend: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            multi_beam_timeout: Duration::from_secs(30),
            compact_array_timeout: Duration::from_secs(60),
            pretend: false,
        }
    }
}

impl EngineConfig {
    /// Per-attempt deadline for a backend family.
    #[must_use]
    pub const fn timeout_for(&self, kind: BackendKind) -> Duration {
        match kind {
            BackendKind::MultiBeam => self.multi_beam_timeout,
            BackendKind::CompactArray => self.compact_array_timeout,
        }
    }
}

/// Serializes durations as integer milliseconds.
mod humantime_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
