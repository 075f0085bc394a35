//! Configuration types

use crate::{AttuneError, AttuneResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time-to-live for cached user contexts.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default interval between background eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default quiet period before tracked events are flushed.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(3000);

/// Default upper bound on the memory-notes block, in bytes.
pub const DEFAULT_MEMORY_BLOCK_MAX_BYTES: usize = 1800;

/// Default minimum confidence for a learned preference to shape prompt text.
pub const DEFAULT_MIN_APPLIED_CONFIDENCE: f32 = 0.6;

/// Knobs shared by the cache, tracker and loader.
///
/// Durations serialize as whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttuneConfig {
    /// Age after which a cached context is treated as absent.
    #[serde(with = "duration_ms")]
    pub cache_ttl: Duration,
    /// How often the background sweep evicts expired contexts.
    #[serde(with = "duration_ms")]
    pub sweep_interval: Duration,
    /// Quiet period after the last tracked event before a flush runs.
    #[serde(with = "duration_ms")]
    pub debounce_window: Duration,
    /// Memory blocks larger than this are dropped, not truncated.
    pub memory_block_max_bytes: usize,
    /// Learned preferences below this confidence are kept but not rendered.
    pub min_applied_confidence: f32,
}

impl Default for AttuneConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            memory_block_max_bytes: DEFAULT_MEMORY_BLOCK_MAX_BYTES,
            min_applied_confidence: DEFAULT_MIN_APPLIED_CONFIDENCE,
        }
    }
}

impl AttuneConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Set the memory block byte cap.
    pub fn with_memory_block_max_bytes(mut self, max: usize) -> Self {
        self.memory_block_max_bytes = max;
        self
    }

    /// Set the minimum applied confidence.
    pub fn with_min_applied_confidence(mut self, confidence: f32) -> Self {
        self.min_applied_confidence = confidence;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ATTUNE_CACHE_TTL_SECS` (default: 300)
    /// - `ATTUNE_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `ATTUNE_DEBOUNCE_MS` (default: 3000)
    /// - `ATTUNE_MEMORY_BLOCK_MAX_BYTES` (default: 1800)
    /// - `ATTUNE_MIN_APPLIED_CONFIDENCE` (default: 0.6)
    ///
    /// Unparseable values, and zero for any duration, fall back to the
    /// default for that field.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_ttl: env_nonzero("ATTUNE_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            sweep_interval: env_nonzero("ATTUNE_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            debounce_window: env_nonzero("ATTUNE_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce_window),
            memory_block_max_bytes: env_parse("ATTUNE_MEMORY_BLOCK_MAX_BYTES")
                .unwrap_or(defaults.memory_block_max_bytes),
            min_applied_confidence: env_parse("ATTUNE_MIN_APPLIED_CONFIDENCE")
                .unwrap_or(defaults.min_applied_confidence),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - all durations are positive
    /// - memory_block_max_bytes > 0
    /// - min_applied_confidence in [0.0, 1.0]
    pub fn validate(&self) -> AttuneResult<()> {
        for (field, value) in [
            ("cache_ttl", self.cache_ttl),
            ("sweep_interval", self.sweep_interval),
            ("debounce_window", self.debounce_window),
        ] {
            if value.is_zero() {
                return Err(invalid(field, format!("{:?}", value), "must be positive"));
            }
        }

        if self.memory_block_max_bytes == 0 {
            return Err(invalid(
                "memory_block_max_bytes",
                self.memory_block_max_bytes.to_string(),
                "must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.min_applied_confidence) {
            return Err(invalid(
                "min_applied_confidence",
                self.min_applied_confidence.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_nonzero(name: &str) -> Option<u64> {
    env_parse::<u64>(name).filter(|value| *value > 0)
}

fn invalid(field: &str, value: String, reason: &str) -> AttuneError {
    AttuneError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// =============================================================================
// TESTS
// =============================================================================
