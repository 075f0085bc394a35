//! Error types for attune operations

use crate::UserId;
use thiserror::Error;

/// Persistence layer errors.
///
/// Every variant is transient from the core's point of view: reads are retried
/// on the next request and writes on the next flush cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Persistence backend unreachable during {operation}: {reason}")]
    Unreachable { operation: String, reason: String },

    #[error("No stored context for user {user_id}")]
    NotFound { user_id: UserId },

    #[error("Write rejected for preference {key}: {reason}")]
    WriteRejected { key: String, reason: String },

    #[error("Stored data for user {user_id} is malformed: {reason}")]
    Malformed { user_id: UserId, reason: String },
}

/// Cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Preference tracker errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Tracker state lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid preference key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Preference {key} expects a {expected} value, got {got}")]
    SchemaMismatch {
        key: String,
        expected: String,
        got: String,
    },

    #[error("Confidence {value} for {key} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange { key: String, value: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all attune errors.
#[derive(Debug, Clone, Error)]
pub enum AttuneError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl AttuneError {
    /// Whether the failure is expected to clear up on the next natural trigger.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AttuneError::Persistence(PersistenceError::Unreachable { .. })
                | AttuneError::Persistence(PersistenceError::WriteRejected { .. })
        )
    }
}

/// Result type alias for attune operations.
pub type AttuneResult<T> = Result<T, AttuneError>;

// =============================================================================
// TESTS
// =============================================================================
