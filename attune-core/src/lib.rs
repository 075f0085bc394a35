//! attune Core - Shared Types
//!
//! Data model, preference schema, errors, configuration and the persistence
//! interfaces every other attune crate depends on. No I/O happens here.

pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod identity;
pub mod persistence;
pub mod preference;
pub mod profile;

pub use config::{
    AttuneConfig, DEFAULT_CACHE_TTL, DEFAULT_DEBOUNCE_WINDOW, DEFAULT_MEMORY_BLOCK_MAX_BYTES,
    DEFAULT_MIN_APPLIED_CONFIDENCE, DEFAULT_SWEEP_INTERVAL,
};
pub use credential::{Credential, CredentialChain, CredentialProvider, StaticCredential};
pub use error::{
    AttuneError, AttuneResult, CacheError, ConfigError, PersistenceError, TrackerError,
    ValidationError,
};
pub use event::{InteractionEvent, ResearchDepth};
pub use identity::{Clock, SystemClock, Timestamp, UserId};
pub use persistence::{PreferenceSink, UserDataSource, UserDataWriter};
pub use preference::{
    CoverageDepth, LearnedPreferences, PreferenceCandidate, PreferenceKey, PreferenceNamespace,
    PreferenceRecord, PreferenceSchema, PreferenceSource, PreferenceValue, ValueKind,
};
pub use profile::{
    AgentType, CachedContext, CustomCriterion, Importance, PromptConfig, SignalPreference,
    UserProfile, UserRecord,
};
