//! Persistence interfaces consumed by the core.
//!
//! The backing store is opaque: the core only reaches it through these async
//! traits, and every call may fail independently.

use crate::{
    AgentType, AttuneResult, Credential, CustomCriterion, LearnedPreferences,
    PreferenceCandidate, PromptConfig, SignalPreference, UserId, UserProfile, UserRecord,
};
use async_trait::async_trait;

/// Read side used by the context loader.
#[async_trait]
pub trait UserDataSource: Send + Sync {
    /// Fetch profile, criteria, signals, disqualifiers and prompt config.
    ///
    /// A failure here is fatal for a context load.
    async fn read_user_context(&self, user_id: UserId) -> AttuneResult<UserRecord>;

    /// Fetch the memory notes an agent keeps for this user.
    async fn read_memory_notes(
        &self,
        user_id: UserId,
        agent: AgentType,
    ) -> AttuneResult<Option<String>>;

    /// Fetch previously persisted learned preferences.
    async fn read_learned_preferences(
        &self,
        user_id: UserId,
    ) -> AttuneResult<Option<LearnedPreferences>>;
}

/// Write side for explicitly configured profile data.
///
/// Callers should go through a wrapper that invalidates the context cache
/// after each successful write.
#[async_trait]
pub trait UserDataWriter: Send + Sync {
    async fn write_profile(&self, user_id: UserId, profile: &UserProfile) -> AttuneResult<()>;

    async fn write_criteria(
        &self,
        user_id: UserId,
        criteria: &[CustomCriterion],
    ) -> AttuneResult<()>;

    async fn write_signals(
        &self,
        user_id: UserId,
        signals: &[SignalPreference],
    ) -> AttuneResult<()>;

    async fn write_disqualifiers(
        &self,
        user_id: UserId,
        disqualifiers: &[String],
    ) -> AttuneResult<()>;

    async fn write_prompt_config(
        &self,
        user_id: UserId,
        prompt_config: &PromptConfig,
    ) -> AttuneResult<()>;
}

/// Destination for flushed preference candidates.
#[async_trait]
pub trait PreferenceSink: Send + Sync {
    /// Persist one preference. Each key is written independently.
    async fn write_preference(
        &self,
        credential: &Credential,
        user_id: UserId,
        candidate: &PreferenceCandidate,
    ) -> AttuneResult<()>;
}
