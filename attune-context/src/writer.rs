//! Profile writes that keep the context cache honest.

use std::sync::Arc;

use async_trait::async_trait;
use attune_cache::ContextCache;
use attune_core::{
    AttuneResult, CustomCriterion, PromptConfig, SignalPreference, UserDataWriter, UserId,
    UserProfile,
};

/// Wraps a [`UserDataWriter`] and invalidates the user's cached context after
/// every successful write, before returning.
///
/// A failed write leaves the cache untouched.
pub struct ContextWriter {
    inner: Arc<dyn UserDataWriter>,
    cache: Arc<ContextCache>,
}

impl ContextWriter {
    pub fn new(inner: Arc<dyn UserDataWriter>, cache: Arc<ContextCache>) -> Self {
        Self { inner, cache }
    }

    fn invalidate(&self, user_id: UserId, what: &'static str) -> AttuneResult<()> {
        let removed = self.cache.invalidate(user_id)?;
        tracing::debug!(user_id = %user_id, what, removed, "Invalidated context after write");
        Ok(())
    }
}

#[async_trait]
impl UserDataWriter for ContextWriter {
    async fn write_profile(&self, user_id: UserId, profile: &UserProfile) -> AttuneResult<()> {
        self.inner.write_profile(user_id, profile).await?;
        self.invalidate(user_id, "profile")
    }

    async fn write_criteria(
        &self,
        user_id: UserId,
        criteria: &[CustomCriterion],
    ) -> AttuneResult<()> {
        self.inner.write_criteria(user_id, criteria).await?;
        self.invalidate(user_id, "criteria")
    }

    async fn write_signals(
        &self,
        user_id: UserId,
        signals: &[SignalPreference],
    ) -> AttuneResult<()> {
        self.inner.write_signals(user_id, signals).await?;
        self.invalidate(user_id, "signals")
    }

    async fn write_disqualifiers(
        &self,
        user_id: UserId,
        disqualifiers: &[String],
    ) -> AttuneResult<()> {
        self.inner.write_disqualifiers(user_id, disqualifiers).await?;
        self.invalidate(user_id, "disqualifiers")
    }

    async fn write_prompt_config(
        &self,
        user_id: UserId,
        prompt_config: &PromptConfig,
    ) -> AttuneResult<()> {
        self.inner.write_prompt_config(user_id, prompt_config).await?;
        self.invalidate(user_id, "prompt_config")
    }
}
