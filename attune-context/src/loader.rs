//! Context loading: cache lookup, concurrent fetch on a miss, write-through.

use std::sync::Arc;

use attune_cache::ContextCache;
use attune_core::{
    AgentType, AttuneConfig, AttuneResult, CachedContext, LearnedPreferences, UserDataSource,
    UserId,
};
use chrono::Utc;

use crate::prompt::DerivedPrompt;
use crate::view::PreferenceView;

/// A user's context as handed to prompt assembly.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub context: Arc<CachedContext>,
    pub agent: AgentType,
    /// Whether the context came from the cache without any fetch.
    pub cache_hit: bool,
    pub prompt: DerivedPrompt,
}

impl ResolvedContext {
    pub fn user_id(&self) -> UserId {
        self.context.user_id
    }

    /// Memory block for this agent, if one was read for it.
    ///
    /// Memory notes are fetched for the agent whose load missed the cache. A
    /// later hit for a different agent sees `None` here until the entry
    /// expires or is invalidated.
    pub fn memory_block(&self) -> Option<&str> {
        if self.context.memory_agent == self.agent {
            self.context.memory_block.as_deref()
        } else {
            None
        }
    }
}

/// Resolves per-user context for the request path.
pub struct ContextLoader {
    source: Arc<dyn UserDataSource>,
    cache: Arc<ContextCache>,
    memory_block_max_bytes: usize,
    min_applied_confidence: f32,
}

impl ContextLoader {
    pub fn new(
        source: Arc<dyn UserDataSource>,
        cache: Arc<ContextCache>,
        config: &AttuneConfig,
    ) -> Self {
        Self {
            source,
            cache,
            memory_block_max_bytes: config.memory_block_max_bytes,
            min_applied_confidence: config.min_applied_confidence,
        }
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// Load the context for `user_id` as seen by `agent`.
    ///
    /// A hit issues no fetch. A miss reads profile, memory notes and learned
    /// preferences concurrently and writes the merged result to the cache.
    /// Only a failed profile read fails the load.
    pub async fn load(&self, user_id: UserId, agent: AgentType) -> AttuneResult<ResolvedContext> {
        if let Some(context) = self.cache.get(user_id)? {
            tracing::debug!(user_id = %user_id, agent = %agent, "Context served from cache");
            return Ok(self.resolve(context, agent, true));
        }

        let (record, memory, learned) = tokio::join!(
            self.source.read_user_context(user_id),
            self.source.read_memory_notes(user_id, agent),
            self.source.read_learned_preferences(user_id),
        );

        let record = record.map_err(|e| {
            tracing::error!(
                user_id = %user_id,
                error = %e,
                transient = e.is_transient(),
                "Profile read failed"
            );
            e
        })?;

        let learned = match learned {
            Ok(learned) => learned.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Learned preferences unavailable, continuing without them"
                );
                LearnedPreferences::default()
            }
        };

        let memory_block = match memory {
            Ok(notes) => self.bound_memory(user_id, notes),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    agent = %agent,
                    error = %e,
                    transient = e.is_transient(),
                    "Memory notes unavailable, continuing without them"
                );
                None
            }
        };

        let context = CachedContext::assemble(
            user_id,
            record,
            learned,
            memory_block,
            agent,
            Utc::now(),
        );
        let context = self.cache.set(context)?;
        tracing::debug!(user_id = %user_id, agent = %agent, "Context loaded and cached");

        Ok(self.resolve(context, agent, false))
    }

    /// Learned preferences straight from storage, bypassing the cache.
    pub async fn preference_view(&self, user_id: UserId) -> AttuneResult<PreferenceView> {
        let learned = self
            .source
            .read_learned_preferences(user_id)
            .await?
            .unwrap_or_default();
        Ok(PreferenceView::from(&learned))
    }

    fn resolve(
        &self,
        context: Arc<CachedContext>,
        agent: AgentType,
        cache_hit: bool,
    ) -> ResolvedContext {
        let prompt = DerivedPrompt::build(&context, agent, self.min_applied_confidence);
        ResolvedContext {
            context,
            agent,
            cache_hit,
            prompt,
        }
    }

    /// Drop blank notes and notes over the byte cap.
    fn bound_memory(&self, user_id: UserId, notes: Option<String>) -> Option<String> {
        let notes = notes.filter(|n| !n.trim().is_empty())?;
        if notes.len() > self.memory_block_max_bytes {
            tracing::warn!(
                user_id = %user_id,
                bytes = notes.len(),
                max_bytes = self.memory_block_max_bytes,
                "Memory block over size cap, dropped"
            );
            return None;
        }
        Some(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptSectionKind;
    use attune_core::{AttuneError, PersistenceError};
    use attune_test_utils::{
        sample_learned_preferences, sample_record, FetchKind, InMemoryUserData,
    };
    use std::time::Duration;

    struct Fixture {
        data: Arc<InMemoryUserData>,
        loader: ContextLoader,
        user_id: UserId,
    }

    fn fixture(data: InMemoryUserData, config: AttuneConfig) -> Fixture {
        let data = Arc::new(data);
        let user_id = UserId::generate();
        data.insert_record(user_id, sample_record());
        data.insert_preferences(user_id, sample_learned_preferences());
        data.insert_memory(user_id, AgentType::Research, "Prefers concise bullet summaries.");

        let cache = Arc::new(ContextCache::new(&config));
        let loader = ContextLoader::new(data.clone(), cache, &config);
        Fixture {
            data,
            loader,
            user_id,
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_concurrently_then_hit_fetches_nothing() {
        let f = fixture(
            InMemoryUserData::new().with_latency(Duration::from_millis(40)),
            AttuneConfig::default(),
        );

        let first = f.loader.load(f.user_id, AgentType::Research).await.unwrap();
        assert!(!first.cache_hit);

        let calls = f.data.calls();
        assert_eq!(calls.len(), 3);
        for a in &calls {
            for b in &calls {
                assert!(a.overlaps(b), "{:?} and {:?} did not overlap", a.kind, b.kind);
            }
        }

        let second = f.loader.load(f.user_id, AgentType::Research).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(f.data.read_count(), 3);
        assert!(Arc::ptr_eq(&first.context, &second.context));
    }

    #[tokio::test]
    async fn test_loaded_context_carries_all_slices() {
        let f = fixture(InMemoryUserData::new(), AttuneConfig::default());
        let resolved = f.loader.load(f.user_id, AgentType::Research).await.unwrap();

        assert_eq!(resolved.user_id(), f.user_id);
        assert_eq!(resolved.context.custom_criteria.len(), 2);
        assert_eq!(resolved.context.learned_preferences.len(), 2);
        assert_eq!(
            resolved.memory_block(),
            Some("Prefers concise bullet summaries.")
        );
        assert!(resolved.prompt.section(PromptSectionKind::Memory).is_some());
        assert_eq!(f.loader.cache().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hit_rerenders_for_another_agent_without_fetching() {
        let f = fixture(InMemoryUserData::new(), AttuneConfig::default());
        f.loader.load(f.user_id, AgentType::Research).await.unwrap();

        let prospecting = f.loader.load(f.user_id, AgentType::Prospecting).await.unwrap();
        assert!(prospecting.cache_hit);
        assert_eq!(prospecting.prompt.agent, AgentType::Prospecting);
        assert!(prospecting.memory_block().is_none());
        assert!(prospecting
            .prompt
            .section(PromptSectionKind::Disqualifiers)
            .is_none());
        assert_eq!(f.data.read_count(), 3);
    }

    #[tokio::test]
    async fn test_learned_preferences_failure_degrades() {
        let data = InMemoryUserData::new();
        data.fail(FetchKind::LearnedPreferences);
        let f = fixture(data, AttuneConfig::default());

        let resolved = f.loader.load(f.user_id, AgentType::Research).await.unwrap();
        assert!(resolved.context.learned_preferences.is_empty());
        assert!(resolved
            .prompt
            .section(PromptSectionKind::Preferences)
            .is_none());
        assert_eq!(f.loader.cache().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_failure_degrades() {
        let data = InMemoryUserData::new();
        data.fail(FetchKind::MemoryNotes);
        let f = fixture(data, AttuneConfig::default());

        let resolved = f.loader.load(f.user_id, AgentType::Research).await.unwrap();
        assert!(resolved.memory_block().is_none());
        assert_eq!(resolved.context.custom_criteria.len(), 2);
    }

    #[tokio::test]
    async fn test_profile_failure_is_fatal_and_not_cached() {
        let data = InMemoryUserData::new();
        data.fail(FetchKind::UserContext);
        let f = fixture(data, AttuneConfig::default());

        let err = f
            .loader
            .load(f.user_id, AgentType::Research)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AttuneError::Persistence(PersistenceError::Unreachable { .. })
        ));
        assert!(f.loader.cache().is_empty().unwrap());

        f.data.recover(FetchKind::UserContext);
        assert!(f.loader.load(f.user_id, AgentType::Research).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let f = fixture(InMemoryUserData::new(), AttuneConfig::default());
        let err = f
            .loader
            .load(UserId::generate(), AgentType::Chat)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AttuneError::Persistence(PersistenceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_memory_block_is_dropped() {
        let f = fixture(
            InMemoryUserData::new(),
            AttuneConfig::default().with_memory_block_max_bytes(16),
        );
        let resolved = f.loader.load(f.user_id, AgentType::Research).await.unwrap();
        assert!(resolved.context.memory_block.is_none());
    }

    #[tokio::test]
    async fn test_memory_at_cap_is_kept() {
        let notes = "Prefers concise bullet summaries.";
        let f = fixture(
            InMemoryUserData::new(),
            AttuneConfig::default().with_memory_block_max_bytes(notes.len()),
        );
        let resolved = f.loader.load(f.user_id, AgentType::Research).await.unwrap();
        assert_eq!(resolved.memory_block(), Some(notes));
    }

    #[tokio::test]
    async fn test_preference_view_reads_storage() {
        let f = fixture(InMemoryUserData::new(), AttuneConfig::default());
        let view = f.loader.preference_view(f.user_id).await.unwrap();
        assert_eq!(view.raw.len(), 2);
        assert!(view.grouped.contains_key("focus"));
        assert!(view.grouped.contains_key("coverage"));

        let empty = f.loader.preference_view(UserId::generate()).await.unwrap();
        assert!(empty.raw.is_empty());
    }
}
