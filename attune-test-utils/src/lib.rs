//! attune Test Utilities
//!
//! Centralized test infrastructure for the attune workspace:
//! - A manually advanced clock
//! - In-memory persistence doubles with failure injection and call timing
//! - Fixtures for common scenarios
//! - Proptest generators

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

pub use attune_core::{
    AgentType, AttuneError, AttuneResult, CachedContext, Clock, CoverageDepth, Credential,
    CustomCriterion, Importance, LearnedPreferences, PersistenceError, PreferenceCandidate,
    PreferenceKey, PreferenceRecord, PreferenceSink, PreferenceSource, PreferenceValue,
    PromptConfig, SignalPreference, Timestamp, UserDataSource, UserDataWriter, UserId,
    UserProfile, UserRecord,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = lock(&self.now);
        *now += delta;
    }

    pub fn set(&self, to: Timestamp) {
        *lock(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *lock(&self.now)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A representative profile read.
pub fn sample_record() -> UserRecord {
    UserRecord {
        profile: UserProfile {
            company_name: Some("Northwind Analytics".to_string()),
            role: Some("Account Executive".to_string()),
            target_industries: vec!["fintech".to_string(), "logistics".to_string()],
            attributes: serde_json::Map::new(),
        },
        custom_criteria: vec![
            CustomCriterion {
                name: "Runs workloads on Kubernetes".to_string(),
                importance: Importance::Critical,
                description: None,
            },
            CustomCriterion {
                name: "Has a data team".to_string(),
                importance: Importance::NiceToHave,
                description: Some("At least one data engineer".to_string()),
            },
        ],
        signals: vec![SignalPreference {
            signal_type: "leadership_change".to_string(),
            importance: Importance::Critical,
            lookback_days: Some(30),
        }],
        disqualifiers: Vec::new(),
        prompt_config: PromptConfig {
            preferred_tone: Some("direct".to_string()),
            response_format: None,
            custom_instructions: None,
        },
    }
}

/// A persisted preference record.
pub fn sample_preference(key: &str, value: PreferenceValue, confidence: f32) -> PreferenceRecord {
    PreferenceRecord {
        key: PreferenceKey::parse(key).unwrap_or_else(|e| panic!("bad fixture key {key}: {e}")),
        value,
        confidence,
        source: PreferenceSource::Implicit,
        updated_at: Utc::now(),
    }
}

/// Learned preferences with one strong and one weak record.
pub fn sample_learned_preferences() -> LearnedPreferences {
    vec![
        sample_preference("focus.tech_stack", PreferenceValue::Flag(true), 0.85),
        sample_preference(
            "coverage.depth",
            PreferenceValue::Depth(CoverageDepth::Deep),
            0.4,
        ),
    ]
    .into_iter()
    .collect()
}

/// A complete cached context for `user_id`.
pub fn sample_context(user_id: UserId) -> CachedContext {
    CachedContext::assemble(
        user_id,
        sample_record(),
        sample_learned_preferences(),
        Some("Prefers concise bullet summaries.".to_string()),
        AgentType::Research,
        Utc::now(),
    )
}

// ============================================================================
// IN-MEMORY USER DATA
// ============================================================================

/// Which persistence call a [`FetchCall`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    UserContext,
    MemoryNotes,
    LearnedPreferences,
    Write,
}

/// Timing of one persistence call.
#[derive(Debug, Clone, Copy)]
pub struct FetchCall {
    pub kind: FetchKind,
    pub user_id: UserId,
    pub started: Instant,
    pub finished: Instant,
}

impl FetchCall {
    /// Whether two calls were in flight at the same time.
    pub fn overlaps(&self, other: &FetchCall) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// In-memory stand-in for the persistence layer.
#[derive(Default)]
pub struct InMemoryUserData {
    records: Mutex<HashMap<UserId, UserRecord>>,
    memory: Mutex<HashMap<(UserId, AgentType), String>>,
    preferences: Mutex<HashMap<UserId, LearnedPreferences>>,
    failing: Mutex<HashSet<FetchKind>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl InMemoryUserData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.latency) = Some(latency);
        self
    }

    pub fn insert_record(&self, user_id: UserId, record: UserRecord) {
        lock(&self.records).insert(user_id, record);
    }

    pub fn insert_memory(&self, user_id: UserId, agent: AgentType, notes: impl Into<String>) {
        lock(&self.memory).insert((user_id, agent), notes.into());
    }

    pub fn insert_preferences(&self, user_id: UserId, prefs: LearnedPreferences) {
        lock(&self.preferences).insert(user_id, prefs);
    }

    /// Make every call of `kind` fail until [`recover`](Self::recover).
    pub fn fail(&self, kind: FetchKind) {
        lock(&self.failing).insert(kind);
    }

    pub fn recover(&self, kind: FetchKind) {
        lock(&self.failing).remove(&kind);
    }

    pub fn record(&self, user_id: UserId) -> Option<UserRecord> {
        lock(&self.records).get(&user_id).cloned()
    }

    /// Every call made so far, in completion order.
    pub fn calls(&self) -> Vec<FetchCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, kind: FetchKind) -> usize {
        lock(&self.calls).iter().filter(|c| c.kind == kind).count()
    }

    /// Total number of read calls.
    pub fn read_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.kind != FetchKind::Write)
            .count()
    }

    async fn call<T>(
        &self,
        kind: FetchKind,
        user_id: UserId,
        op: impl FnOnce() -> AttuneResult<T>,
    ) -> AttuneResult<T> {
        let started = Instant::now();
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = if lock(&self.failing).contains(&kind) {
            Err(AttuneError::Persistence(PersistenceError::Unreachable {
                operation: format!("{:?}", kind),
                reason: "injected failure".to_string(),
            }))
        } else {
            op()
        };

        lock(&self.calls).push(FetchCall {
            kind,
            user_id,
            started,
            finished: Instant::now(),
        });
        result
    }
}

#[async_trait]
impl UserDataSource for InMemoryUserData {
    async fn read_user_context(&self, user_id: UserId) -> AttuneResult<UserRecord> {
        self.call(FetchKind::UserContext, user_id, || {
            lock(&self.records)
                .get(&user_id)
                .cloned()
                .ok_or(AttuneError::Persistence(PersistenceError::NotFound { user_id }))
        })
        .await
    }

    async fn read_memory_notes(
        &self,
        user_id: UserId,
        agent: AgentType,
    ) -> AttuneResult<Option<String>> {
        self.call(FetchKind::MemoryNotes, user_id, || {
            Ok(lock(&self.memory).get(&(user_id, agent)).cloned())
        })
        .await
    }

    async fn read_learned_preferences(
        &self,
        user_id: UserId,
    ) -> AttuneResult<Option<LearnedPreferences>> {
        self.call(FetchKind::LearnedPreferences, user_id, || {
            Ok(lock(&self.preferences).get(&user_id).cloned())
        })
        .await
    }
}

#[async_trait]
impl UserDataWriter for InMemoryUserData {
    async fn write_profile(&self, user_id: UserId, profile: &UserProfile) -> AttuneResult<()> {
        self.call(FetchKind::Write, user_id, || {
            lock(&self.records).entry(user_id).or_default().profile = profile.clone();
            Ok(())
        })
        .await
    }

    async fn write_criteria(
        &self,
        user_id: UserId,
        criteria: &[CustomCriterion],
    ) -> AttuneResult<()> {
        self.call(FetchKind::Write, user_id, || {
            lock(&self.records).entry(user_id).or_default().custom_criteria = criteria.to_vec();
            Ok(())
        })
        .await
    }

    async fn write_signals(
        &self,
        user_id: UserId,
        signals: &[SignalPreference],
    ) -> AttuneResult<()> {
        self.call(FetchKind::Write, user_id, || {
            lock(&self.records).entry(user_id).or_default().signals = signals.to_vec();
            Ok(())
        })
        .await
    }

    async fn write_disqualifiers(
        &self,
        user_id: UserId,
        disqualifiers: &[String],
    ) -> AttuneResult<()> {
        self.call(FetchKind::Write, user_id, || {
            lock(&self.records).entry(user_id).or_default().disqualifiers =
                disqualifiers.to_vec();
            Ok(())
        })
        .await
    }

    async fn write_prompt_config(
        &self,
        user_id: UserId,
        prompt_config: &PromptConfig,
    ) -> AttuneResult<()> {
        self.call(FetchKind::Write, user_id, || {
            lock(&self.records).entry(user_id).or_default().prompt_config = prompt_config.clone();
            Ok(())
        })
        .await
    }
}

// ============================================================================
// RECORDING PREFERENCE SINK
// ============================================================================

/// One preference write that reached the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenPreference {
    pub user_id: UserId,
    pub candidate: PreferenceCandidate,
    pub token: String,
}

/// Preference sink that records successful writes and can reject some keys.
#[derive(Default)]
pub struct RecordingPreferenceSink {
    written: Mutex<Vec<WrittenPreference>>,
    failing_keys: Mutex<HashSet<String>>,
    refused_keys: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    attempts: Mutex<usize>,
    latency: Mutex<Option<Duration>>,
}

impl RecordingPreferenceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.latency) = Some(latency);
        self
    }

    /// Reject writes for `key` until [`accept_key`](Self::accept_key).
    pub fn reject_key(&self, key: &str) {
        lock(&self.failing_keys).insert(key.to_string());
    }

    pub fn accept_key(&self, key: &str) {
        lock(&self.failing_keys).remove(key);
        lock(&self.refused_keys).remove(key);
    }

    /// Fail writes for `key` with a non-transient error.
    pub fn refuse_key(&self, key: &str) {
        lock(&self.refused_keys).insert(key.to_string());
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Successful writes in completion order.
    pub fn written(&self) -> Vec<WrittenPreference> {
        lock(&self.written).clone()
    }

    /// Every write attempt, successful or not.
    pub fn attempts(&self) -> usize {
        *lock(&self.attempts)
    }
}

#[async_trait]
impl PreferenceSink for RecordingPreferenceSink {
    async fn write_preference(
        &self,
        credential: &Credential,
        user_id: UserId,
        candidate: &PreferenceCandidate,
    ) -> AttuneResult<()> {
        *lock(&self.attempts) += 1;
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if lock(&self.refused_keys).contains(candidate.key.as_str()) {
            return Err(AttuneError::Persistence(PersistenceError::Malformed {
                user_id,
                reason: format!("no column for {}", candidate.key),
            }));
        }

        let rejected = self.fail_all.load(Ordering::SeqCst)
            || lock(&self.failing_keys).contains(candidate.key.as_str());
        if rejected {
            return Err(AttuneError::Persistence(PersistenceError::WriteRejected {
                key: candidate.key.to_string(),
                reason: "injected failure".to_string(),
            }));
        }

        lock(&self.written).push(WrittenPreference {
            user_id,
            candidate: candidate.clone(),
            token: credential.expose().to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    /// Free-form section titles as a UI might send them.
    pub fn arb_section_title() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Tech Stack".to_string()),
            Just("technology".to_string()),
            Just("Recent News".to_string()),
            Just("Funding History".to_string()),
            Just("Leadership Team".to_string()),
            "[A-Za-z][A-Za-z0-9 &/-]{0,24}",
        ]
    }

    /// A `focus.*` candidate with an implicit source.
    pub fn arb_focus_candidate() -> impl Strategy<Value = PreferenceCandidate> {
        ("[a-z]{1,3}", any::<bool>(), 0.0f32..=1.0).prop_filter_map(
            "valid focus key",
            |(name, flag, confidence)| {
                let key = PreferenceKey::focus(&name).ok()?;
                PreferenceCandidate::new(
                    key,
                    PreferenceValue::Flag(flag),
                    confidence,
                    PreferenceSource::Implicit,
                )
                .ok()
            },
        )
    }
}
