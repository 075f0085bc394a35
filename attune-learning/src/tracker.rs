//! The preference tracker: per-user event intake, debounced flushing and
//! credential-gated persistence of derived preferences.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use attune_core::{
    AttuneConfig, AttuneResult, CredentialProvider, InteractionEvent, PreferenceCandidate,
    PreferenceKey, PreferenceSink, TrackerError, UserId,
};
use futures_util::future::join_all;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::state::TrackerState;

// ============================================================================
// FLUSH TYPES
// ============================================================================

/// Where a user's pending batch is in its write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    /// Nothing waiting to be written.
    Idle,
    /// Candidates are queued and a flush is due.
    Pending,
    /// A batch is being written.
    Flushing,
}

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No pending candidates.
    Empty,
    /// No credential could be resolved; the pending batch was kept.
    NoCredential,
    /// Writes were dispatched; see the counts.
    Completed,
}

/// Result of one flush for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub outcome: FlushOutcome,
    pub written: usize,
    /// Transient failures, back on the queue.
    pub failed: usize,
    /// Permanent failures, not retried.
    pub dropped: usize,
}

impl FlushReport {
    fn skipped(outcome: FlushOutcome) -> Self {
        Self {
            outcome,
            written: 0,
            failed: 0,
            dropped: 0,
        }
    }
}

// ============================================================================
// QUEUE HELPERS
// ============================================================================

/// Collapse candidates to one per key, keeping the highest confidence.
///
/// On a tie the later candidate wins. Output is ordered by key.
pub fn dedupe_by_key(candidates: Vec<PreferenceCandidate>) -> Vec<PreferenceCandidate> {
    let mut best: BTreeMap<PreferenceKey, PreferenceCandidate> = BTreeMap::new();
    for candidate in candidates {
        match best.get(&candidate.key) {
            Some(existing) if existing.confidence > candidate.confidence => {}
            _ => {
                best.insert(candidate.key.clone(), candidate);
            }
        }
    }
    best.into_values().collect()
}

/// Put a failed candidate back on the queue.
///
/// Candidates tracked while the write was in flight win unless the failed
/// one has strictly higher confidence.
fn requeue(pending: &mut Vec<PreferenceCandidate>, failed: PreferenceCandidate) {
    let newer_best = pending
        .iter()
        .filter(|c| c.key == failed.key)
        .map(|c| c.confidence)
        .reduce(f32::max);

    match newer_best {
        Some(best) if best >= failed.confidence => {}
        Some(_) => {
            pending.retain(|c| c.key != failed.key);
            pending.push(failed);
        }
        None => pending.push(failed),
    }
}

// ============================================================================
// PREFERENCE TRACKER
// ============================================================================

#[derive(Default)]
struct UserSession {
    state: TrackerState,
    pending: Vec<PreferenceCandidate>,
    in_flight: u32,
    debounce: Option<JoinHandle<()>>,
}

impl UserSession {
    fn phase(&self) -> FlushPhase {
        if self.in_flight > 0 {
            FlushPhase::Flushing
        } else if self.pending.is_empty() {
            FlushPhase::Idle
        } else {
            FlushPhase::Pending
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }
    }
}

struct TrackerInner {
    sink: Arc<dyn PreferenceSink>,
    credentials: Arc<dyn CredentialProvider>,
    debounce_window: Duration,
    sessions: Mutex<HashMap<UserId, UserSession>>,
}

/// Learns preferences from interaction events.
///
/// Cloning is cheap and every clone shares the same per-user state. `track`
/// never blocks on I/O: candidates are queued and written by a debounced
/// flush that fires once the user has been quiet for the debounce window.
#[derive(Clone)]
pub struct PreferenceTracker {
    inner: Arc<TrackerInner>,
}

impl PreferenceTracker {
    pub fn new(
        sink: Arc<dyn PreferenceSink>,
        credentials: Arc<dyn CredentialProvider>,
        config: &AttuneConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                sink,
                credentials,
                debounce_window: config.debounce_window,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        self.inner.debounce_window
    }

    fn sessions(&self) -> AttuneResult<MutexGuard<'_, HashMap<UserId, UserSession>>> {
        self.inner
            .sessions
            .lock()
            .map_err(|_| TrackerError::LockPoisoned.into())
    }

    /// Record an interaction and return the candidates it produced.
    ///
    /// Events for one user are applied in call order. Every call restarts
    /// that user's debounce timer.
    pub fn track(
        &self,
        user_id: UserId,
        event: InteractionEvent,
    ) -> AttuneResult<Vec<PreferenceCandidate>> {
        let mut sessions = self.sessions()?;
        let session = sessions.entry(user_id).or_default();

        let candidates = session.state.observe(&event);
        for candidate in &candidates {
            tracing::debug!(
                user_id = %user_id,
                event = event.kind(),
                key = %candidate.key,
                value = %candidate.value,
                confidence = candidate.confidence,
                "Derived preference candidate"
            );
        }
        session.pending.extend(candidates.iter().cloned());
        self.schedule_flush(user_id, session);

        Ok(candidates)
    }

    /// Queue a candidate that did not come from an interaction event, such
    /// as an explicit settings change.
    pub fn enqueue(&self, user_id: UserId, candidate: PreferenceCandidate) -> AttuneResult<()> {
        let mut sessions = self.sessions()?;
        let session = sessions.entry(user_id).or_default();
        session.pending.push(candidate);
        self.schedule_flush(user_id, session);
        Ok(())
    }

    /// Restart the debounce timer for `user_id`.
    ///
    /// Outside a runtime nothing is scheduled and flushing is left to
    /// explicit `flush` calls.
    fn schedule_flush(&self, user_id: UserId, session: &mut UserSession) {
        session.cancel_debounce();

        let Ok(handle) = Handle::try_current() else {
            tracing::debug!(user_id = %user_id, "No async runtime, skipping debounced flush");
            return;
        };

        let tracker = self.clone();
        let window = self.inner.debounce_window;
        session.debounce = Some(handle.spawn(async move {
            tokio::time::sleep(window).await;
            // Detached so a later abort of this timer cannot cut a write short.
            tokio::spawn(async move {
                if let Err(e) = tracker.flush(user_id).await {
                    tracing::error!(user_id = %user_id, error = %e, "Debounced flush failed");
                }
            });
        }));
        tracing::trace!(
            user_id = %user_id,
            window_ms = window.as_millis() as u64,
            "Debounced flush scheduled"
        );
    }

    /// Write the user's pending candidates.
    ///
    /// The credential is resolved fresh. Without one the batch stays queued
    /// and nothing is written. Otherwise the batch is deduplicated by key and
    /// every key is written concurrently. Transient write failures are
    /// re-queued for the next flush; permanent ones are dropped.
    pub async fn flush(&self, user_id: UserId) -> AttuneResult<FlushReport> {
        let has_pending = self
            .sessions()?
            .get(&user_id)
            .is_some_and(|s| !s.pending.is_empty());
        if !has_pending {
            return Ok(FlushReport::skipped(FlushOutcome::Empty));
        }

        let Some(credential) = self.inner.credentials.resolve().await else {
            tracing::info!(
                user_id = %user_id,
                provider = self.inner.credentials.name(),
                "No credential available, keeping pending preferences"
            );
            return Ok(FlushReport::skipped(FlushOutcome::NoCredential));
        };

        let batch = {
            let mut sessions = self.sessions()?;
            let Some(session) = sessions.get_mut(&user_id) else {
                return Ok(FlushReport::skipped(FlushOutcome::Empty));
            };
            let batch = dedupe_by_key(std::mem::take(&mut session.pending));
            if batch.is_empty() {
                return Ok(FlushReport::skipped(FlushOutcome::Empty));
            }
            session.in_flight += 1;
            batch
        };

        let sink = &self.inner.sink;
        let results = join_all(
            batch
                .iter()
                .map(|candidate| sink.write_preference(&credential, user_id, candidate)),
        )
        .await;

        let mut written = 0;
        let mut dropped = 0;
        let mut failed = Vec::new();
        for (candidate, result) in batch.into_iter().zip(results) {
            match result {
                Ok(()) => written += 1,
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        user_id = %user_id,
                        key = %candidate.key,
                        error = %e,
                        "Preference write failed, re-queueing"
                    );
                    failed.push(candidate);
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        key = %candidate.key,
                        error = %e,
                        "Preference write failed permanently, dropping"
                    );
                    dropped += 1;
                }
            }
        }
        let failed_count = failed.len();

        {
            let mut sessions = self.sessions()?;
            // A reset while the batch was in flight drops its failures too.
            if let Some(session) = sessions.get_mut(&user_id) {
                session.in_flight = session.in_flight.saturating_sub(1);
                for candidate in failed {
                    requeue(&mut session.pending, candidate);
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            written,
            failed = failed_count,
            dropped,
            "Flushed learned preferences"
        );
        Ok(FlushReport {
            outcome: FlushOutcome::Completed,
            written,
            failed: failed_count,
            dropped,
        })
    }

    /// Flush every user with pending candidates.
    pub async fn flush_all(&self) -> AttuneResult<Vec<(UserId, FlushReport)>> {
        let users: Vec<UserId> = self
            .sessions()?
            .iter()
            .filter(|(_, s)| !s.pending.is_empty())
            .map(|(user_id, _)| *user_id)
            .collect();

        let reports = join_all(users.iter().map(|user_id| self.flush(*user_id))).await;
        users
            .into_iter()
            .zip(reports)
            .map(|(user_id, report)| report.map(|r| (user_id, r)))
            .collect()
    }

    /// Snapshot of the user's counters.
    pub fn state(&self, user_id: UserId) -> AttuneResult<Option<TrackerState>> {
        Ok(self.sessions()?.get(&user_id).map(|s| s.state.clone()))
    }

    /// Candidates waiting for the next flush, in queue order.
    pub fn pending(&self, user_id: UserId) -> AttuneResult<Vec<PreferenceCandidate>> {
        Ok(self
            .sessions()?
            .get(&user_id)
            .map(|s| s.pending.clone())
            .unwrap_or_default())
    }

    pub fn phase(&self, user_id: UserId) -> AttuneResult<FlushPhase> {
        Ok(self
            .sessions()?
            .get(&user_id)
            .map_or(FlushPhase::Idle, UserSession::phase))
    }

    /// Forget everything about one user, cancelling any scheduled flush.
    pub fn reset(&self, user_id: UserId) -> AttuneResult<()> {
        if let Some(mut session) = self.sessions()?.remove(&user_id) {
            session.cancel_debounce();
        }
        Ok(())
    }

    /// Forget every user.
    pub fn reset_all(&self) -> AttuneResult<()> {
        let mut sessions = self.sessions()?;
        for session in sessions.values_mut() {
            session.cancel_debounce();
        }
        sessions.clear();
        Ok(())
    }
}
