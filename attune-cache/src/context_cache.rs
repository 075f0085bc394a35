//! Per-user TTL cache of [`CachedContext`] snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use attune_core::{
    AttuneConfig, AttuneResult, CacheError, CachedContext, Clock, SystemClock, Timestamp, UserId,
};
use tokio::sync::watch;

use crate::stats::{CacheCounters, CacheStats};
use crate::sweeper::sweep_task;

/// Process-wide cache of resolved user contexts.
///
/// Entries are held as `Arc<CachedContext>` and only ever swapped whole, so a
/// reader either sees the previous snapshot or the new one, never a mix.
///
/// An entry older than the TTL is treated as absent by [`get`](Self::get) even
/// if the background sweep has not removed it yet.
///
/// # Example
///
/// ```ignore
/// let cache = ContextCache::start(&AttuneConfig::default())?;
/// cache.set(context)?;
/// if let Some(ctx) = cache.get(user_id)? {
///     // live snapshot
/// }
/// cache.invalidate(user_id)?; // after any profile write
/// ```
pub struct ContextCache {
    entries: RwLock<HashMap<UserId, Arc<CachedContext>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    counters: CacheCounters,
    /// Dropping the sender stops the sweeper.
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl ContextCache {
    /// Create a cache without a background sweep.
    pub fn new(config: &AttuneConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache without a background sweep, reading time from `clock`.
    pub fn with_clock(config: &AttuneConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: config.cache_ttl,
            clock,
            counters: CacheCounters::default(),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Create a cache and spawn its eviction sweep on the current runtime.
    pub fn start(config: &AttuneConfig) -> AttuneResult<Arc<Self>> {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache with a custom clock and spawn its eviction sweep.
    ///
    /// The config is validated first; a zero sweep interval is an error.
    /// Outside a Tokio runtime the cache still works but nothing sweeps it;
    /// expired entries are then only dropped when read.
    pub fn start_with_clock(
        config: &AttuneConfig,
        clock: Arc<dyn Clock>,
    ) -> AttuneResult<Arc<Self>> {
        config.validate()?;
        let cache = Arc::new(Self::with_clock(config, clock));

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                handle.spawn(sweep_task(
                    Arc::downgrade(&cache),
                    config.sweep_interval,
                    shutdown_rx,
                ));
                if let Ok(mut slot) = cache.shutdown_tx.lock() {
                    *slot = Some(shutdown_tx);
                }
            }
            Err(_) => {
                tracing::warn!("No Tokio runtime available, context cache sweep not started");
            }
        }

        Ok(cache)
    }

    /// Stop the background sweep, if one is running.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.shutdown_tx.lock() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(true);
            }
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the live snapshot for a user.
    ///
    /// An expired entry is evicted as a side effect and reported as absent.
    pub fn get(&self, user_id: UserId) -> AttuneResult<Option<Arc<CachedContext>>> {
        let now = self.clock.now();

        let found = {
            let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
            entries.get(&user_id).cloned()
        };

        match found {
            Some(entry) if !self.is_expired(&entry, now) => {
                self.counters.record_hit();
                tracing::trace!(%user_id, "Context cache hit");
                Ok(Some(entry))
            }
            Some(stale) => {
                let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
                // A concurrent set may have replaced the stale entry already.
                if entries
                    .get(&user_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &stale))
                {
                    entries.remove(&user_id);
                    self.counters.record_evictions(1);
                }
                self.counters.record_miss();
                tracing::debug!(%user_id, "Context cache entry expired on read");
                Ok(None)
            }
            None => {
                self.counters.record_miss();
                tracing::trace!(%user_id, "Context cache miss");
                Ok(None)
            }
        }
    }

    /// Store a snapshot, replacing any previous one for the same user.
    ///
    /// `inserted_at` is stamped with the current time; nothing else is
    /// touched.
    pub fn set(&self, mut context: CachedContext) -> AttuneResult<Arc<CachedContext>> {
        context.inserted_at = self.clock.now();
        let user_id = context.user_id;
        let entry = Arc::new(context);

        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .insert(user_id, Arc::clone(&entry));

        tracing::trace!(%user_id, "Context cached");
        Ok(entry)
    }

    /// Drop the snapshot for a user so the next read refetches.
    ///
    /// Returns whether an entry was present.
    pub fn invalidate(&self, user_id: UserId) -> AttuneResult<bool> {
        let removed = self
            .entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .remove(&user_id)
            .is_some();

        if removed {
            self.counters.record_invalidation();
            tracing::debug!(%user_id, "Context cache invalidated");
        }
        Ok(removed)
    }

    /// Drop every snapshot. Returns how many were removed.
    pub fn clear(&self) -> AttuneResult<usize> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> AttuneResult<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let evicted = before - entries.len();

        if evicted > 0 {
            self.counters.record_evictions(evicted as u64);
        }
        Ok(evicted)
    }

    /// Number of entries physically held, including expired ones not yet swept.
    pub fn len(&self) -> AttuneResult<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .len())
    }

    pub fn is_empty(&self) -> AttuneResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Usage statistics.
    pub fn stats(&self) -> AttuneResult<CacheStats> {
        let entry_count = self.len()? as u64;
        Ok(self.counters.snapshot(entry_count))
    }

    fn is_expired(&self, entry: &CachedContext, now: Timestamp) -> bool {
        match (now - entry.inserted_at).to_std() {
            Ok(age) => age > self.ttl,
            // Inserted "in the future" relative to this clock reading.
            Err(_) => false,
        }
    }
}

impl Drop for ContextCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// TESTS
// ============================================================================
