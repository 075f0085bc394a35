//! Background eviction sweep for the context cache.
//!
//! The sweep runs independently of read traffic so contexts of users who
//! stop making requests do not accumulate.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::ContextCache;

/// Periodically evict expired entries until shutdown.
///
/// The task holds only a weak reference, so it also exits once the cache
/// itself has been dropped.
pub(crate) async fn sweep_task(
    cache: Weak<ContextCache>,
    sweep_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sweep_interval_ms = sweep_interval.as_millis() as u64,
        "Context cache sweep started"
    );

    let mut cycles: u64 = 0;
    let mut evicted_total: u64 = 0;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // Err means the sender is gone: the cache was dropped.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cycles += 1;

                match cache.evict_expired() {
                    Ok(0) => {
                        tracing::trace!("Context cache sweep found nothing to evict");
                    }
                    Ok(evicted) => {
                        evicted_total += evicted as u64;
                        tracing::debug!(evicted, "Context cache sweep evicted expired entries");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Context cache sweep failed");
                    }
                }
            }
        }
    }

    tracing::info!(cycles, evicted_total, "Context cache sweep stopped");
}
