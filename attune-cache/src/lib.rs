//! attune Cache - Context Cache
//!
//! A time-bounded, per-user cache of resolved contexts that spares the hot
//! request path redundant database round-trips.
//!
//! # Semantics
//!
//! - One live entry per user; `set` replaces the whole entry.
//! - An entry older than the TTL is absent to readers even before it is swept.
//! - A background task evicts expired entries on a fixed interval.
//! - `invalidate` is how writers of profile data force the next read to
//!   refetch.
//!
//! This is not a general-purpose cache: there is no size bound and no LRU.

mod context_cache;
mod stats;
mod sweeper;

pub use context_cache::ContextCache;
pub use stats::CacheStats;
