//! attune Learning - Preference Tracker
//!
//! Observes lightweight interaction events, derives preference candidates
//! from per-user counters and persists them in debounced, deduplicated
//! batches.
//!
//! # Flow
//!
//! ```text
//! track(event) -> TrackerState::observe -> pending queue
//!                                              |
//!                      (quiet for debounce window)
//!                                              v
//!          resolve credential -> dedupe by key -> concurrent writes
//!                                              |
//!                                  failures go back on the queue
//! ```

mod normalize;
mod state;
mod tracker;

pub use normalize::{canonical_section, normalize_label, section_key_suffix};
pub use state::{
    SectionEngagement, TrackerState, CONFIRMED_CONFIDENCE, DOMINANCE_FACTOR,
    FOLLOW_UP_MIN_PRIOR, REPORT_SAVE_CONFIDENCE, RESEARCH_MIN_COMPLETIONS,
    SECTION_MIN_INTERACTIONS,
};
pub use tracker::{dedupe_by_key, FlushOutcome, FlushPhase, FlushReport, PreferenceTracker};
