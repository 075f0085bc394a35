//! Per-user interaction counters and the rules that turn them into
//! preference candidates.
//!
//! Rules are pure: the same sequence of events always produces the same
//! candidates. Counters persist across flushes; only the pending queue is
//! drained by a flush.

use std::collections::{BTreeMap, BTreeSet};

use attune_core::{
    CoverageDepth, InteractionEvent, PreferenceCandidate, PreferenceKey, PreferenceSource,
    PreferenceValue, ResearchDepth,
};
use serde::{Deserialize, Serialize};

use crate::normalize::section_key_suffix;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Interactions of one kind needed before a section preference is derived.
pub const SECTION_MIN_INTERACTIONS: u32 = 3;

/// One side must exceed the other by this factor to dominate.
pub const DOMINANCE_FACTOR: u32 = 2;

/// Completed research runs needed before a depth preference is derived.
pub const RESEARCH_MIN_COMPLETIONS: u32 = 5;

/// Prior asks of a topic needed before a follow-up preference is derived.
pub const FOLLOW_UP_MIN_PRIOR: u32 = 2;

pub const REPORT_SAVE_CONFIDENCE: f32 = 0.65;
pub const CONFIRMED_CONFIDENCE: f32 = 0.95;

const EXPAND_CONFIDENCE_CAP: f32 = 0.90;
const COLLAPSE_CONFIDENCE_CAP: f32 = 0.85;
const DEPTH_CONFIDENCE_CAP: f32 = 0.85;
const FOLLOW_UP_CONFIDENCE_CAP: f32 = 0.85;

fn expand_confidence(expanded: u32) -> f32 {
    (0.70 + 0.05 * expanded as f32).min(EXPAND_CONFIDENCE_CAP)
}

fn collapse_confidence(collapsed: u32) -> f32 {
    (0.60 + 0.05 * collapsed as f32).min(COLLAPSE_CONFIDENCE_CAP)
}

fn depth_confidence(winner: u32, total: u32) -> f32 {
    (0.65 + 0.20 * (winner as f32 / total as f32)).min(DEPTH_CONFIDENCE_CAP)
}

fn follow_up_confidence(prior: u32) -> f32 {
    (0.60 + 0.10 * prior as f32).min(FOLLOW_UP_CONFIDENCE_CAP)
}

// ============================================================================
// TRACKER STATE
// ============================================================================

/// Expand/collapse counts for one canonical section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEngagement {
    pub expanded: u32,
    pub collapsed: u32,
}

impl SectionEngagement {
    fn expand_dominates(&self) -> bool {
        self.expanded >= SECTION_MIN_INTERACTIONS
            && self.expanded > DOMINANCE_FACTOR * self.collapsed
    }

    fn collapse_dominates(&self) -> bool {
        self.collapsed >= SECTION_MIN_INTERACTIONS
            && self.collapsed > DOMINANCE_FACTOR * self.expanded
    }
}

/// Everything the tracker remembers about one user's interactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerState {
    /// Keyed by canonical section name.
    pub section_engagement: BTreeMap<String, SectionEngagement>,
    pub research_depth_counts: BTreeMap<ResearchDepth, u32>,
    /// Keyed by canonical topic name.
    pub follow_up_topic_counts: BTreeMap<String, u32>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters and return any candidates it yields.
    pub fn observe(&mut self, event: &InteractionEvent) -> Vec<PreferenceCandidate> {
        match event {
            InteractionEvent::SectionExpanded { section, .. } => {
                self.observe_section(section, true).into_iter().collect()
            }
            InteractionEvent::SectionCollapsed { section, .. } => {
                self.observe_section(section, false).into_iter().collect()
            }
            InteractionEvent::ResearchCompleted { depth, .. } => {
                self.observe_research(*depth).into_iter().collect()
            }
            InteractionEvent::FollowUpAsked { topic, .. } => {
                self.observe_follow_up(topic).into_iter().collect()
            }
            InteractionEvent::ReportSaved { sections, .. } => self.observe_report_saved(sections),
            InteractionEvent::PreferenceConfirmed { key, value, .. } => {
                match PreferenceCandidate::new(
                    key.clone(),
                    value.clone(),
                    CONFIRMED_CONFIDENCE,
                    PreferenceSource::Followup,
                ) {
                    Ok(candidate) => vec![candidate],
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Rejected preference confirmation");
                        Vec::new()
                    }
                }
            }
        }
    }

    fn observe_section(&mut self, section: &str, expanded: bool) -> Option<PreferenceCandidate> {
        let suffix = section_key_suffix(section)?;
        let engagement = self.section_engagement.entry(suffix.clone()).or_default();

        if expanded {
            engagement.expanded += 1;
            if engagement.expand_dominates() {
                return focus_candidate(&suffix, true, expand_confidence(engagement.expanded));
            }
        } else {
            engagement.collapsed += 1;
            if engagement.collapse_dominates() {
                return focus_candidate(&suffix, false, collapse_confidence(engagement.collapsed));
            }
        }
        None
    }

    fn observe_research(&mut self, depth: ResearchDepth) -> Option<PreferenceCandidate> {
        *self.research_depth_counts.entry(depth).or_insert(0) += 1;

        let total: u32 = self.research_depth_counts.values().sum();
        if total < RESEARCH_MIN_COMPLETIONS {
            return None;
        }

        let deep = self.research_depth_count(ResearchDepth::Deep);
        let quick = self.research_depth_count(ResearchDepth::Quick);
        let (coverage, winner) = if deep > DOMINANCE_FACTOR * quick {
            (CoverageDepth::Deep, deep)
        } else if quick > DOMINANCE_FACTOR * deep {
            (CoverageDepth::Shallow, quick)
        } else {
            return None;
        };

        PreferenceCandidate::new(
            PreferenceKey::coverage_depth(),
            PreferenceValue::Depth(coverage),
            depth_confidence(winner, total),
            PreferenceSource::Implicit,
        )
        .ok()
    }

    fn observe_follow_up(&mut self, topic: &str) -> Option<PreferenceCandidate> {
        let suffix = section_key_suffix(topic)?;
        let count = self.follow_up_topic_counts.entry(suffix.clone()).or_insert(0);
        let prior = *count;
        *count += 1;

        if prior < FOLLOW_UP_MIN_PRIOR {
            return None;
        }
        focus_candidate(&suffix, true, follow_up_confidence(prior))
    }

    fn observe_report_saved(&self, sections: &[String]) -> Vec<PreferenceCandidate> {
        let suffixes: BTreeSet<String> = sections
            .iter()
            .filter_map(|s| section_key_suffix(s))
            .collect();
        suffixes
            .into_iter()
            .filter_map(|suffix| focus_candidate(&suffix, true, REPORT_SAVE_CONFIDENCE))
            .collect()
    }

    pub fn research_depth_count(&self, depth: ResearchDepth) -> u32 {
        self.research_depth_counts.get(&depth).copied().unwrap_or(0)
    }

    pub fn section(&self, canonical: &str) -> SectionEngagement {
        self.section_engagement
            .get(canonical)
            .copied()
            .unwrap_or_default()
    }
}

fn focus_candidate(suffix: &str, flag: bool, confidence: f32) -> Option<PreferenceCandidate> {
    let key = match PreferenceKey::focus(suffix) {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!(suffix, error = %e, "Skipping section without a valid key");
            return None;
        }
    };
    PreferenceCandidate::new(
        key,
        PreferenceValue::Flag(flag),
        confidence,
        PreferenceSource::Implicit,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(state: &mut TrackerState, events: &[InteractionEvent]) -> Vec<PreferenceCandidate> {
        events.iter().flat_map(|e| state.observe(e)).collect()
    }

    fn research(state: &mut TrackerState, deep: u32, quick: u32) -> Vec<PreferenceCandidate> {
        let mut events = Vec::new();
        events.extend((0..deep).map(|_| InteractionEvent::research_completed(ResearchDepth::Deep)));
        events
            .extend((0..quick).map(|_| InteractionEvent::research_completed(ResearchDepth::Quick)));
        feed(state, &events)
    }

    #[test]
    fn test_three_expands_yield_one_focus_candidate() {
        let mut state = TrackerState::new();
        let candidates = feed(
            &mut state,
            &[
                InteractionEvent::section_expanded("Tech Stack"),
                InteractionEvent::section_expanded("Tech Stack"),
                InteractionEvent::section_expanded("Tech Stack"),
            ],
        );

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.key.as_str(), "focus.tech_stack");
        assert_eq!(c.value, PreferenceValue::Flag(true));
        assert!((0.70..=0.90).contains(&c.confidence));
        assert_eq!(c.source, PreferenceSource::Implicit);
    }

    #[test]
    fn test_synonyms_accumulate_on_one_section() {
        let mut state = TrackerState::new();
        let candidates = feed(
            &mut state,
            &[
                InteractionEvent::section_expanded("Technology"),
                InteractionEvent::section_expanded("tech_stack"),
                InteractionEvent::section_expanded("Tech Stack"),
            ],
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(state.section("tech_stack").expanded, 3);
    }

    #[test]
    fn test_section_confidence_caps() {
        let mut state = TrackerState::new();
        let candidates = feed(
            &mut state,
            &vec![InteractionEvent::section_expanded("news"); 10],
        );
        let last = candidates.last().unwrap();
        assert_eq!(last.confidence, EXPAND_CONFIDENCE_CAP);

        let mut state = TrackerState::new();
        let candidates = feed(
            &mut state,
            &vec![InteractionEvent::section_collapsed("news"); 10],
        );
        assert_eq!(candidates.last().unwrap().confidence, COLLAPSE_CONFIDENCE_CAP);
    }

    #[test]
    fn test_collapse_dominance_yields_negative_focus() {
        let mut state = TrackerState::new();
        let candidates = feed(
            &mut state,
            &[
                InteractionEvent::section_collapsed("Funding"),
                InteractionEvent::section_collapsed("Funding"),
                InteractionEvent::section_collapsed("Funding"),
            ],
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key.as_str(), "focus.funding");
        assert_eq!(candidates[0].value, PreferenceValue::Flag(false));
        assert!((candidates[0].confidence - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_mixed_engagement_does_not_dominate() {
        let mut state = TrackerState::new();
        let candidates = feed(
            &mut state,
            &[
                InteractionEvent::section_collapsed("news"),
                InteractionEvent::section_collapsed("news"),
                InteractionEvent::section_expanded("news"),
                InteractionEvent::section_expanded("news"),
                InteractionEvent::section_expanded("news"),
            ],
        );
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_unusable_section_is_ignored() {
        let mut state = TrackerState::new();
        assert!(state.observe(&InteractionEvent::section_expanded("???")).is_empty());
        assert!(state.section_engagement.is_empty());
    }

    #[test]
    fn test_deep_research_dominance() {
        let mut state = TrackerState::new();
        let candidates = research(&mut state, 4, 1);

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.key, PreferenceKey::coverage_depth());
        assert_eq!(c.value, PreferenceValue::Depth(CoverageDepth::Deep));
        assert!((c.confidence - 0.81).abs() < 1e-4);
    }

    #[test]
    fn test_quick_research_dominance() {
        let mut state = TrackerState::new();
        let candidates = research(&mut state, 1, 4);

        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value,
            PreferenceValue::Depth(CoverageDepth::Shallow)
        );
    }

    #[test]
    fn test_research_needs_five_runs() {
        let mut state = TrackerState::new();
        assert!(research(&mut state, 4, 0).is_empty());
        assert_eq!(research(&mut state, 1, 0).len(), 1);
    }

    #[test]
    fn test_balanced_research_yields_nothing() {
        let mut state = TrackerState::new();
        assert!(research(&mut state, 3, 2).is_empty());
    }

    #[test]
    fn test_follow_up_needs_two_prior_asks() {
        let mut state = TrackerState::new();
        let ask = InteractionEvent::follow_up_asked("Hiring");

        assert!(state.observe(&ask).is_empty());
        assert!(state.observe(&ask).is_empty());

        let third = state.observe(&ask);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].key.as_str(), "focus.hiring");
        assert!((third[0].confidence - 0.80).abs() < 1e-4);

        let fourth = state.observe(&ask);
        assert!((fourth[0].confidence - 0.85).abs() < 1e-4);
        let fifth = state.observe(&ask);
        assert!((fifth[0].confidence - 0.85).abs() < 1e-4);
    }

    #[test]
    fn test_report_saved_emits_each_section_once() {
        let mut state = TrackerState::new();
        let candidates =
            state.observe(&InteractionEvent::report_saved(["Technology", "Tech Stack", "News"]));

        let keys: Vec<&str> = candidates.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["focus.news", "focus.tech_stack"]);
        assert!(candidates
            .iter()
            .all(|c| c.confidence == REPORT_SAVE_CONFIDENCE));
    }

    #[test]
    fn test_confirmation_is_high_confidence_followup() {
        let mut state = TrackerState::new();
        let candidates = state.observe(&InteractionEvent::preference_confirmed(
            PreferenceKey::coverage_depth(),
            PreferenceValue::Depth(CoverageDepth::Shallow),
        ));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, CONFIRMED_CONFIDENCE);
        assert_eq!(candidates[0].source, PreferenceSource::Followup);
    }

    #[test]
    fn test_confirmation_with_wrong_value_type_is_rejected() {
        let mut state = TrackerState::new();
        let candidates = state.observe(&InteractionEvent::preference_confirmed(
            PreferenceKey::coverage_depth(),
            PreferenceValue::Flag(true),
        ));
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_confirmation_from_the_wire_keeps_text_values() {
        let mut state = TrackerState::new();

        let text: InteractionEvent = serde_json::from_str(
            r#"{"type":"preference_confirmed","key":"format.length","value":"shallow"}"#,
        )
        .unwrap();
        let candidates = state.observe(&text);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, PreferenceValue::Text("shallow".to_string()));
        assert_eq!(candidates[0].confidence, CONFIRMED_CONFIDENCE);

        let depth: InteractionEvent = serde_json::from_str(
            r#"{"type":"preference_confirmed","key":"coverage.depth","value":"deep"}"#,
        )
        .unwrap();
        let candidates = state.observe(&depth);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value,
            PreferenceValue::Depth(CoverageDepth::Deep)
        );
    }

    #[test]
    fn test_state_serializes() {
        let mut state = TrackerState::new();
        research(&mut state, 2, 1);
        state.observe(&InteractionEvent::section_expanded("news"));

        let json = serde_json::to_string(&state).unwrap();
        let back: TrackerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    fn arb_event() -> impl Strategy<Value = InteractionEvent> {
        let section = prop_oneof![
            Just("Tech Stack"),
            Just("News"),
            Just("Funding"),
            Just("Hiring")
        ];
        prop_oneof![
            section.clone().prop_map(InteractionEvent::section_expanded),
            section.clone().prop_map(InteractionEvent::section_collapsed),
            section.prop_map(InteractionEvent::follow_up_asked),
            prop_oneof![
                Just(ResearchDepth::Quick),
                Just(ResearchDepth::Standard),
                Just(ResearchDepth::Deep)
            ]
            .prop_map(InteractionEvent::research_completed),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Candidate confidence always stays inside the rule caps.
        #[test]
        fn prop_confidence_within_caps(events in proptest::collection::vec(arb_event(), 0..60)) {
            let mut state = TrackerState::new();
            for candidate in feed(&mut state, &events) {
                prop_assert!(candidate.confidence >= 0.60);
                prop_assert!(candidate.confidence <= EXPAND_CONFIDENCE_CAP);
            }
        }

        /// The same event sequence always derives the same candidates.
        #[test]
        fn prop_rules_are_deterministic(events in proptest::collection::vec(arb_event(), 0..40)) {
            let mut a = TrackerState::new();
            let mut b = TrackerState::new();
            prop_assert_eq!(feed(&mut a, &events), feed(&mut b, &events));
            prop_assert_eq!(a, b);
        }
    }
}
