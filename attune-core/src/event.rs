//! Interaction events fed to the preference tracker.

use crate::{PreferenceKey, PreferenceValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Depth label a research run was executed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDepth {
    Quick,
    Standard,
    Deep,
}

impl ResearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchDepth::Quick => "quick",
            ResearchDepth::Standard => "standard",
            ResearchDepth::Deep => "deep",
        }
    }
}

impl fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete user interaction.
///
/// Events are ephemeral: the tracker folds them into counters and never
/// stores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    SectionExpanded {
        section: String,
        #[serde(default)]
        chat_id: Option<String>,
    },
    SectionCollapsed {
        section: String,
        #[serde(default)]
        chat_id: Option<String>,
    },
    ResearchCompleted {
        depth: ResearchDepth,
        #[serde(default)]
        company: Option<String>,
        #[serde(default)]
        chat_id: Option<String>,
    },
    FollowUpAsked {
        topic: String,
        #[serde(default)]
        chat_id: Option<String>,
    },
    ReportSaved {
        sections: Vec<String>,
        #[serde(default)]
        chat_id: Option<String>,
    },
    PreferenceConfirmed {
        key: PreferenceKey,
        value: PreferenceValue,
        #[serde(default)]
        chat_id: Option<String>,
    },
}

impl InteractionEvent {
    /// Short name of the event type, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InteractionEvent::SectionExpanded { .. } => "section_expanded",
            InteractionEvent::SectionCollapsed { .. } => "section_collapsed",
            InteractionEvent::ResearchCompleted { .. } => "research_completed",
            InteractionEvent::FollowUpAsked { .. } => "follow_up_asked",
            InteractionEvent::ReportSaved { .. } => "report_saved",
            InteractionEvent::PreferenceConfirmed { .. } => "preference_confirmed",
        }
    }

    /// Session/chat the event happened in, if known.
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            InteractionEvent::SectionExpanded { chat_id, .. }
            | InteractionEvent::SectionCollapsed { chat_id, .. }
            | InteractionEvent::ResearchCompleted { chat_id, .. }
            | InteractionEvent::FollowUpAsked { chat_id, .. }
            | InteractionEvent::ReportSaved { chat_id, .. }
            | InteractionEvent::PreferenceConfirmed { chat_id, .. } => chat_id.as_deref(),
        }
    }

    pub fn section_expanded(section: impl Into<String>) -> Self {
        InteractionEvent::SectionExpanded {
            section: section.into(),
            chat_id: None,
        }
    }

    pub fn section_collapsed(section: impl Into<String>) -> Self {
        InteractionEvent::SectionCollapsed {
            section: section.into(),
            chat_id: None,
        }
    }

    pub fn research_completed(depth: ResearchDepth) -> Self {
        InteractionEvent::ResearchCompleted {
            depth,
            company: None,
            chat_id: None,
        }
    }

    pub fn follow_up_asked(topic: impl Into<String>) -> Self {
        InteractionEvent::FollowUpAsked {
            topic: topic.into(),
            chat_id: None,
        }
    }

    pub fn report_saved<I, S>(sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InteractionEvent::ReportSaved {
            sections: sections.into_iter().map(Into::into).collect(),
            chat_id: None,
        }
    }

    pub fn preference_confirmed(key: PreferenceKey, value: PreferenceValue) -> Self {
        InteractionEvent::PreferenceConfirmed {
            key,
            value,
            chat_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format_is_tagged() {
        let event: InteractionEvent = serde_json::from_str(
            r#"{"type":"research_completed","depth":"deep","chat_id":"c-1"}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "research_completed");
        assert_eq!(event.chat_id(), Some("c-1"));
        assert!(matches!(
            event,
            InteractionEvent::ResearchCompleted {
                depth: ResearchDepth::Deep,
                ..
            }
        ));
    }

    #[test]
    fn test_confirmation_rejects_invalid_key_on_the_wire() {
        let parsed: Result<InteractionEvent, _> = serde_json::from_str(
            r#"{"type":"preference_confirmed","key":"Not A Key","value":true}"#,
        );
        assert!(parsed.is_err());
    }
}
