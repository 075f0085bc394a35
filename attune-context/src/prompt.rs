//! Agent-specific derived prompt text.
//!
//! Rendering is pure and cheap, so it runs on every load, hit or miss. Only
//! the structured blocks are produced here; the surrounding prompt templates
//! belong to the caller.

use std::fmt;

use attune_core::{
    AgentType, CachedContext, CoverageDepth, CustomCriterion, PreferenceNamespace,
    PreferenceRecord, PreferenceValue, PromptConfig, SignalPreference,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// SECTIONS
// ============================================================================

/// Kind of derived prompt block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PromptSectionKind {
    /// Tone, format and custom instructions.
    Style,
    /// Directives from learned preferences.
    Preferences,
    /// ICP fit criteria.
    Criteria,
    /// Watched business events.
    Signals,
    /// Companies to rule out.
    Disqualifiers,
    /// Agent memory notes.
    Memory,
}

impl PromptSectionKind {
    pub fn heading(&self) -> &'static str {
        match self {
            PromptSectionKind::Style => "Response Style",
            PromptSectionKind::Preferences => "Learned Preferences",
            PromptSectionKind::Criteria => "Ideal Customer Criteria",
            PromptSectionKind::Signals => "Signals To Watch",
            PromptSectionKind::Disqualifiers => "Disqualifiers",
            PromptSectionKind::Memory => "Memory",
        }
    }
}

/// One rendered block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PromptSection {
    pub kind: PromptSectionKind,
    pub content: String,
}

/// Blocks an agent gets, in render order.
fn layout(agent: AgentType) -> &'static [PromptSectionKind] {
    use PromptSectionKind::*;
    match agent {
        AgentType::Research => &[Style, Preferences, Criteria, Signals, Memory],
        AgentType::Prospecting => &[Criteria, Signals, Disqualifiers, Preferences],
        AgentType::Chat => &[Style, Preferences, Memory],
    }
}

// ============================================================================
// DERIVED PROMPT
// ============================================================================

/// Structured prompt blocks derived from a cached context for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DerivedPrompt {
    pub agent: AgentType,
    pub sections: Vec<PromptSection>,
}

impl DerivedPrompt {
    /// Render the blocks `agent` uses. Empty blocks are left out.
    ///
    /// Learned preferences below `min_confidence` are not rendered. The memory
    /// block is only used when it was read for the same agent.
    pub fn build(context: &CachedContext, agent: AgentType, min_confidence: f32) -> Self {
        let sections = layout(agent)
            .iter()
            .filter_map(|kind| {
                let content = match kind {
                    PromptSectionKind::Style => format_style(&context.prompt_config),
                    PromptSectionKind::Preferences => format_preferences(
                        context.learned_preferences.applied(min_confidence),
                    ),
                    PromptSectionKind::Criteria => format_criteria(&context.custom_criteria),
                    PromptSectionKind::Signals => format_signals(&context.signals),
                    PromptSectionKind::Disqualifiers => bullet_list(&context.disqualifiers),
                    PromptSectionKind::Memory => match &context.memory_block {
                        Some(memory) if context.memory_agent == agent => memory.trim().to_string(),
                        _ => String::new(),
                    },
                };
                (!content.is_empty()).then_some(PromptSection {
                    kind: *kind,
                    content,
                })
            })
            .collect();

        Self { agent, sections }
    }

    pub fn section(&self, kind: PromptSectionKind) -> Option<&PromptSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// All blocks joined as headed markdown sections.
    pub fn as_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("## {}\n{}", s.kind.heading(), s.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for DerivedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

// ============================================================================
// FORMATTERS
// ============================================================================

fn format_style(config: &PromptConfig) -> String {
    let mut parts = Vec::new();

    if let Some(ref tone) = config.preferred_tone {
        parts.push(format!("Tone: {}", tone));
    }
    if let Some(ref format) = config.response_format {
        parts.push(format!("Format: {}", format));
    }
    if let Some(ref instructions) = config.custom_instructions {
        parts.push(format!("Instructions: {}", instructions));
    }

    parts.join("\n")
}

fn humanize(name: &str) -> String {
    name.replace('_', " ")
}

/// Turn one learned preference into an instruction line.
pub fn preference_directive(record: &PreferenceRecord) -> String {
    match (record.key.namespace(), &record.value) {
        (PreferenceNamespace::Focus, PreferenceValue::Flag(true)) => {
            format!("Emphasize {}", humanize(record.key.name()))
        }
        (PreferenceNamespace::Focus, PreferenceValue::Flag(false)) => {
            format!("De-emphasize {}", humanize(record.key.name()))
        }
        (PreferenceNamespace::Coverage, PreferenceValue::Depth(CoverageDepth::Deep)) => {
            "Go deep: cover each topic in full detail".to_string()
        }
        (PreferenceNamespace::Coverage, PreferenceValue::Depth(CoverageDepth::Shallow)) => {
            "Stay brief: favor high-level summaries".to_string()
        }
        (_, value) => format!("{}: {}", humanize(record.key.as_str()), value),
    }
}

fn format_preferences<'a>(records: impl Iterator<Item = &'a PreferenceRecord>) -> String {
    records
        .map(|r| format!("- {}", preference_directive(r)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_criteria(criteria: &[CustomCriterion]) -> String {
    criteria
        .iter()
        .map(|c| match c.description {
            Some(ref description) => format!(
                "- {} [{}]: {}",
                c.name,
                humanize(c.importance.as_str()),
                description
            ),
            None => format!("- {} [{}]", c.name, humanize(c.importance.as_str())),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_signals(signals: &[SignalPreference]) -> String {
    signals
        .iter()
        .map(|s| match s.lookback_days {
            Some(days) => format!(
                "- {} [{}], last {} days",
                humanize(&s.signal_type),
                humanize(s.importance.as_str()),
                days
            ),
            None => format!(
                "- {} [{}]",
                humanize(&s.signal_type),
                humanize(s.importance.as_str())
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
