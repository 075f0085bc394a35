//! User profile data and the per-user cached context snapshot.

use crate::{LearnedPreferences, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ENUMS
// ============================================================================

/// Importance tier of a criterion or signal.
///
/// Unrecognized strings deserialize to `Unknown`, which never moves a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Critical,
    Important,
    NiceToHave,
    #[serde(other)]
    Unknown,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Critical => "critical",
            Importance::Important => "important",
            Importance::NiceToHave => "nice_to_have",
            Importance::Unknown => "unknown",
        }
    }

    /// Lenient parse used for loosely typed inputs.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "critical" => Importance::Critical,
            "important" => Importance::Important,
            "nice_to_have" | "optional" => Importance::NiceToHave,
            _ => Importance::Unknown,
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent a context is being loaded for.
///
/// Only derived prompt text depends on the agent type; the cached raw fields
/// are shared across agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Deep company research.
    #[default]
    Research,
    /// Account discovery against the ICP.
    Prospecting,
    /// Free-form conversation.
    Chat,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Research => "research",
            AgentType::Prospecting => "prospecting",
            AgentType::Chat => "chat",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PROFILE RECORDS
// ============================================================================

/// Explicitly configured profile.
///
/// Only the fields the core reads are typed; everything else rides along in
/// `attributes` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserProfile {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub target_industries: Vec<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// A qualitative fit criterion the user wants companies assessed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CustomCriterion {
    pub name: String,
    pub importance: Importance,
    #[serde(default)]
    pub description: Option<String>,
}

/// A business-event type the user wants watched (e.g. leadership change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SignalPreference {
    pub signal_type: String,
    pub importance: Importance,
    #[serde(default)]
    pub lookback_days: Option<u32>,
}

/// Prompt-shaping settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PromptConfig {
    #[serde(default)]
    pub preferred_tone: Option<String>,
    #[serde(default)]
    pub response_format: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

/// Result of the primary profile read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub profile: UserProfile,
    #[serde(default)]
    pub custom_criteria: Vec<CustomCriterion>,
    #[serde(default)]
    pub signals: Vec<SignalPreference>,
    #[serde(default)]
    pub disqualifiers: Vec<String>,
    #[serde(default)]
    pub prompt_config: PromptConfig,
}

// ============================================================================
// CACHED CONTEXT
// ============================================================================

/// Per-user snapshot held by the context cache.
///
/// Replaced wholesale on every write; never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedContext {
    pub user_id: UserId,
    pub profile: UserProfile,
    pub custom_criteria: Vec<CustomCriterion>,
    pub signals: Vec<SignalPreference>,
    pub disqualifiers: Vec<String>,
    pub prompt_config: PromptConfig,
    pub learned_preferences: LearnedPreferences,
    /// Memory notes, already bounded to the configured byte cap.
    pub memory_block: Option<String>,
    /// Agent the memory block was read for.
    pub memory_agent: AgentType,
    /// Stamped by the cache on insert.
    pub inserted_at: Timestamp,
}

impl CachedContext {
    /// Assemble a snapshot from the three fetch results.
    ///
    /// `inserted_at` is provisional until the cache stamps it.
    pub fn assemble(
        user_id: UserId,
        record: UserRecord,
        learned_preferences: LearnedPreferences,
        memory_block: Option<String>,
        memory_agent: AgentType,
        now: Timestamp,
    ) -> Self {
        Self {
            user_id,
            profile: record.profile,
            custom_criteria: record.custom_criteria,
            signals: record.signals,
            disqualifiers: record.disqualifiers,
            prompt_config: record.prompt_config,
            learned_preferences,
            memory_block,
            memory_agent,
            inserted_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_importance_unknown_strings_fall_back() {
        let parsed: Importance = serde_json::from_str("\"must_have_maybe\"").unwrap();
        assert_eq!(parsed, Importance::Unknown);
        let parsed: Importance = serde_json::from_str("\"nice_to_have\"").unwrap();
        assert_eq!(parsed, Importance::NiceToHave);
    }

    #[test]
    fn test_importance_parse_lossy() {
        assert_eq!(Importance::parse_lossy(" Critical "), Importance::Critical);
        assert_eq!(Importance::parse_lossy("nice-to-have"), Importance::NiceToHave);
        assert_eq!(Importance::parse_lossy(""), Importance::Unknown);
    }

    #[test]
    fn test_profile_keeps_unknown_attributes() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"company_name":"Acme","role":"AE","seniority":"senior"}"#,
        )
        .unwrap();
        assert_eq!(profile.company_name.as_deref(), Some("Acme"));
        assert_eq!(profile.attributes["seniority"], "senior");
    }

    #[test]
    fn test_assemble_moves_record_fields() {
        let user_id = UserId::generate();
        let record = UserRecord {
            disqualifiers: vec!["government".to_string()],
            ..Default::default()
        };
        let now = Utc::now();
        let ctx = CachedContext::assemble(
            user_id,
            record,
            LearnedPreferences::new(),
            Some("notes".to_string()),
            AgentType::Chat,
            now,
        );
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.disqualifiers, vec!["government".to_string()]);
        assert_eq!(ctx.memory_agent, AgentType::Chat);
        assert_eq!(ctx.inserted_at, now);
    }
}
