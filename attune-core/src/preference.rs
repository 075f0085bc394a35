//! Preference keys, typed values and the per-namespace value schema.
//!
//! Preference keys are dotted names (`focus.tech_stack`, `coverage.depth`).
//! The namespace before the first dot decides which kind of value the key may
//! carry, so a `focus.*` key can never be persisted with a free-text value.

use crate::{Timestamp, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PREFERENCE SOURCE
// ============================================================================

/// Where a preference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    /// Inferred from interaction behavior.
    Implicit,
    /// Stated by the user in answer to a follow-up question.
    Followup,
    /// Set directly through a settings surface.
    Explicit,
}

impl PreferenceSource {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PreferenceSource::Implicit => "implicit",
            PreferenceSource::Followup => "followup",
            PreferenceSource::Explicit => "explicit",
        }
    }
}

impl fmt::Display for PreferenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// PREFERENCE VALUES
// ============================================================================

/// How much ground a research run should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CoverageDepth {
    Deep,
    Shallow,
}

impl CoverageDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageDepth::Deep => "deep",
            CoverageDepth::Shallow => "shallow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deep" => Some(CoverageDepth::Deep),
            "shallow" => Some(CoverageDepth::Shallow),
            _ => None,
        }
    }
}

impl fmt::Display for CoverageDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a preference.
///
/// Serialized untagged so stored values stay plain JSON (`true`, `"deep"`,
/// `"bullets"`). A bare JSON string cannot tell a depth from text, so on its
/// own it always reads back as [`PreferenceValue::Text`]; records, candidates
/// and confirmations conform it to their key with [`PreferenceSchema::conform`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(untagged)]
pub enum PreferenceValue {
    Flag(bool),
    Depth(CoverageDepth),
    Text(String),
}

/// Wire shape of a value before its key is known.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Flag(bool),
    Text(String),
}

impl<'de> Deserialize<'de> for PreferenceValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawValue::deserialize(deserializer)? {
            RawValue::Flag(flag) => PreferenceValue::Flag(flag),
            RawValue::Text(text) => PreferenceValue::Text(text),
        })
    }
}

impl PreferenceValue {
    /// The kind of this value, for schema checks.
    pub fn kind(&self) -> ValueKind {
        match self {
            PreferenceValue::Flag(_) => ValueKind::Flag,
            PreferenceValue::Depth(_) => ValueKind::Depth,
            PreferenceValue::Text(_) => ValueKind::Text,
        }
    }
}

impl fmt::Display for PreferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceValue::Flag(flag) => write!(f, "{}", flag),
            PreferenceValue::Depth(depth) => write!(f, "{}", depth),
            PreferenceValue::Text(text) => f.write_str(text),
        }
    }
}

/// Discriminant of [`PreferenceValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Flag,
    Depth,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Flag => "flag",
            ValueKind::Depth => "depth",
            ValueKind::Text => "text",
        })
    }
}

// ============================================================================
// PREFERENCE KEYS
// ============================================================================

/// Namespace of a preference key (the segment before the first dot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PreferenceNamespace {
    /// Which report sections or topics to emphasize.
    Focus,
    /// How broad a research run should be.
    Coverage,
    /// Output formatting choices.
    Format,
    /// Any namespace without a dedicated schema.
    Other(String),
}

impl PreferenceNamespace {
    fn parse(segment: &str) -> Self {
        match segment {
            "focus" => PreferenceNamespace::Focus,
            "coverage" => PreferenceNamespace::Coverage,
            "format" => PreferenceNamespace::Format,
            other => PreferenceNamespace::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PreferenceNamespace::Focus => "focus",
            PreferenceNamespace::Coverage => "coverage",
            PreferenceNamespace::Format => "format",
            PreferenceNamespace::Other(name) => name,
        }
    }
}

impl fmt::Display for PreferenceNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated dotted preference key.
///
/// Keys contain at least two segments, each made of `[a-z0-9_]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(try_from = "String", into = "String")]
pub struct PreferenceKey(String);

impl PreferenceKey {
    /// The key inferred preferences use for research breadth.
    pub const COVERAGE_DEPTH: &'static str = "coverage.depth";

    /// Parse and validate a dotted key.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidKey {
            key: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = 0;
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                return Err(invalid("segments may only contain [a-z0-9_]"));
            }
            segments += 1;
        }
        if segments < 2 {
            return Err(invalid("expected <namespace>.<name>"));
        }

        Ok(Self(raw.to_string()))
    }

    /// Build a `focus.<suffix>` key from an already-normalized suffix.
    pub fn focus(suffix: &str) -> Result<Self, ValidationError> {
        Self::parse(&format!("focus.{}", suffix))
    }

    /// The `coverage.depth` key.
    pub fn coverage_depth() -> Self {
        Self(Self::COVERAGE_DEPTH.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace segment.
    pub fn namespace(&self) -> PreferenceNamespace {
        let head = self.0.split('.').next().unwrap_or_default();
        PreferenceNamespace::parse(head)
    }

    /// Everything after the namespace segment.
    pub fn name(&self) -> &str {
        self.0.split_once('.').map(|(_, rest)| rest).unwrap_or_default()
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PreferenceKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PreferenceKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PreferenceKey> for String {
    fn from(key: PreferenceKey) -> Self {
        key.0
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Value schema per key namespace.
///
/// - `focus.*` carries a flag
/// - `coverage.depth` carries a [`CoverageDepth`]
/// - everything else carries text
pub struct PreferenceSchema;

impl PreferenceSchema {
    /// The value kind a key accepts.
    pub fn value_kind(key: &PreferenceKey) -> ValueKind {
        match key.namespace() {
            PreferenceNamespace::Focus => ValueKind::Flag,
            PreferenceNamespace::Coverage if key.name() == "depth" => ValueKind::Depth,
            _ => ValueKind::Text,
        }
    }

    /// Reinterpret `value` as the kind `key` expects, where the JSON text is
    /// ambiguous. Anything that cannot be reinterpreted is returned unchanged.
    pub fn conform(key: &PreferenceKey, value: PreferenceValue) -> PreferenceValue {
        match (Self::value_kind(key), value) {
            (ValueKind::Depth, PreferenceValue::Text(text)) => match CoverageDepth::parse(&text) {
                Some(depth) => PreferenceValue::Depth(depth),
                None => PreferenceValue::Text(text),
            },
            (ValueKind::Text, PreferenceValue::Depth(depth)) => {
                PreferenceValue::Text(depth.as_str().to_string())
            }
            (_, value) => value,
        }
    }

    /// Check that `value` is acceptable for `key`.
    pub fn validate(key: &PreferenceKey, value: &PreferenceValue) -> Result<(), ValidationError> {
        let expected = Self::value_kind(key);
        if value.kind() == expected {
            Ok(())
        } else {
            Err(ValidationError::SchemaMismatch {
                key: key.to_string(),
                expected: expected.to_string(),
                got: value.kind().to_string(),
            })
        }
    }
}

// ============================================================================
// CANDIDATES AND RECORDS
// ============================================================================

/// A preference derived by the tracker and waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCandidate")]
pub struct PreferenceCandidate {
    pub key: PreferenceKey,
    pub value: PreferenceValue,
    /// Trust in this preference, always within [0.0, 1.0].
    pub confidence: f32,
    pub source: PreferenceSource,
}

impl PreferenceCandidate {
    /// Build a candidate, checking the value against the key's schema.
    ///
    /// The value is conformed to the key first, so `"shallow"` text on
    /// `coverage.depth` becomes a depth. Confidence is clamped to [0.0, 1.0];
    /// NaN is rejected.
    pub fn new(
        key: PreferenceKey,
        value: PreferenceValue,
        confidence: f32,
        source: PreferenceSource,
    ) -> Result<Self, ValidationError> {
        let value = PreferenceSchema::conform(&key, value);
        PreferenceSchema::validate(&key, &value)?;
        if confidence.is_nan() {
            return Err(ValidationError::ConfidenceOutOfRange {
                key: key.to_string(),
                value: confidence.to_string(),
            });
        }
        Ok(Self {
            key,
            value,
            confidence: confidence.clamp(0.0, 1.0),
            source,
        })
    }
}

#[derive(Deserialize)]
struct RawCandidate {
    key: PreferenceKey,
    value: PreferenceValue,
    confidence: f32,
    source: PreferenceSource,
}

impl TryFrom<RawCandidate> for PreferenceCandidate {
    type Error = ValidationError;

    fn try_from(raw: RawCandidate) -> Result<Self, Self::Error> {
        Self::new(raw.key, raw.value, raw.confidence, raw.source)
    }
}

/// A persisted preference as read back from storage.
///
/// On deserialization the value is conformed to the key's schema but not
/// rejected, so one odd stored row does not hide the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PreferenceRecord {
    pub key: PreferenceKey,
    pub value: PreferenceValue,
    pub confidence: f32,
    pub source: PreferenceSource,
    pub updated_at: Timestamp,
}

#[derive(Deserialize)]
struct RawRecord {
    key: PreferenceKey,
    value: PreferenceValue,
    confidence: f32,
    source: PreferenceSource,
    updated_at: Timestamp,
}

impl<'de> Deserialize<'de> for PreferenceRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRecord::deserialize(deserializer)?;
        Ok(Self {
            value: PreferenceSchema::conform(&raw.key, raw.value),
            key: raw.key,
            confidence: raw.confidence,
            source: raw.source,
            updated_at: raw.updated_at,
        })
    }
}

/// All learned preferences of one user, one record per key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LearnedPreferences {
    records: BTreeMap<PreferenceKey, PreferenceRecord>,
}

impl LearnedPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing record for the same key.
    pub fn insert(&mut self, record: PreferenceRecord) {
        self.records.insert(record.key.clone(), record);
    }

    pub fn get(&self, key: &PreferenceKey) -> Option<&PreferenceRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &PreferenceRecord> {
        self.records.values()
    }

    /// Records with confidence at or above `min_confidence`, in key order.
    pub fn applied(&self, min_confidence: f32) -> impl Iterator<Item = &PreferenceRecord> {
        self.records
            .values()
            .filter(move |record| record.confidence >= min_confidence)
    }

    /// Records grouped by namespace, each group in key order.
    pub fn grouped(&self) -> BTreeMap<PreferenceNamespace, Vec<PreferenceRecord>> {
        let mut groups: BTreeMap<PreferenceNamespace, Vec<PreferenceRecord>> = BTreeMap::new();
        for record in self.records.values() {
            groups
                .entry(record.key.namespace())
                .or_default()
                .push(record.clone());
        }
        groups
    }
}

impl FromIterator<PreferenceRecord> for LearnedPreferences {
    fn from_iter<I: IntoIterator<Item = PreferenceRecord>>(iter: I) -> Self {
        let mut prefs = Self::new();
        for record in iter {
            prefs.insert(record);
        }
        prefs
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn record(key: &str, value: PreferenceValue, confidence: f32) -> PreferenceRecord {
        PreferenceRecord {
            key: PreferenceKey::parse(key).unwrap(),
            value,
            confidence,
            source: PreferenceSource::Implicit,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_key_parse_accepts_dotted_names() {
        let key = PreferenceKey::parse("focus.tech_stack").unwrap();
        assert_eq!(key.namespace(), PreferenceNamespace::Focus);
        assert_eq!(key.name(), "tech_stack");
        assert_eq!(key.to_string(), "focus.tech_stack");
    }

    #[test]
    fn test_key_parse_rejects_malformed() {
        assert!(PreferenceKey::parse("").is_err());
        assert!(PreferenceKey::parse("focus").is_err());
        assert!(PreferenceKey::parse("focus.").is_err());
        assert!(PreferenceKey::parse("Focus.Tech").is_err());
        assert!(PreferenceKey::parse("focus.tech stack").is_err());
    }

    #[test]
    fn test_schema_per_namespace() {
        let focus = PreferenceKey::focus("funding").unwrap();
        let depth = PreferenceKey::coverage_depth();
        let format = PreferenceKey::parse("format.style").unwrap();

        assert_eq!(PreferenceSchema::value_kind(&focus), ValueKind::Flag);
        assert_eq!(PreferenceSchema::value_kind(&depth), ValueKind::Depth);
        assert_eq!(PreferenceSchema::value_kind(&format), ValueKind::Text);

        assert!(PreferenceSchema::validate(&focus, &PreferenceValue::Flag(true)).is_ok());
        assert!(PreferenceSchema::validate(
            &focus,
            &PreferenceValue::Text("yes".to_string())
        )
        .is_err());
        assert!(PreferenceSchema::validate(
            &depth,
            &PreferenceValue::Depth(CoverageDepth::Deep)
        )
        .is_ok());
        assert!(PreferenceSchema::validate(&depth, &PreferenceValue::Flag(true)).is_err());
    }

    #[test]
    fn test_candidate_clamps_confidence() {
        let key = PreferenceKey::focus("news").unwrap();
        let high = PreferenceCandidate::new(
            key.clone(),
            PreferenceValue::Flag(true),
            1.4,
            PreferenceSource::Implicit,
        )
        .unwrap();
        assert_eq!(high.confidence, 1.0);

        let nan = PreferenceCandidate::new(
            key,
            PreferenceValue::Flag(true),
            f32::NAN,
            PreferenceSource::Implicit,
        );
        assert!(nan.is_err());
    }

    #[test]
    fn test_value_serializes_untagged() {
        assert_eq!(
            serde_json::to_string(&PreferenceValue::Flag(true)).unwrap(),
            "true"
        );
        assert_eq!(
            serde_json::to_string(&PreferenceValue::Depth(CoverageDepth::Shallow)).unwrap(),
            "\"shallow\""
        );
        let parsed: PreferenceValue = serde_json::from_str("\"deep\"").unwrap();
        assert_eq!(parsed, PreferenceValue::Text("deep".to_string()));
        let parsed: PreferenceValue = serde_json::from_str("\"bullets\"").unwrap();
        assert_eq!(parsed, PreferenceValue::Text("bullets".to_string()));
    }

    #[test]
    fn test_learned_preferences_grouping_and_threshold() {
        let prefs: LearnedPreferences = vec![
            record("focus.funding", PreferenceValue::Flag(true), 0.9),
            record("focus.hiring", PreferenceValue::Flag(false), 0.5),
            record(
                "coverage.depth",
                PreferenceValue::Depth(CoverageDepth::Deep),
                0.8,
            ),
        ]
        .into_iter()
        .collect();

        let groups = prefs.grouped();
        assert_eq!(groups[&PreferenceNamespace::Focus].len(), 2);
        assert_eq!(groups[&PreferenceNamespace::Coverage].len(), 1);

        let applied: Vec<_> = prefs.applied(0.6).map(|r| r.key.as_str()).collect();
        assert_eq!(applied, vec!["coverage.depth", "focus.funding"]);
    }

    #[test]
    fn test_learned_preferences_roundtrip_json_map() {
        let prefs: LearnedPreferences =
            vec![record("focus.news", PreferenceValue::Flag(true), 0.7)]
                .into_iter()
                .collect();
        let json = serde_json::to_string(&prefs).unwrap();
        let back: LearnedPreferences = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prefs);
    }

    #[test]
    fn test_text_value_survives_reload_on_text_key() {
        let prefs: LearnedPreferences = vec![
            record(
                "format.length",
                PreferenceValue::Text("shallow".to_string()),
                0.8,
            ),
            record(
                "coverage.depth",
                PreferenceValue::Depth(CoverageDepth::Shallow),
                0.8,
            ),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&prefs).unwrap();
        let back: LearnedPreferences = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prefs);

        let length = back.get(&PreferenceKey::parse("format.length").unwrap()).unwrap();
        assert_eq!(length.value, PreferenceValue::Text("shallow".to_string()));
        let depth = back.get(&PreferenceKey::coverage_depth()).unwrap();
        assert_eq!(depth.value, PreferenceValue::Depth(CoverageDepth::Shallow));
    }

    #[test]
    fn test_conform_follows_key_schema() {
        let depth = PreferenceKey::coverage_depth();
        let format = PreferenceKey::parse("format.length").unwrap();
        let focus = PreferenceKey::focus("news").unwrap();

        assert_eq!(
            PreferenceSchema::conform(&depth, PreferenceValue::Text("deep".to_string())),
            PreferenceValue::Depth(CoverageDepth::Deep)
        );
        assert_eq!(
            PreferenceSchema::conform(&depth, PreferenceValue::Text("medium".to_string())),
            PreferenceValue::Text("medium".to_string())
        );
        assert_eq!(
            PreferenceSchema::conform(&format, PreferenceValue::Depth(CoverageDepth::Deep)),
            PreferenceValue::Text("deep".to_string())
        );
        assert_eq!(
            PreferenceSchema::conform(&focus, PreferenceValue::Flag(true)),
            PreferenceValue::Flag(true)
        );
    }

    #[test]
    fn test_candidate_deserializes_against_key() {
        let candidate: PreferenceCandidate = serde_json::from_str(
            r#"{"key":"coverage.depth","value":"deep","confidence":0.8,"source":"implicit"}"#,
        )
        .unwrap();
        assert_eq!(candidate.value, PreferenceValue::Depth(CoverageDepth::Deep));

        let text: PreferenceCandidate = serde_json::from_str(
            r#"{"key":"format.length","value":"shallow","confidence":0.8,"source":"followup"}"#,
        )
        .unwrap();
        assert_eq!(text.value, PreferenceValue::Text("shallow".to_string()));

        let mismatched = serde_json::from_str::<PreferenceCandidate>(
            r#"{"key":"focus.news","value":"yes","confidence":0.8,"source":"implicit"}"#,
        );
        assert!(mismatched.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any key built from valid segments parses and keeps its namespace.
        #[test]
        fn prop_valid_keys_parse(
            namespace in "[a-z][a-z0-9_]{0,8}",
            name in "[a-z0-9_]{1,12}",
        ) {
            let raw = format!("{}.{}", namespace, name);
            let key = PreferenceKey::parse(&raw);
            prop_assert!(key.is_ok());
            let key = key.unwrap();
            let key_namespace = key.namespace();
            prop_assert_eq!(key_namespace.as_str(), namespace.as_str());
            prop_assert_eq!(key.name(), name.as_str());
        }
    }
}
