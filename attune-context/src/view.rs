//! Read view of a user's learned preferences for display and administration.

use std::collections::BTreeMap;

use attune_core::{LearnedPreferences, PreferenceRecord};
use serde::{Deserialize, Serialize};

/// Raw and namespace-grouped preference records, both in key order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PreferenceView {
    pub raw: Vec<PreferenceRecord>,
    /// Keyed by namespace name (`focus`, `coverage`, ...).
    pub grouped: BTreeMap<String, Vec<PreferenceRecord>>,
}

impl From<&LearnedPreferences> for PreferenceView {
    fn from(prefs: &LearnedPreferences) -> Self {
        Self {
            raw: prefs.iter().cloned().collect(),
            grouped: prefs
                .grouped()
                .into_iter()
                .map(|(namespace, records)| (namespace.to_string(), records))
                .collect(),
        }
    }
}
