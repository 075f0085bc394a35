//! attune Scoring - ICP Fit Scoring
//!
//! Converts qualitative criterion assessments and time-stamped business
//! signals into a 0-100 fit score with an ordered, human-readable breakdown.
//!
//! Scoring is pure: the same input and the same "now" always produce the same
//! [`ScoreBreakdown`], factor for factor. Nothing here can fail; inputs that
//! cannot be interpreted contribute zero.
//!
//! # Algorithm
//!
//! ```text
//! 50 (neutral prior)
//!  + per criterion   critical +15/-20, important +10/-10, nice_to_have +5/-5, unknown 0
//!  + signals         critical <= 30d: +10 each, important <= 60d: +5 each, sum capped at +20
//!  - 10              if employee count is outside [30, 5000]
//! clamp to [0, 100], round to nearest 5
//! ```

use attune_core::{Clock, Importance, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Version tag stamped on every breakdown.
pub const SCORE_VERSION: &str = "icp-v1";

/// Score every company starts from.
pub const BASE_SCORE: i32 = 50;

/// Ceiling on the combined signal bonus.
pub const SIGNAL_BONUS_CAP: i32 = 20;

/// Critical signals count when detected within this many days.
pub const CRITICAL_SIGNAL_WINDOW_DAYS: i64 = 30;

/// Important signals count when detected within this many days.
pub const IMPORTANT_SIGNAL_WINDOW_DAYS: i64 = 60;

/// Employee counts outside this range take the size penalty.
pub const COMPANY_SIZE_RANGE: std::ops::RangeInclusive<u64> = 30..=5000;

/// Flat penalty for companies outside [`COMPANY_SIZE_RANGE`].
pub const SIZE_PENALTY: i32 = -10;

const SCORE_GRANULARITY: f64 = 5.0;

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Observed status of a criterion for one company.
///
/// `Unknown` is kept distinct from `NotMet` all the way into the breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Met,
    NotMet,
    #[serde(other)]
    Unknown,
}

impl CriterionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionStatus::Met => "met",
            CriterionStatus::NotMet => "not met",
            CriterionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CriterionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A criterion evaluated against one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CriterionAssessment {
    pub name: String,
    pub importance: Importance,
    pub status: CriterionStatus,
}

impl CriterionAssessment {
    pub fn new(name: impl Into<String>, importance: Importance, status: CriterionStatus) -> Self {
        Self {
            name: name.into(),
            importance,
            status,
        }
    }
}

/// A business event detected for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DetectedSignal {
    pub signal_type: String,
    pub importance: Importance,
    /// Signals without a date never qualify for the bonus.
    #[serde(default)]
    pub detected_at: Option<Timestamp>,
}

impl DetectedSignal {
    pub fn new(
        signal_type: impl Into<String>,
        importance: Importance,
        detected_at: Option<Timestamp>,
    ) -> Self {
        Self {
            signal_type: signal_type.into(),
            importance,
            detected_at,
        }
    }
}

/// Everything a score is computed from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreInput {
    #[serde(default)]
    pub criteria: Vec<CriterionAssessment>,
    #[serde(default)]
    pub signals: Vec<DetectedSignal>,
    #[serde(default)]
    pub employee_count: Option<u64>,
    /// Echoed into the breakdown for display; never affects the score.
    #[serde(default)]
    pub industry: Option<String>,
}

impl ScoreInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criteria(mut self, criteria: Vec<CriterionAssessment>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_signals(mut self, signals: Vec<DetectedSignal>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_employee_count(mut self, count: u64) -> Self {
        self.employee_count = Some(count);
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Score against the system clock.
    pub fn score(&self) -> ScoreBreakdown {
        self.score_at(Utc::now())
    }

    /// Score against an injected clock.
    pub fn score_with(&self, clock: &dyn Clock) -> ScoreBreakdown {
        self.score_at(clock.now())
    }

    /// Score against an explicit "now".
    pub fn score_at(&self, now: Timestamp) -> ScoreBreakdown {
        compute_score_at(
            &self.criteria,
            &self.signals,
            self.employee_count,
            self.industry.as_deref(),
            now,
        )
    }
}

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// One explained contribution to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ScoreFactor {
    pub label: String,
    pub delta: i32,
}

/// A computed score and the factors that produced it.
///
/// Factors are ordered: criteria in input order, then the signal aggregate,
/// then the size penalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ScoreBreakdown {
    /// Final score, in [0, 100] and a multiple of 5.
    pub score: u8,
    pub factors: Vec<ScoreFactor>,
    pub version: String,
    #[serde(default)]
    pub industry: Option<String>,
}

impl ScoreBreakdown {
    /// Sum of all factor deltas on top of the base score, before clamping.
    pub fn raw_total(&self) -> i32 {
        BASE_SCORE + self.factors.iter().map(|f| f.delta).sum::<i32>()
    }
}

// ============================================================================
// SCORING
// ============================================================================

/// Delta applied for one criterion.
pub fn criterion_delta(importance: Importance, status: CriterionStatus) -> i32 {
    match (importance, status) {
        (Importance::Critical, CriterionStatus::Met) => 15,
        (Importance::Critical, CriterionStatus::NotMet) => -20,
        (Importance::Important, CriterionStatus::Met) => 10,
        (Importance::Important, CriterionStatus::NotMet) => -10,
        (Importance::NiceToHave, CriterionStatus::Met) => 5,
        (Importance::NiceToHave, CriterionStatus::NotMet) => -5,
        (_, CriterionStatus::Unknown) | (Importance::Unknown, _) => 0,
    }
}

/// Bonus a single signal earns before the aggregate cap.
pub fn signal_bonus(signal: &DetectedSignal, now: Timestamp) -> i32 {
    let Some(detected_at) = signal.detected_at else {
        return 0;
    };
    // Future-dated signals count as detected today.
    let age_days = (now - detected_at).num_days().max(0);

    match signal.importance {
        Importance::Critical if age_days <= CRITICAL_SIGNAL_WINDOW_DAYS => 10,
        Importance::Important if age_days <= IMPORTANT_SIGNAL_WINDOW_DAYS => 5,
        _ => 0,
    }
}

/// Compute a fit score against the system clock.
pub fn compute_score(
    criteria: &[CriterionAssessment],
    signals: &[DetectedSignal],
    employee_count: Option<u64>,
    industry: Option<&str>,
) -> ScoreBreakdown {
    compute_score_at(criteria, signals, employee_count, industry, Utc::now())
}

/// Compute a fit score with an explicit "now" for signal recency.
pub fn compute_score_at(
    criteria: &[CriterionAssessment],
    signals: &[DetectedSignal],
    employee_count: Option<u64>,
    industry: Option<&str>,
    now: Timestamp,
) -> ScoreBreakdown {
    let mut factors = Vec::with_capacity(criteria.len() + 2);

    for criterion in criteria {
        factors.push(ScoreFactor {
            label: format!(
                "{} ({}): {}",
                criterion.name, criterion.importance, criterion.status
            ),
            delta: criterion_delta(criterion.importance, criterion.status),
        });
    }

    let qualifying: Vec<i32> = signals
        .iter()
        .map(|signal| signal_bonus(signal, now))
        .filter(|bonus| *bonus > 0)
        .collect();
    if !qualifying.is_empty() {
        let uncapped: i32 = qualifying.iter().sum();
        let delta = uncapped.min(SIGNAL_BONUS_CAP);
        let label = if uncapped > SIGNAL_BONUS_CAP {
            format!(
                "Recent signals: {} qualifying (capped at +{})",
                qualifying.len(),
                SIGNAL_BONUS_CAP
            )
        } else {
            format!("Recent signals: {} qualifying", qualifying.len())
        };
        factors.push(ScoreFactor { label, delta });
    }

    if let Some(count) = employee_count {
        if !COMPANY_SIZE_RANGE.contains(&count) {
            factors.push(ScoreFactor {
                label: format!(
                    "Company size {} outside {}-{} employees",
                    count,
                    COMPANY_SIZE_RANGE.start(),
                    COMPANY_SIZE_RANGE.end()
                ),
                delta: SIZE_PENALTY,
            });
        }
    }

    let raw = BASE_SCORE + factors.iter().map(|f| f.delta).sum::<i32>();
    let clamped = raw.clamp(0, 100);
    let score = ((clamped as f64 / SCORE_GRANULARITY).round() * SCORE_GRANULARITY) as u8;

    ScoreBreakdown {
        score,
        factors,
        version: SCORE_VERSION.to_string(),
        industry: industry.map(str::to_string),
    }
}

// ============================================================================
// TESTS
// ============================================================================
