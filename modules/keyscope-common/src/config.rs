//! Named configuration for every tunable the engine uses. Weights and
//! thresholds are data, not compile-time constants, so they can be tuned
//! without touching scoring logic. Defaults are documented on each field.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{PriorityBucket, RankingState, SearchIntent};

/// Intent-value weights for the demand factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct IntentWeights {
    /// Default 3.0
    pub transactional: f64,
    /// Default 2.0
    pub commercial: f64,
    /// Default 1.5
    pub informational: f64,
    /// Default 1.0
    pub navigational: f64,
    /// Default 1.0
    pub unknown: f64,
}

impl Default for IntentWeights {
    fn default() -> Self {
        Self {
            transactional: 3.0,
            commercial: 2.0,
            informational: 1.5,
            navigational: 1.0,
            unknown: 1.0,
        }
    }
}

impl IntentWeights {
    pub fn weight(&self, intent: SearchIntent) -> f64 {
        match intent {
            SearchIntent::Transactional => self.transactional,
            SearchIntent::Commercial => self.commercial,
            SearchIntent::Informational => self.informational,
            SearchIntent::Navigational => self.navigational,
            SearchIntent::Unknown => self.unknown,
        }
    }
}

/// Ranking-gap multipliers for the feasibility factor. A page sitting just
/// off page 1 needs less marginal effort than one not ranking at all; a
/// page already in the top 3 has little upside left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RankingGapMultipliers {
    /// Default 1.0. Also applies to positions beyond 50 (practically invisible).
    pub not_ranking: f64,
    /// Default 1.2
    pub pos_21_50: f64,
    /// Default 1.5
    pub pos_8_20: f64,
    /// Default 1.3
    pub pos_4_7: f64,
    /// Default 0.1
    pub pos_1_3: f64,
}

impl Default for RankingGapMultipliers {
    fn default() -> Self {
        Self {
            not_ranking: 1.0,
            pos_21_50: 1.2,
            pos_8_20: 1.5,
            pos_4_7: 1.3,
            pos_1_3: 0.1,
        }
    }
}

impl RankingGapMultipliers {
    pub fn multiplier(&self, state: RankingState) -> f64 {
        match state {
            RankingState::NotRanking => self.not_ranking,
            RankingState::Position(p) => match p {
                1..=3 => self.pos_1_3,
                4..=7 => self.pos_4_7,
                8..=20 => self.pos_8_20,
                21..=50 => self.pos_21_50,
                _ => self.not_ranking,
            },
        }
    }
}

/// Minimum score for each bucket; anything below `medium` is `low`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BucketThresholds {
    /// Default 8.0
    pub critical: f64,
    /// Default 4.0
    pub high: f64,
    /// Default 2.0
    pub medium: f64,
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            critical: 8.0,
            high: 4.0,
            medium: 2.0,
        }
    }
}

impl BucketThresholds {
    pub fn bucket(&self, score: f64) -> PriorityBucket {
        if score >= self.critical {
            PriorityBucket::Critical
        } else if score >= self.high {
            PriorityBucket::High
        } else if score >= self.medium {
            PriorityBucket::Medium
        } else {
            PriorityBucket::Low
        }
    }
}

/// Substitutes used when a required scoring input is null. Substitution is
/// always paired with the partial-confidence penalty and shows up in the
/// factor breakdown — never silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NeutralDefaults {
    /// Monthly volume assumed when unknown. Default 100.
    pub volume: u64,
    /// Competition assumed when unknown (midpoint). Default 0.5.
    pub competition: f64,
}

impl Default for NeutralDefaults {
    fn default() -> Self {
        Self {
            volume: 100,
            competition: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoringConfig {
    pub intent_weights: IntentWeights,
    pub ranking_gap: RankingGapMultipliers,
    pub buckets: BucketThresholds,
    pub neutral: NeutralDefaults,
    /// Multiplier applied when volume, competition, or ranking is null.
    /// Default 0.6.
    pub partial_penalty: f64,
    /// Strategic weight used when the caller supplies none. Default 1.0.
    pub default_strategic_weight: f64,
    /// Caller-supplied strategic weights are clamped to this range.
    /// Defaults 1.0 / 3.0.
    pub strategic_weight_min: f64,
    pub strategic_weight_max: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            intent_weights: IntentWeights::default(),
            ranking_gap: RankingGapMultipliers::default(),
            buckets: BucketThresholds::default(),
            neutral: NeutralDefaults::default(),
            partial_penalty: 0.6,
            default_strategic_weight: 1.0,
            strategic_weight_min: 1.0,
            strategic_weight_max: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GapConfig {
    /// An item must appear in at least this many competitors to be a gap.
    /// Default 2.
    pub min_support: u32,
    /// Impact weight for topic gaps. Default 1.0.
    pub topic_impact: f64,
    /// Impact weight for SERP-feature gaps. Default 1.2.
    pub serp_feature_impact: f64,
    /// Impact weight for structural gaps. Default 1.5.
    pub structural_impact: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            min_support: 2,
            topic_impact: 1.0,
            serp_feature_impact: 1.2,
            structural_impact: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RankerConfig {
    /// Effort assumed when the caller supplies no estimate. Default 1.0.
    pub default_effort: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            default_effort: 1.0,
        }
    }
}

/// Everything the pure pipeline needs in one place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub gap: GapConfig,
    pub ranker: RankerConfig,
}
