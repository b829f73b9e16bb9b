//! Opportunity Scorer.
//!
//! Weighted multiplicative model over four factor groups: demand
//! (log-scaled volume × intent weight), feasibility (inverse competition ×
//! ranking-gap multiplier), caller-supplied strategic weight, and a
//! confidence penalty when a required input is missing. Every term lands
//! in the factor breakdown so a score can be explained and asserted on.
//! All weights and thresholds come from [`ScoringConfig`].

use std::cmp::Ordering;

use tracing::debug;

use keyscope_common::{
    Confidence, KeyscopeError, OpportunityScore, RankingState, Result, ScoreFactor, ScoringConfig,
    SearchIntent, SerpSnapshot,
};

use crate::resolver::KeywordEntity;

pub struct Scorer {
    cfg: ScoringConfig,
}

impl Scorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self { cfg }
    }

    /// Score one keyword entity against a target page.
    ///
    /// `ranking` is three-valued: `Some(Position)` / `Some(NotRanking)` are
    /// both knowledge; `None` means unknown. When `ranking` is `None` and a
    /// snapshot plus target URL are available, the ranking is derived from
    /// the snapshot (absence from a collected SERP is knowledge too).
    ///
    /// Never fails on missing optional inputs — those substitute neutral
    /// defaults, multiply in the partial penalty, and flag the result
    /// `partial`. Fails only with `InvalidEntity` when the keyword identity
    /// itself is absent.
    pub fn score(
        &self,
        entity: &KeywordEntity,
        snapshot: Option<&SerpSnapshot>,
        target_url: Option<&str>,
        ranking: Option<RankingState>,
        strategic_weight: Option<f64>,
    ) -> Result<OpportunityScore> {
        if !entity.key.is_valid() {
            return Err(KeyscopeError::InvalidEntity(
                "cannot score an entity without keyword identity".to_string(),
            ));
        }

        let cfg = &self.cfg;
        let mut factors = Vec::new();
        let mut partial = false;

        // Demand: log-scaled volume dampens outliers; intent carries value.
        let volume = match entity.volume.as_ref() {
            Some(o) => o.value,
            None => {
                partial = true;
                cfg.neutral.volume
            }
        };
        let volume_log = ((1 + volume) as f64).log10();
        factors.push(ScoreFactor {
            name: "demand.volume_log10".to_string(),
            input: volume as f64,
            contribution: volume_log,
        });

        let intent = entity
            .intent
            .as_ref()
            .map(|o| o.value)
            .unwrap_or(SearchIntent::Unknown);
        let intent_weight = cfg.intent_weights.weight(intent);
        factors.push(ScoreFactor {
            name: format!("demand.intent.{intent}"),
            input: intent_weight,
            contribution: intent_weight,
        });

        // Feasibility: inverse competition × ranking-gap multiplier.
        let competition = match entity.competition.as_ref() {
            Some(o) => o.value,
            None => {
                partial = true;
                cfg.neutral.competition
            }
        };
        factors.push(ScoreFactor {
            name: "feasibility.inverse_competition".to_string(),
            input: competition,
            contribution: 1.0 - competition,
        });

        let ranking = ranking.or_else(|| {
            match (snapshot, target_url) {
                (Some(snap), Some(url)) => Some(snap.ranking_of(url)),
                // A snapshot with no target page means the keyword is being
                // scored for the "not ranking" state — that is knowledge.
                (Some(_), None) => Some(RankingState::NotRanking),
                _ => None,
            }
        });
        let ranking_state = match ranking {
            Some(state) => state,
            None => {
                partial = true;
                RankingState::NotRanking
            }
        };
        let gap_multiplier = cfg.ranking_gap.multiplier(ranking_state);
        factors.push(ScoreFactor {
            name: "feasibility.ranking_gap".to_string(),
            input: match ranking_state {
                RankingState::Position(p) => p as f64,
                RankingState::NotRanking => 0.0,
            },
            contribution: gap_multiplier,
        });

        // Strategic weight: caller-supplied business relevance, clamped.
        let strategic = strategic_weight
            .unwrap_or(cfg.default_strategic_weight)
            .clamp(cfg.strategic_weight_min, cfg.strategic_weight_max);
        factors.push(ScoreFactor {
            name: "strategic_weight".to_string(),
            input: strategic,
            contribution: strategic,
        });

        // Confidence penalty: visible in the breakdown, never silent.
        let penalty = if partial { cfg.partial_penalty } else { 1.0 };
        factors.push(ScoreFactor {
            name: "confidence.penalty".to_string(),
            input: penalty,
            contribution: penalty,
        });

        let score: f64 = factors.iter().map(|f| f.contribution).product();
        let bucket = cfg.buckets.bucket(score);
        debug!(key = %entity.key, score, bucket = %bucket, partial, "Scored keyword");

        Ok(OpportunityScore {
            key: entity.key.clone(),
            target_url: target_url.map(str::to_string),
            score,
            factors,
            bucket,
            confidence: if partial {
                Confidence::Partial
            } else {
                Confidence::Full
            },
            volume: entity.volume.as_ref().map(|o| o.value),
        })
    }
}

/// Ordering for score lists: higher score first; equal scores prefer
/// full-confidence data, then higher raw volume, then lexical key — the
/// last leg keeps the ordering total and reproducible.
pub fn compare(a: &OpportunityScore, b: &OpportunityScore) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| confidence_rank(a.confidence).cmp(&confidence_rank(b.confidence)))
        .then_with(|| b.volume.unwrap_or(0).cmp(&a.volume.unwrap_or(0)))
        .then_with(|| a.key.cmp(&b.key))
}

fn confidence_rank(c: Confidence) -> u8 {
    match c {
        Confidence::Full => 0,
        Confidence::Partial => 1,
    }
}
