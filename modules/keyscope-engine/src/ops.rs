//! Tool-invocation surface: each engine capability as an independently
//! invocable operation with explicit structured input and output plus a
//! partial flag. No implicit global state — callers hand in the signals
//! or audits they have, and the schemas (schemars) make the operations
//! suitable for exposure as discrete callable tools.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use keyscope_common::{
    normalize_keyword, Confidence, ContentGap, EngineConfig, OpportunityScore, PageAuditSignal,
    PriorityTarget, RankingState, Result, SerpSnapshot, Signal,
};

use crate::gap::GapSynthesizer;
use crate::rank::{RankCandidate, Ranker};
use crate::resolver::EntityStore;
use crate::score::{self, Scorer};

// ---------------------------------------------------------------------------
// score_opportunities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScoreOpportunitiesInput {
    /// Canonical signals to resolve and score.
    pub signals: Vec<Signal>,
    /// Page the scores are computed against; `None` scores every keyword
    /// as "not ranking".
    #[serde(default)]
    pub target_url: Option<String>,
    /// Known ranking states keyed by normalized keyword text, for callers
    /// that track positions outside the supplied snapshots.
    #[serde(default)]
    pub rankings: BTreeMap<String, RankingState>,
    /// Business-relevance multipliers keyed by normalized keyword text.
    #[serde(default)]
    pub strategic_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScoreOpportunitiesOutput {
    /// Scores ordered best-first (see the scorer's tie-break rules).
    pub scores: Vec<OpportunityScore>,
    /// True when any score was computed from incomplete data.
    pub partial: bool,
}

/// Resolve the supplied signals and score every keyword entity.
pub fn score_opportunities(
    cfg: &EngineConfig,
    input: ScoreOpportunitiesInput,
) -> Result<ScoreOpportunitiesOutput> {
    let mut store = EntityStore::new();
    for signal in input.signals {
        if let Err(e) = store.apply(signal) {
            // A bad signal degrades, it does not abort the operation.
            warn!(error = %e, "Dropping unresolvable signal");
        }
    }

    let scorer = Scorer::new(cfg.scoring.clone());
    let mut scores = Vec::new();
    for entity in store.keyword_entities() {
        let snapshot = store.latest_snapshot(&entity.key);
        let ranking = input.rankings.get(&entity.key.text).copied();
        let strategic = input
            .strategic_weights
            .get(&entity.key.text)
            .copied();
        scores.push(scorer.score(
            entity,
            snapshot,
            input.target_url.as_deref(),
            ranking,
            strategic,
        )?);
    }
    scores.sort_by(score::compare);

    let partial = scores.iter().any(|s| s.confidence == Confidence::Partial);
    Ok(ScoreOpportunitiesOutput { scores, partial })
}

// ---------------------------------------------------------------------------
// compute_gaps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComputeGapsInput {
    pub target: PageAuditSignal,
    pub competitors: Vec<PageAuditSignal>,
    /// Latest SERP snapshot for the keyword, for feature gaps.
    #[serde(default)]
    pub snapshot: Option<SerpSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComputeGapsOutput {
    pub gaps: Vec<ContentGap>,
    /// True when an input audit was incomplete (missing word count).
    pub partial: bool,
}

pub fn compute_gaps(cfg: &EngineConfig, input: ComputeGapsInput) -> Result<ComputeGapsOutput> {
    let synthesizer = GapSynthesizer::new(cfg.gap.clone());
    let gaps = synthesizer.compute(
        &input.target,
        &input.competitors,
        input.snapshot.as_ref(),
    );
    let partial = input.target.word_count.is_none()
        || input.competitors.iter().any(|c| c.word_count.is_none());
    Ok(ComputeGapsOutput { gaps, partial })
}

// ---------------------------------------------------------------------------
// rank_targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankTargetsInput {
    pub candidates: Vec<RankCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankTargetsOutput {
    pub targets: Vec<PriorityTarget>,
    /// True when any ranked score carried partial confidence.
    pub partial: bool,
}

pub fn rank_targets(cfg: &EngineConfig, input: RankTargetsInput) -> Result<RankTargetsOutput> {
    let partial = input
        .candidates
        .iter()
        .any(|c| c.score.confidence == Confidence::Partial);
    let targets = Ranker::new(cfg.ranker.clone()).rank(input.candidates);
    Ok(RankTargetsOutput { targets, partial })
}

/// Normalize caller-supplied per-keyword maps so lookups match entity keys.
pub fn normalize_map_keys<V: Clone>(map: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    map.iter()
        .map(|(k, v)| (normalize_keyword(k), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keyscope_common::{KeywordKey, KeywordSignal, PriorityBucket, SearchIntent};

    fn kw(text: &str, volume: Option<u64>, competition: Option<f64>) -> Signal {
        Signal::Keyword(KeywordSignal {
            key: KeywordKey::new(text, "us"),
            volume,
            competition,
            cpc_usd: None,
            intent: Some(SearchIntent::Commercial),
            related_terms: vec![],
            provider: "kw-data".to_string(),
            collected_at: Utc::now(),
        })
    }

    #[test]
    fn score_opportunities_is_self_contained() {
        let cfg = EngineConfig::default();
        let mut rankings = BTreeMap::new();
        rankings.insert("email marketing".to_string(), RankingState::NotRanking);
        rankings.insert("seo tools".to_string(), RankingState::NotRanking);

        let out = score_opportunities(
            &cfg,
            ScoreOpportunitiesInput {
                signals: vec![
                    kw("email marketing", Some(1200), Some(0.35)),
                    kw("seo tools", Some(900), None),
                ],
                target_url: None,
                rankings,
                strategic_weights: BTreeMap::new(),
            },
        )
        .unwrap();

        assert_eq!(out.scores.len(), 2);
        assert!(out.partial, "one keyword lacks competition data");
        assert_eq!(out.scores[0].key.text, "email marketing");
        assert_eq!(out.scores[0].confidence, Confidence::Full);
    }

    #[test]
    fn rank_targets_propagates_partial_flag() {
        let cfg = EngineConfig::default();
        let out = rank_targets(
            &cfg,
            RankTargetsInput {
                candidates: vec![RankCandidate {
                    score: OpportunityScore {
                        key: KeywordKey::new("kw", "us"),
                        target_url: None,
                        score: 3.0,
                        factors: vec![],
                        bucket: PriorityBucket::Medium,
                        confidence: Confidence::Partial,
                        volume: None,
                    },
                    gaps: vec![],
                    effort: None,
                }],
            },
        )
        .unwrap();
        assert!(out.partial);
        assert_eq!(out.targets.len(), 1);
    }
}
