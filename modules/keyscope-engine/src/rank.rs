//! Recommendation Ranker: merges opportunity scores and content gaps into
//! one ordered priority-target sequence. Score bucket is the primary key
//! (critical/high buckets keep their tier, medium/low fold into the
//! strategic tier); within a bucket higher score first, effort breaks
//! ties favoring cheaper work, and the keyword key keeps ordering total.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use keyscope_common::{
    ContentGap, OpportunityScore, PriorityBucket, PriorityTarget, PriorityTier, RankerConfig,
};

use crate::score;

/// One candidate for ranking: a scored keyword plus the content gaps of
/// its target page and an optional effort estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankCandidate {
    pub score: OpportunityScore,
    #[serde(default)]
    pub gaps: Vec<ContentGap>,
    /// Caller-estimated implementation effort; defaults from config.
    #[serde(default)]
    pub effort: Option<f64>,
}

pub struct Ranker {
    cfg: RankerConfig,
}

impl Ranker {
    pub fn new(cfg: RankerConfig) -> Self {
        Self { cfg }
    }

    pub fn rank(&self, candidates: Vec<RankCandidate>) -> Vec<PriorityTarget> {
        let mut targets: Vec<PriorityTarget> = candidates
            .into_iter()
            .map(|c| {
                let effort = c.effort.unwrap_or(self.cfg.default_effort);
                PriorityTarget {
                    key: c.score.key.clone(),
                    target_url: c.score.target_url.clone(),
                    tier: tier_for(c.score.bucket),
                    score: c.score,
                    gaps: c.gaps,
                    effort,
                }
            })
            .collect();

        targets.sort_by(|a, b| {
            a.score
                .bucket
                .cmp(&b.score.bucket)
                .then_with(|| {
                    b.score
                        .score
                        .partial_cmp(&a.score.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    a.effort
                        .partial_cmp(&b.effort)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| score::compare(&a.score, &b.score))
        });
        debug!(targets = targets.len(), "Ranked priority targets");
        targets
    }
}

fn tier_for(bucket: PriorityBucket) -> PriorityTier {
    match bucket {
        PriorityBucket::Critical => PriorityTier::Critical,
        PriorityBucket::High => PriorityTier::High,
        PriorityBucket::Medium | PriorityBucket::Low => PriorityTier::Strategic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscope_common::{Confidence, KeywordKey};

    fn candidate(text: &str, score: f64, bucket: PriorityBucket, effort: Option<f64>) -> RankCandidate {
        RankCandidate {
            score: OpportunityScore {
                key: KeywordKey::new(text, "us"),
                target_url: None,
                score,
                factors: vec![],
                bucket,
                confidence: Confidence::Full,
                volume: Some(100),
            },
            gaps: vec![],
            effort,
        }
    }

    #[test]
    fn bucket_outranks_raw_score_and_effort() {
        let ranked = Ranker::new(RankerConfig::default()).rank(vec![
            candidate("cheap high", 5.0, PriorityBucket::High, Some(0.1)),
            candidate("critical", 9.0, PriorityBucket::Critical, Some(5.0)),
        ]);
        assert_eq!(ranked[0].key.text, "critical");
        assert_eq!(ranked[0].tier, PriorityTier::Critical);
    }

    #[test]
    fn equal_scores_prefer_lower_effort() {
        let ranked = Ranker::new(RankerConfig::default()).rank(vec![
            candidate("expensive", 5.0, PriorityBucket::High, Some(3.0)),
            candidate("cheap", 5.0, PriorityBucket::High, Some(1.0)),
        ]);
        assert_eq!(ranked[0].key.text, "cheap");
    }

    #[test]
    fn medium_and_low_fold_into_strategic_tier() {
        let ranked = Ranker::new(RankerConfig::default()).rank(vec![
            candidate("medium", 2.5, PriorityBucket::Medium, None),
            candidate("low", 0.5, PriorityBucket::Low, None),
        ]);
        assert!(ranked.iter().all(|t| t.tier == PriorityTier::Strategic));
        assert_eq!(ranked[0].key.text, "medium");
    }

    #[test]
    fn missing_effort_uses_configured_default() {
        let ranked = Ranker::new(RankerConfig { default_effort: 2.0 }).rank(vec![candidate(
            "kw",
            5.0,
            PriorityBucket::High,
            None,
        )]);
        assert_eq!(ranked[0].effort, 2.0);
    }
}
