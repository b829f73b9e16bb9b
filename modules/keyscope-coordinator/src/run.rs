//! The end-to-end analysis run: gather signals from the providers under
//! the coordinator's limits, resolve them into the entity store, then run
//! the pure pipeline (score → gap → rank). Per-provider failures degrade
//! the affected entities to partial confidence; a completed run always
//! returns a result set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use keyscope_common::{
    canonical_url, normalize_keyword, Confidence, EngineConfig, KeywordKey, KeywordSignal,
    KeyscopeError, PriorityTarget, Result, Signal,
};
use keyscope_engine::gap::GapSynthesizer;
use keyscope_engine::normalize::{normalize, RawResponse};
use keyscope_engine::rank::{RankCandidate, Ranker};
use keyscope_engine::resolver::EntityStore;
use keyscope_engine::score::Scorer;

use crate::coordinator::FanOutCoordinator;
use crate::providers::ProviderCallError;

/// How many per-keyword/per-url calls run concurrently at the run level.
/// Provider limiters cap actual provider concurrency below this.
const FANOUT_WIDTH: usize = 8;

#[derive(Debug, Clone, TypedBuilder)]
pub struct AnalysisRequest {
    pub seed_keywords: Vec<String>,
    #[builder(default = "us".to_string())]
    pub locale: String,
    /// Page the analysis optimizes for; `None` analyses pure keyword
    /// opportunity with no gap diff.
    #[builder(default)]
    pub target_url: Option<String>,
    /// Also expand each seed through related-keyword discovery.
    #[builder(default)]
    pub discover_related: bool,
    /// How many top-ranking competitor pages to audit per run.
    #[builder(default = 5)]
    pub competitor_limit: usize,
    /// Business-relevance multipliers keyed by keyword text.
    #[builder(default)]
    pub strategic_weights: BTreeMap<String, f64>,
    /// Effort estimates keyed by keyword text.
    #[builder(default)]
    pub effort_hints: BTreeMap<String, f64>,
}

/// An entity that lost signal to a provider failure, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DegradedEntity {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunStats {
    pub signals_applied: u32,
    pub keywords: u32,
    pub pages: u32,
    pub provider_failures: u32,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub targets: Vec<PriorityTarget>,
    /// True when any entity was scored from incomplete data.
    pub partial: bool,
    pub degraded: Vec<DegradedEntity>,
    pub stats: RunStats,
}

pub struct AnalysisRun {
    coordinator: Arc<FanOutCoordinator>,
    config: EngineConfig,
}

impl AnalysisRun {
    pub fn new(coordinator: Arc<FanOutCoordinator>, config: EngineConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub async fn execute(&self, request: AnalysisRequest) -> Result<AnalysisReport> {
        let run_id = Uuid::new_v4();

        let seeds: Vec<String> = request
            .seed_keywords
            .iter()
            .map(|s| normalize_keyword(s))
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if seeds.is_empty() {
            return Err(KeyscopeError::InvalidEntity(
                "analysis request without any valid seed keyword".to_string(),
            ));
        }
        let target_url = match request.target_url.as_deref() {
            Some(raw) => Some(canonical_url(raw).ok_or_else(|| {
                KeyscopeError::InvalidEntity(format!("unparseable target url: {raw}"))
            })?),
            None => None,
        };

        info!(%run_id, seeds = seeds.len(), target = ?target_url, "Analysis run starting");

        let mut store = EntityStore::new();
        let mut degraded: Vec<DegradedEntity> = Vec::new();
        let mut signals_applied = 0u32;
        let mut provider_failures = 0u32;

        // Seed entities up front: a run degraded to zero provider data still
        // reports every requested keyword, at partial confidence.
        let requested_at = chrono::Utc::now();
        for seed in &seeds {
            let signal = Signal::Keyword(KeywordSignal {
                key: KeywordKey::new(seed, &request.locale),
                volume: None,
                competition: None,
                cpc_usd: None,
                intent: None,
                related_terms: vec![],
                provider: "request".to_string(),
                collected_at: requested_at,
            });
            store.apply(signal)?;
        }

        // Phase 1: keyword metrics, one batched call for all seeds.
        match self.coordinator.keyword_metrics(&seeds, &request.locale).await {
            Ok(raw) => {
                signals_applied += apply_raw(&mut store, &mut degraded, &raw);
            }
            Err(e) => {
                provider_failures += 1;
                record_failure(&mut degraded, seeds.iter(), &e);
            }
        }

        // Phase 1b: optional related-keyword discovery, fanned out per seed.
        if request.discover_related && !self.coordinator.cancel_flag().is_cancelled() {
            let results: Vec<(String, std::result::Result<RawResponse, ProviderCallError>)> =
                stream::iter(seeds.iter().cloned().map(|seed| {
                    let coordinator = self.coordinator.clone();
                    let locale = request.locale.clone();
                    async move {
                        let result = coordinator.related_keywords(&seed, &locale).await;
                        (seed, result)
                    }
                }))
                .buffer_unordered(FANOUT_WIDTH)
                .collect()
                .await;
            for (seed, result) in results {
                match result {
                    Ok(raw) => signals_applied += apply_raw(&mut store, &mut degraded, &raw),
                    Err(e) => {
                        provider_failures += 1;
                        record_failure(&mut degraded, std::iter::once(&seed), &e);
                    }
                }
            }
        }

        // Phase 2: one SERP snapshot per seed keyword.
        let serp_results: Vec<(String, std::result::Result<RawResponse, ProviderCallError>)> =
            stream::iter(seeds.iter().cloned().map(|seed| {
                let coordinator = self.coordinator.clone();
                let locale = request.locale.clone();
                async move {
                    let result = coordinator.serp_collect(&seed, &locale).await;
                    (seed, result)
                }
            }))
            .buffer_unordered(FANOUT_WIDTH)
            .collect()
            .await;
        for (seed, result) in serp_results {
            match result {
                Ok(raw) => signals_applied += apply_raw(&mut store, &mut degraded, &raw),
                Err(e) => {
                    provider_failures += 1;
                    record_failure(&mut degraded, std::iter::once(&seed), &e);
                }
            }
        }

        // Phase 3: audit the target page plus top-ranking competitors.
        let mut audit_urls: Vec<String> = Vec::new();
        if let Some(url) = &target_url {
            audit_urls.push(url.clone());
        }
        let mut competitor_urls = BTreeSet::new();
        for seed in &seeds {
            let key = KeywordKey::new(seed, &request.locale);
            if let Some(snapshot) = store.latest_snapshot(&key) {
                for entry in snapshot.entries.iter().take(request.competitor_limit) {
                    if let Some(canonical) = canonical_url(&entry.url) {
                        if Some(&canonical) != target_url.as_ref() {
                            competitor_urls.insert(canonical);
                        }
                    }
                }
            }
        }
        audit_urls.extend(competitor_urls.iter().cloned());

        let audit_results: Vec<(String, std::result::Result<RawResponse, ProviderCallError>)> =
            stream::iter(audit_urls.iter().cloned().map(|url| {
                let coordinator = self.coordinator.clone();
                let locale = request.locale.clone();
                async move {
                    let result = coordinator.page_audit(&url, &locale).await;
                    (url, result)
                }
            }))
            .buffer_unordered(FANOUT_WIDTH)
            .collect()
            .await;
        for (url, result) in audit_results {
            match result {
                Ok(raw) => signals_applied += apply_raw(&mut store, &mut degraded, &raw),
                Err(e) => {
                    provider_failures += 1;
                    record_failure(&mut degraded, std::iter::once(&url), &e);
                }
            }
        }

        // Pure pipeline: score every keyword entity, diff the target page
        // against audited competitors, rank.
        let scorer = Scorer::new(self.config.scoring.clone());
        let synthesizer = GapSynthesizer::new(self.config.gap.clone());
        let ranker = Ranker::new(self.config.ranker.clone());

        let strategic = keyscope_engine::ops::normalize_map_keys(&request.strategic_weights);
        let efforts = keyscope_engine::ops::normalize_map_keys(&request.effort_hints);

        let target_audit = target_url
            .as_deref()
            .and_then(|url| store.page(url))
            .map(|p| p.merged_audit());
        let competitor_audits: Vec<_> = store
            .page_entities()
            .iter()
            .filter(|p| Some(&p.url) != target_url.as_ref())
            .map(|p| p.merged_audit())
            .collect();

        let mut candidates = Vec::new();
        for entity in store.keyword_entities() {
            let snapshot = store.latest_snapshot(&entity.key);
            let score = scorer.score(
                entity,
                snapshot,
                target_url.as_deref(),
                None,
                strategic.get(&entity.key.text).copied(),
            )?;
            let gaps = match &target_audit {
                Some(target) if !competitor_audits.is_empty() => {
                    synthesizer.compute(target, &competitor_audits, snapshot)
                }
                _ => Vec::new(),
            };
            candidates.push(RankCandidate {
                effort: efforts.get(&score.key.text).copied(),
                score,
                gaps,
            });
        }

        let cancelled = self.coordinator.cancel_flag().is_cancelled();
        let partial = cancelled
            || !degraded.is_empty()
            || candidates
                .iter()
                .any(|c| c.score.confidence == Confidence::Partial);
        let stats = RunStats {
            signals_applied,
            keywords: store.keyword_count() as u32,
            pages: store.page_count() as u32,
            provider_failures,
            cancelled,
        };
        let targets = ranker.rank(candidates);

        info!(
            %run_id,
            targets = targets.len(),
            partial,
            failures = provider_failures,
            cancelled,
            "Analysis run complete"
        );

        Ok(AnalysisReport {
            run_id,
            targets,
            partial,
            degraded,
            stats,
        })
    }
}

/// Normalize one raw response and fold its signals into the store.
/// Malformed payloads and invalid signals degrade, they never abort.
fn apply_raw(store: &mut EntityStore, degraded: &mut Vec<DegradedEntity>, raw: &RawResponse) -> u32 {
    let outcome = match normalize(raw) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(provider = %raw.provider, call = %raw.call, error = %e, "Dropping response");
            degraded.push(DegradedEntity {
                key: format!("{}:{}", raw.provider, raw.call),
                reason: e.to_string(),
            });
            return 0;
        }
    };
    if let keyscope_engine::normalize::NormalizeOutcome::Partial { missing, .. } = &outcome {
        for item in missing {
            degraded.push(DegradedEntity {
                key: format!("{}:{}", raw.provider, raw.call),
                reason: item.clone(),
            });
        }
    }

    let mut applied = 0;
    for signal in outcome.signals() {
        let identity = signal.identity();
        match store.apply(signal) {
            Ok(()) => applied += 1,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Dropping unresolvable signal");
                degraded.push(DegradedEntity {
                    key: identity,
                    reason: e.to_string(),
                });
            }
        }
    }
    applied
}

fn record_failure<'a>(
    degraded: &mut Vec<DegradedEntity>,
    keys: impl Iterator<Item = &'a String>,
    error: &ProviderCallError,
) {
    for key in keys {
        degraded.push(DegradedEntity {
            key: key.clone(),
            reason: error.to_string(),
        });
    }
}
