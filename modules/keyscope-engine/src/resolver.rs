//! Entity Resolver / Deduplicator.
//!
//! Merges canonical signals arriving out of order (and possibly duplicated
//! across repeated discovery calls) into one entity per identity key.
//! Merge rule per field: fill-never-erase — a `None` never overwrites a
//! known value; between two known values the more recently observed one
//! wins and the displaced value stays in the entity's signal history.
//! Strictly-newer-wins makes the merge independent of arrival order, and
//! identical replayed signals are dropped before they touch history, so
//! re-applying a signal is a no-op.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use keyscope_common::{
    canonical_url, normalize_keyword, HeadingEntry, KeywordKey, KeywordSignal, KeyscopeError,
    PageAuditSignal, Result, SearchIntent, SerpSnapshot, Signal, WebVitals,
};

/// A merged field value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observed<T> {
    pub value: T,
    pub observed_at: DateTime<Utc>,
    pub provider: String,
}

/// Fill-never-erase merge of one field slot. `None` incoming leaves the
/// slot alone; a strictly newer observation replaces it; an older or
/// equal-timestamp observation keeps the incumbent.
fn merge_field<T: Clone>(
    slot: &mut Option<Observed<T>>,
    incoming: Option<T>,
    observed_at: DateTime<Utc>,
    provider: &str,
) {
    let Some(value) = incoming else {
        return;
    };
    let replace = match slot {
        None => true,
        Some(current) => observed_at > current.observed_at,
    };
    if replace {
        *slot = Some(Observed {
            value,
            observed_at,
            provider: provider.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Keyword entity
// ---------------------------------------------------------------------------

/// The deduplicated, merged record for one keyword across all signals
/// collected about it. History holds every contributing signal, so
/// displaced values remain auditable.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordEntity {
    pub key: KeywordKey,
    pub volume: Option<Observed<u64>>,
    pub competition: Option<Observed<f64>>,
    pub cpc_usd: Option<Observed<f64>>,
    pub intent: Option<Observed<SearchIntent>>,
    /// Provider-flagged synonyms/variants — scoring input, never merged in.
    pub related_terms: BTreeSet<String>,
    pub history: Vec<KeywordSignal>,
}

impl KeywordEntity {
    fn new(key: KeywordKey) -> Self {
        Self {
            key,
            volume: None,
            competition: None,
            cpc_usd: None,
            intent: None,
            related_terms: BTreeSet::new(),
            history: Vec::new(),
        }
    }

    fn apply(&mut self, signal: KeywordSignal) {
        if self.history.contains(&signal) {
            debug!(key = %self.key, "Identical keyword signal replayed, dropping");
            return;
        }
        merge_field(
            &mut self.volume,
            signal.volume,
            signal.collected_at,
            &signal.provider,
        );
        merge_field(
            &mut self.competition,
            signal.competition,
            signal.collected_at,
            &signal.provider,
        );
        merge_field(
            &mut self.cpc_usd,
            signal.cpc_usd,
            signal.collected_at,
            &signal.provider,
        );
        merge_field(
            &mut self.intent,
            signal.intent,
            signal.collected_at,
            &signal.provider,
        );
        for term in &signal.related_terms {
            let normalized = normalize_keyword(term);
            if !normalized.is_empty() && normalized != self.key.text {
                self.related_terms.insert(normalized);
            }
        }
        self.history.push(signal);
    }
}

// ---------------------------------------------------------------------------
// Page entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PageEntity {
    /// Canonical URL (identity).
    pub url: String,
    pub word_count: Option<Observed<u32>>,
    pub headings: Option<Observed<Vec<HeadingEntry>>>,
    pub schema_types: Option<Observed<BTreeSet<String>>>,
    pub desktop_vitals: Option<Observed<WebVitals>>,
    pub mobile_vitals: Option<Observed<WebVitals>>,
    pub structured_data_valid: Option<Observed<bool>>,
    pub topics: Option<Observed<BTreeSet<String>>>,
    pub history: Vec<PageAuditSignal>,
}

impl PageEntity {
    fn new(url: String) -> Self {
        Self {
            url,
            word_count: None,
            headings: None,
            schema_types: None,
            desktop_vitals: None,
            mobile_vitals: None,
            structured_data_valid: None,
            topics: None,
            history: Vec::new(),
        }
    }

    fn apply(&mut self, signal: PageAuditSignal) {
        if self.history.contains(&signal) {
            debug!(url = %self.url, "Identical audit signal replayed, dropping");
            return;
        }
        let at = signal.collected_at;
        let provider = signal.provider.clone();
        merge_field(&mut self.word_count, signal.word_count, at, &provider);
        merge_field(
            &mut self.headings,
            (!signal.headings.is_empty()).then(|| signal.headings.clone()),
            at,
            &provider,
        );
        merge_field(
            &mut self.schema_types,
            (!signal.schema_types.is_empty()).then(|| signal.schema_types.clone()),
            at,
            &provider,
        );
        merge_field(
            &mut self.desktop_vitals,
            signal.desktop_vitals.clone(),
            at,
            &provider,
        );
        merge_field(
            &mut self.mobile_vitals,
            signal.mobile_vitals.clone(),
            at,
            &provider,
        );
        merge_field(
            &mut self.structured_data_valid,
            signal.structured_data_valid,
            at,
            &provider,
        );
        merge_field(
            &mut self.topics,
            (!signal.topics.is_empty()).then(|| signal.topics.clone()),
            at,
            &provider,
        );
        self.history.push(signal);
    }

    /// Materialize the merged view as a single audit record for the gap
    /// synthesizer and the tool surface.
    pub fn merged_audit(&self) -> PageAuditSignal {
        let latest = self
            .history
            .iter()
            .map(|s| s.collected_at)
            .max()
            .unwrap_or_else(Utc::now);
        PageAuditSignal {
            url: self.url.clone(),
            word_count: self.word_count.as_ref().map(|o| o.value),
            headings: self
                .headings
                .as_ref()
                .map(|o| o.value.clone())
                .unwrap_or_default(),
            schema_types: self
                .schema_types
                .as_ref()
                .map(|o| o.value.clone())
                .unwrap_or_default(),
            desktop_vitals: self.desktop_vitals.as_ref().map(|o| o.value.clone()),
            mobile_vitals: self.mobile_vitals.as_ref().map(|o| o.value.clone()),
            structured_data_valid: self.structured_data_valid.as_ref().map(|o| o.value),
            topics: self
                .topics
                .as_ref()
                .map(|o| o.value.clone())
                .unwrap_or_default(),
            provider: "merged".to_string(),
            collected_at: latest,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity store
// ---------------------------------------------------------------------------

/// In-memory entity store for one analysis run. Exclusively owned and
/// mutated by the resolver during gather; scorer and gap synthesizer only
/// read it afterwards. Discarded at the end of the run — the engine holds
/// no cross-run state.
#[derive(Debug, Default)]
pub struct EntityStore {
    keywords: HashMap<KeywordKey, KeywordEntity>,
    pages: HashMap<String, PageEntity>,
    serps: HashMap<KeywordKey, Vec<SerpSnapshot>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one canonical signal. Look up or create the entity by identity
    /// key, merge per the fill-never-erase rule, append to history.
    pub fn apply(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::Keyword(s) => {
                if !s.key.is_valid() {
                    return Err(KeyscopeError::InvalidEntity(
                        "keyword signal with empty text".to_string(),
                    ));
                }
                self.keywords
                    .entry(s.key.clone())
                    .or_insert_with(|| KeywordEntity::new(s.key.clone()))
                    .apply(s);
            }
            Signal::Serp(snap) => {
                if !snap.key.is_valid() {
                    return Err(KeyscopeError::InvalidEntity(
                        "serp snapshot with empty keyword".to_string(),
                    ));
                }
                // A snapshot is a signal about its keyword: make sure the
                // merge-target entity exists even before metrics arrive.
                self.keywords
                    .entry(snap.key.clone())
                    .or_insert_with(|| KeywordEntity::new(snap.key.clone()));
                let snapshots = self.serps.entry(snap.key.clone()).or_default();
                // Snapshots are kept distinct, never merged; only an exact
                // replay (same provider + capture time) is dropped.
                if snapshots
                    .iter()
                    .any(|s| s.provider == snap.provider && s.captured_at == snap.captured_at)
                {
                    debug!(key = %snap.key, "Identical serp snapshot replayed, dropping");
                } else {
                    snapshots.push(snap);
                    snapshots.sort_by_key(|s| s.captured_at);
                }
            }
            Signal::PageAudit(s) => {
                let url = canonical_url(&s.url).ok_or_else(|| {
                    KeyscopeError::InvalidEntity(format!("unparseable page url: {}", s.url))
                })?;
                self.pages
                    .entry(url.clone())
                    .or_insert_with(|| PageEntity::new(url))
                    .apply(s);
            }
        }
        Ok(())
    }

    pub fn keyword(&self, key: &KeywordKey) -> Option<&KeywordEntity> {
        self.keywords.get(key)
    }

    /// All keyword entities, sorted by key for deterministic iteration.
    pub fn keyword_entities(&self) -> Vec<&KeywordEntity> {
        let mut entities: Vec<_> = self.keywords.values().collect();
        entities.sort_by(|a, b| a.key.cmp(&b.key));
        entities
    }

    pub fn page(&self, url: &str) -> Option<&PageEntity> {
        let canonical = canonical_url(url)?;
        self.pages.get(&canonical)
    }

    pub fn page_entities(&self) -> Vec<&PageEntity> {
        let mut entities: Vec<_> = self.pages.values().collect();
        entities.sort_by(|a, b| a.url.cmp(&b.url));
        entities
    }

    pub fn snapshots(&self, key: &KeywordKey) -> &[SerpSnapshot] {
        self.serps.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The snapshot used for live scoring — the most recent one.
    pub fn latest_snapshot(&self, key: &KeywordKey) -> Option<&SerpSnapshot> {
        self.serps.get(key).and_then(|v| v.last())
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
