use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Identity normalization ---

/// Normalize a keyword phrase for identity comparison: lowercase, trim,
/// collapse interior whitespace. "Email Marketing " and "email  marketing"
/// resolve to the same key.
pub fn normalize_keyword(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonicalize a URL for page identity: lowercase scheme/host, strip the
/// fragment, strip the slash on a bare root path. Returns `None` for
/// unparseable or non-http(s) input.
pub fn canonical_url(url: &str) -> Option<String> {
    let mut parsed = url::Url::parse(url.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.set_fragment(None);
    let mut out = parsed.to_string();
    if out.ends_with('/') && parsed.path() == "/" {
        out.pop();
    }
    Some(out)
}

/// Identity of a keyword entity: normalized text + lowercase locale.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct KeywordKey {
    pub text: String,
    pub locale: String,
}

impl KeywordKey {
    pub fn new(text: &str, locale: &str) -> Self {
        Self {
            text: normalize_keyword(text),
            locale: locale.trim().to_lowercase(),
        }
    }

    /// An empty normalized text is not a valid identity.
    pub fn is_valid(&self) -> bool {
        !self.text.is_empty()
    }

    /// Unique identity string: `locale:text`.
    pub fn canonical_key(&self) -> String {
        format!("{}:{}", self.locale, self.text)
    }
}

impl std::fmt::Display for KeywordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.text, self.locale)
    }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    Informational,
    Commercial,
    Transactional,
    Navigational,
    Unknown,
}

impl std::fmt::Display for SearchIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchIntent::Informational => write!(f, "informational"),
            SearchIntent::Commercial => write!(f, "commercial"),
            SearchIntent::Transactional => write!(f, "transactional"),
            SearchIntent::Navigational => write!(f, "navigational"),
            SearchIntent::Unknown => write!(f, "unknown"),
        }
    }
}

impl SearchIntent {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "informational" | "info" => Self::Informational,
            "commercial" => Self::Commercial,
            "transactional" | "buy" => Self::Transactional,
            "navigational" | "nav" => Self::Navigational,
            _ => Self::Unknown,
        }
    }
}

/// Whether all required inputs were present when a value was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Full,
    Partial,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Full => write!(f, "full"),
            Confidence::Partial => write!(f, "partial"),
        }
    }
}

/// Score bucket. Variant order is priority order; derived `Ord` sorts
/// Critical first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityBucket {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for PriorityBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityBucket::Critical => write!(f, "critical"),
            PriorityBucket::High => write!(f, "high"),
            PriorityBucket::Medium => write!(f, "medium"),
            PriorityBucket::Low => write!(f, "low"),
        }
    }
}

/// Recommendation tier. Variant order is priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Critical,
    High,
    Strategic,
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::Critical => write!(f, "critical"),
            PriorityTier::High => write!(f, "high"),
            PriorityTier::Strategic => write!(f, "strategic"),
        }
    }
}

/// The target page's standing for a keyword. "Not ranking" is knowledge,
/// not absence of it — an unknown ranking is `None` at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RankingState {
    Position(u32),
    NotRanking,
}

// --- Keyword signal ---

/// One provider observation about a keyword. Absent fields are explicit
/// `None` — a missing competition score must never read as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordSignal {
    pub key: KeywordKey,
    /// Estimated monthly search volume.
    pub volume: Option<u64>,
    /// Competition score, 0.0 (none) to 1.0 (saturated).
    pub competition: Option<f64>,
    pub cpc_usd: Option<f64>,
    pub intent: Option<SearchIntent>,
    /// Provider-flagged synonyms/variants. Scoring input, never an identity merge.
    pub related_terms: Vec<String>,
    pub provider: String,
    pub collected_at: DateTime<Utc>,
}

// --- SERP signal ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SerpFeature {
    FeaturedSnippet,
    PeopleAlsoAsk,
    ImagePack,
    VideoPack,
    LocalPack,
    ShoppingResults,
    KnowledgeGraph,
    TopStories,
}

impl std::fmt::Display for SerpFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerpFeature::FeaturedSnippet => write!(f, "featured_snippet"),
            SerpFeature::PeopleAlsoAsk => write!(f, "people_also_ask"),
            SerpFeature::ImagePack => write!(f, "image_pack"),
            SerpFeature::VideoPack => write!(f, "video_pack"),
            SerpFeature::LocalPack => write!(f, "local_pack"),
            SerpFeature::ShoppingResults => write!(f, "shopping_results"),
            SerpFeature::KnowledgeGraph => write!(f, "knowledge_graph"),
            SerpFeature::TopStories => write!(f, "top_stories"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SerpEntry {
    pub position: u32,
    pub url: String,
    pub title: String,
    pub snippet: Option<String>,
    /// Estimated content length of the ranking page, when the provider reports it.
    pub word_count: Option<u32>,
    pub topics: Vec<String>,
}

/// The ranked result set for one keyword at one point in time. Snapshots
/// are never merged — position changes over time, so each collection call
/// produces its own record and only the latest feeds live scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SerpSnapshot {
    pub id: Uuid,
    pub key: KeywordKey,
    pub captured_at: DateTime<Utc>,
    pub provider: String,
    pub entries: Vec<SerpEntry>,
    pub features: BTreeSet<SerpFeature>,
    /// Owner of the featured snippet, when present.
    pub featured_snippet_url: Option<String>,
    pub paa_questions: Vec<String>,
    pub related_queries: Vec<String>,
    pub total_results: Option<u64>,
}

impl SerpSnapshot {
    /// Position of a URL in this snapshot, by canonical comparison.
    pub fn position_of(&self, url: &str) -> Option<u32> {
        let target = canonical_url(url)?;
        self.entries
            .iter()
            .find(|e| canonical_url(&e.url).as_deref() == Some(target.as_str()))
            .map(|e| e.position)
    }

    /// Ranking state of a URL: in the snapshot → `Position`, absent from a
    /// non-empty snapshot → `NotRanking` (we looked, it isn't there).
    pub fn ranking_of(&self, url: &str) -> RankingState {
        match self.position_of(url) {
            Some(pos) => RankingState::Position(pos),
            None => RankingState::NotRanking,
        }
    }
}

// --- Page audit signal ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeadingEntry {
    /// Heading level, 1–6.
    pub level: u8,
    pub text: String,
}

/// Core-Web-Vitals-style performance figures. Each metric is independently
/// nullable — providers report different subsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebVitals {
    pub lcp_ms: Option<f64>,
    pub cls: Option<f64>,
    pub inp_ms: Option<f64>,
    /// Aggregate performance score, 0–100.
    pub performance_score: Option<f64>,
}

/// Technical/content facts about one URL from a single audit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PageAuditSignal {
    /// Canonical URL (see [`canonical_url`]).
    pub url: String,
    pub word_count: Option<u32>,
    /// Ordered heading outline.
    pub headings: Vec<HeadingEntry>,
    /// Detected schema.org types (JSON-LD and microdata).
    pub schema_types: BTreeSet<String>,
    pub desktop_vitals: Option<WebVitals>,
    pub mobile_vitals: Option<WebVitals>,
    pub structured_data_valid: Option<bool>,
    /// Topic/entity tags extracted from content.
    pub topics: BTreeSet<String>,
    pub provider: String,
    pub collected_at: DateTime<Utc>,
}

impl PageAuditSignal {
    /// Whether the heading outline contains an FAQ section.
    pub fn has_faq_section(&self) -> bool {
        self.headings.iter().any(|h| {
            let t = h.text.to_lowercase();
            t.contains("faq") || t.contains("frequently asked")
        })
    }
}

// --- Sum type ---

/// A canonical signal produced by the normalizer and consumed by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "signal_type", rename_all = "snake_case")]
pub enum Signal {
    Keyword(KeywordSignal),
    Serp(SerpSnapshot),
    PageAudit(PageAuditSignal),
}

impl Signal {
    pub fn provider(&self) -> &str {
        match self {
            Signal::Keyword(s) => &s.provider,
            Signal::Serp(s) => &s.provider,
            Signal::PageAudit(s) => &s.provider,
        }
    }

    /// Identity the resolver merges on: keyword canonical key or page URL.
    pub fn identity(&self) -> String {
        match self {
            Signal::Keyword(s) => s.key.canonical_key(),
            Signal::Serp(s) => s.key.canonical_key(),
            Signal::PageAudit(s) => s.url.clone(),
        }
    }
}

// --- Scoring output ---

/// One named term of the multiplicative score, kept for explainability:
/// `input` is the value the factor saw, `contribution` the multiplier it
/// contributed to the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreFactor {
    pub name: String,
    pub input: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OpportunityScore {
    pub key: KeywordKey,
    /// Page the score was computed against. `None` = scored as "not ranking".
    pub target_url: Option<String>,
    pub score: f64,
    /// Ordered factor breakdown; the product of contributions equals `score`.
    pub factors: Vec<ScoreFactor>,
    pub bucket: PriorityBucket,
    pub confidence: Confidence,
    /// Raw volume, carried for tie-breaking and display.
    pub volume: Option<u64>,
}

// --- Content gap ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    Topic,
    SerpFeature,
    Structural,
}

impl std::fmt::Display for GapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapKind::Topic => write!(f, "topic"),
            GapKind::SerpFeature => write!(f, "serp_feature"),
            GapKind::Structural => write!(f, "structural"),
        }
    }
}

/// Something the competitor corpus has that the target page lacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContentGap {
    pub kind: GapKind,
    /// Stable item key, e.g. a topic tag, `schema:FAQPage`, `faq_section`.
    pub item: String,
    /// Fraction of competitors exhibiting the item (0.0–1.0).
    pub coverage: f64,
    /// Impact weight from configuration.
    pub impact: f64,
}

impl ContentGap {
    pub fn rank_value(&self) -> f64 {
        self.coverage * self.impact
    }
}

// --- Priority target ---

/// One entry of the final ranked recommendation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriorityTarget {
    pub key: KeywordKey,
    pub target_url: Option<String>,
    pub tier: PriorityTier,
    pub score: OpportunityScore,
    pub gaps: Vec<ContentGap>,
    /// Estimated implementation effort; lower sorts earlier within a tier.
    pub effort: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn keyword_normalization_collapses_case_and_whitespace() {
        assert_eq!(normalize_keyword("Email Marketing "), "email marketing");
        assert_eq!(normalize_keyword("  email\t marketing"), "email marketing");
        assert_eq!(
            KeywordKey::new("Email Marketing ", "US"),
            KeywordKey::new("email marketing", "us")
        );
    }

    #[test]
    fn empty_keyword_is_invalid() {
        assert!(!KeywordKey::new("   ", "us").is_valid());
        assert!(KeywordKey::new("seo", "us").is_valid());
    }

    #[test]
    fn canonical_url_strips_fragment_and_root_slash() {
        assert_eq!(
            canonical_url("https://Example.com/#top").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            canonical_url("https://example.com/blog/post").as_deref(),
            Some("https://example.com/blog/post")
        );
        assert_eq!(canonical_url("ftp://example.com"), None);
        assert_eq!(canonical_url("not a url"), None);
    }

    fn snapshot_with(urls: &[&str]) -> SerpSnapshot {
        SerpSnapshot {
            id: Uuid::new_v4(),
            key: KeywordKey::new("test", "us"),
            captured_at: Utc::now(),
            provider: "serp".to_string(),
            entries: urls
                .iter()
                .enumerate()
                .map(|(i, u)| SerpEntry {
                    position: (i + 1) as u32,
                    url: u.to_string(),
                    title: String::new(),
                    snippet: None,
                    word_count: None,
                    topics: vec![],
                })
                .collect(),
            features: BTreeSet::new(),
            featured_snippet_url: None,
            paa_questions: vec![],
            related_queries: vec![],
            total_results: None,
        }
    }

    #[test]
    fn position_of_compares_canonically() {
        let snap = snapshot_with(&["https://a.com/page", "https://B.com/"]);
        assert_eq!(snap.position_of("https://a.com/page#section"), Some(1));
        assert_eq!(snap.position_of("https://b.com"), Some(2));
        assert_eq!(
            snap.ranking_of("https://c.com/other"),
            RankingState::NotRanking
        );
    }

    #[test]
    fn faq_section_detected_from_headings() {
        let audit = PageAuditSignal {
            url: "https://example.com".to_string(),
            word_count: Some(900),
            headings: vec![
                HeadingEntry {
                    level: 1,
                    text: "Guide".to_string(),
                },
                HeadingEntry {
                    level: 2,
                    text: "Frequently Asked Questions".to_string(),
                },
            ],
            schema_types: BTreeSet::new(),
            desktop_vitals: None,
            mobile_vitals: None,
            structured_data_valid: None,
            topics: BTreeSet::new(),
            provider: "audit".to_string(),
            collected_at: Utc::now(),
        };
        assert!(audit.has_faq_section());
    }
}
