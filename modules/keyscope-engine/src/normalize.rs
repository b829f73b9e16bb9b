//! Signal Normalizer: raw provider payloads → canonical signals.
//!
//! Pure transform, no I/O and no clock — timestamps come from the payload
//! or from the request context. Each call kind has an explicit, versioned
//! parse function over `serde_json::Value` with exhaustive field-presence
//! checks. Absent optional fields become `None`, never defaults: a null
//! competition score treated as 0 would bias every downstream score.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use keyscope_common::{
    canonical_url, HeadingEntry, KeywordKey, KeywordSignal, KeyscopeError, PageAuditSignal, Result,
    SearchIntent, SerpEntry, SerpFeature, SerpSnapshot, Signal, WebVitals,
};

/// Schema version of the keyword-metrics / related-keywords row shape.
pub const KEYWORD_SCHEMA_VERSION: u32 = 1;
/// Schema version of the SERP-collect payload shape.
pub const SERP_SCHEMA_VERSION: u32 = 1;
/// Schema version of the page-audit payload shape.
pub const PAGE_AUDIT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    KeywordMetrics,
    RelatedKeywords,
    SerpCollect,
    PageAudit,
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallKind::KeywordMetrics => write!(f, "keyword_metrics"),
            CallKind::RelatedKeywords => write!(f, "related_keywords"),
            CallKind::SerpCollect => write!(f, "serp_collect"),
            CallKind::PageAudit => write!(f, "page_audit"),
        }
    }
}

/// What the provider call was for — the keyword or URL the caller asked
/// about, the locale, and when the request was issued (fallback timestamp
/// for providers that omit one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestContext {
    pub keyword: Option<String>,
    pub url: Option<String>,
    pub locale: String,
    pub requested_at: DateTime<Utc>,
}

/// One raw provider response, tagged by provider and call kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawResponse {
    pub provider: String,
    pub call: CallKind,
    pub context: RequestContext,
    pub payload: Value,
}

/// Tagged parse result. `Partial` carries what could be normalized plus a
/// note per dropped or substituted item; a payload matching no expected
/// shape is a `MalformedResponse` error instead.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome {
    Complete(Vec<Signal>),
    Partial {
        signals: Vec<Signal>,
        missing: Vec<String>,
    },
}

impl NormalizeOutcome {
    pub fn signals(self) -> Vec<Signal> {
        match self {
            NormalizeOutcome::Complete(s) => s,
            NormalizeOutcome::Partial { signals, .. } => signals,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, NormalizeOutcome::Partial { .. })
    }

    fn from_parts(signals: Vec<Signal>, missing: Vec<String>) -> Self {
        if missing.is_empty() {
            NormalizeOutcome::Complete(signals)
        } else {
            NormalizeOutcome::Partial { signals, missing }
        }
    }
}

/// Normalize one raw provider response into canonical signals.
pub fn normalize(raw: &RawResponse) -> Result<NormalizeOutcome> {
    if !raw.payload.is_object() {
        return Err(malformed(raw, "payload is not a JSON object"));
    }
    match raw.call {
        CallKind::KeywordMetrics => keyword_metrics(raw),
        CallKind::RelatedKeywords => related_keywords(raw),
        CallKind::SerpCollect => serp_collect(raw),
        CallKind::PageAudit => page_audit(raw),
    }
}

fn malformed(raw: &RawResponse, detail: &str) -> KeyscopeError {
    KeyscopeError::MalformedResponse {
        provider: raw.provider.clone(),
        detail: detail.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Keyword metrics (schema v1)
// ---------------------------------------------------------------------------

fn keyword_metrics(raw: &RawResponse) -> Result<NormalizeOutcome> {
    let rows = raw
        .payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(raw, "missing `data` array"))?;

    let mut signals = Vec::new();
    let mut missing = Vec::new();

    for row in rows {
        match keyword_row(row, raw) {
            Some(signal) => signals.push(Signal::Keyword(signal)),
            None => {
                debug!(provider = %raw.provider, "Dropping keyword row without usable identity");
                missing.push("keyword row without identity".to_string());
            }
        }
    }

    // Providers must report unresolved keywords, not omit them (§6).
    if let Some(not_found) = raw.payload.get("not_found").and_then(Value::as_array) {
        for kw in not_found.iter().filter_map(Value::as_str) {
            missing.push(format!("unresolved keyword: {kw}"));
        }
    }

    Ok(NormalizeOutcome::from_parts(signals, missing))
}

fn keyword_row(row: &Value, raw: &RawResponse) -> Option<KeywordSignal> {
    let text = row.get("keyword").and_then(Value::as_str)?;
    let key = KeywordKey::new(text, &raw.context.locale);
    if !key.is_valid() {
        return None;
    }

    let related_terms = row
        .get("related")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(KeywordSignal {
        key,
        volume: row
            .get("vol")
            .or_else(|| row.get("volume"))
            .and_then(Value::as_u64),
        competition: competition_value(row.get("competition")),
        cpc_usd: cpc_value(row.get("cpc")),
        intent: row
            .get("intent")
            .and_then(Value::as_str)
            .map(SearchIntent::from_str_loose),
        related_terms,
        provider: raw.provider.clone(),
        collected_at: collected_at(&raw.payload, &raw.context),
    })
}

/// CPC arrives in three shapes across provider versions: a nested object
/// `{"currency": "$", "value": "0.09"}`, a bare number, or a numeric
/// string. Anything else is `None` — never a bias-introducing 0.0.
pub(crate) fn cpc_value(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(obj) => match obj.get("value")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        },
        _ => None,
    }
}

/// Competition arrives as a 0–1 number or a `Low|Medium|High` label.
/// Labels map to documented midpoints: low 0.2, medium 0.5, high 0.8.
pub(crate) fn competition_value(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64().map(|c| c.clamp(0.0, 1.0)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "low" => Some(0.2),
            "medium" => Some(0.5),
            "high" => Some(0.8),
            other => other.parse::<f64>().ok().map(|c| c.clamp(0.0, 1.0)),
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Related keywords (schema v1)
// ---------------------------------------------------------------------------

/// Same row shape as keyword metrics. Rows become keyword signals, and the
/// seed keyword gains them as related terms — related terms are a scoring
/// input on the seed entity, never an identity merge (§4.2).
fn related_keywords(raw: &RawResponse) -> Result<NormalizeOutcome> {
    let seed_text = raw
        .context
        .keyword
        .as_deref()
        .or_else(|| raw.payload.get("seed_keyword").and_then(Value::as_str))
        .ok_or_else(|| malformed(raw, "related-keywords response without seed keyword"))?;
    let seed_key = KeywordKey::new(seed_text, &raw.context.locale);
    if !seed_key.is_valid() {
        return Err(KeyscopeError::InvalidEntity(format!(
            "empty seed keyword for related-keywords call: {seed_text:?}"
        )));
    }

    let outcome = keyword_metrics(raw)?;
    let (mut signals, missing) = match outcome {
        NormalizeOutcome::Complete(s) => (s, Vec::new()),
        NormalizeOutcome::Partial { signals, missing } => (signals, missing),
    };

    let related_terms: Vec<String> = signals
        .iter()
        .filter_map(|s| match s {
            Signal::Keyword(k) if k.key != seed_key => Some(k.key.text.clone()),
            _ => None,
        })
        .collect();

    signals.push(Signal::Keyword(KeywordSignal {
        key: seed_key,
        volume: None,
        competition: None,
        cpc_usd: None,
        intent: None,
        related_terms,
        provider: raw.provider.clone(),
        collected_at: collected_at(&raw.payload, &raw.context),
    }));

    Ok(NormalizeOutcome::from_parts(signals, missing))
}

// ---------------------------------------------------------------------------
// SERP collect (schema v1)
// ---------------------------------------------------------------------------

fn serp_collect(raw: &RawResponse) -> Result<NormalizeOutcome> {
    let keyword = raw
        .context
        .keyword
        .as_deref()
        .or_else(|| raw.payload.get("keyword").and_then(Value::as_str))
        .ok_or_else(|| malformed(raw, "serp payload without keyword context"))?;
    let key = KeywordKey::new(keyword, &raw.context.locale);
    if !key.is_valid() {
        return Err(KeyscopeError::InvalidEntity(
            "empty keyword for serp-collect call".to_string(),
        ));
    }

    let rows = raw
        .payload
        .get("organic_results")
        .or_else(|| raw.payload.get("results"))
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(raw, "missing `organic_results` array"))?;

    let mut missing = Vec::new();

    // Providers must report a stable snapshot timestamp (§6); fall back to
    // the request time but mark the snapshot partial.
    let captured_at = match payload_timestamp(&raw.payload) {
        Some(ts) => ts,
        None => {
            missing.push("snapshot timestamp".to_string());
            raw.context.requested_at
        }
    };

    let mut entries = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let url = match row.get("link").or_else(|| row.get("url")).and_then(Value::as_str) {
            Some(u) => u.to_string(),
            None => {
                missing.push(format!("organic result {} without url", i + 1));
                continue;
            }
        };
        entries.push(SerpEntry {
            position: row
                .get("position")
                .and_then(Value::as_u64)
                .map(|p| p as u32)
                .unwrap_or((i + 1) as u32),
            url,
            title: row
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            snippet: row
                .get("snippet")
                .and_then(Value::as_str)
                .map(str::to_string),
            word_count: row
                .get("word_count")
                .and_then(Value::as_u64)
                .map(|w| w as u32),
            topics: string_list(row.get("topics")),
        });
    }

    let mut features = std::collections::BTreeSet::new();
    let mut featured_snippet_url = None;
    if let Some(answer_box) = raw.payload.get("answer_box").filter(|v| v.is_object()) {
        features.insert(SerpFeature::FeaturedSnippet);
        featured_snippet_url = answer_box
            .get("link")
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    let mut paa_questions = Vec::new();
    if let Some(paa) = raw.payload.get("people_also_ask").and_then(Value::as_array) {
        features.insert(SerpFeature::PeopleAlsoAsk);
        paa_questions = paa
            .iter()
            .filter_map(|q| q.get("question").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
    }
    for (field, feature) in [
        ("images_results", SerpFeature::ImagePack),
        ("videos", SerpFeature::VideoPack),
        ("local_results", SerpFeature::LocalPack),
        ("shopping_results", SerpFeature::ShoppingResults),
        ("knowledge_graph", SerpFeature::KnowledgeGraph),
        ("top_stories", SerpFeature::TopStories),
    ] {
        if raw.payload.get(field).is_some_and(|v| !v.is_null()) {
            features.insert(feature);
        }
    }

    let related_queries = raw
        .payload
        .get("related_searches")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("query").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let snapshot = SerpSnapshot {
        id: Uuid::new_v4(),
        key,
        captured_at,
        provider: raw.provider.clone(),
        entries,
        features,
        featured_snippet_url,
        paa_questions,
        related_queries,
        total_results: raw
            .payload
            .get("search_information")
            .and_then(|si| si.get("total_results"))
            .or_else(|| raw.payload.get("total_results"))
            .and_then(Value::as_u64),
    };

    Ok(NormalizeOutcome::from_parts(
        vec![Signal::Serp(snapshot)],
        missing,
    ))
}

// ---------------------------------------------------------------------------
// Page audit (schema v1)
// ---------------------------------------------------------------------------

fn page_audit(raw: &RawResponse) -> Result<NormalizeOutcome> {
    let url_raw = raw
        .payload
        .get("url")
        .and_then(Value::as_str)
        .or(raw.context.url.as_deref())
        .ok_or_else(|| malformed(raw, "page-audit payload without url"))?;
    let url = canonical_url(url_raw).ok_or_else(|| {
        KeyscopeError::InvalidEntity(format!("unparseable audit url: {url_raw}"))
    })?;

    let mut missing = Vec::new();

    let word_count = raw
        .payload
        .get("word_count")
        .and_then(Value::as_u64)
        .map(|w| w as u32);
    if word_count.is_none() {
        missing.push("word_count".to_string());
    }

    let signal = PageAuditSignal {
        url,
        word_count,
        headings: headings(&raw.payload),
        schema_types: schema_types(&raw.payload),
        desktop_vitals: vitals(&raw.payload, "desktop"),
        mobile_vitals: vitals(&raw.payload, "mobile"),
        structured_data_valid: raw
            .payload
            .get("structured_data_valid")
            .and_then(Value::as_bool)
            .or_else(|| {
                raw.payload
                    .get("structured_data")
                    .and_then(|sd| sd.get("valid"))
                    .and_then(Value::as_bool)
            }),
        topics: string_list(raw.payload.get("topics").or_else(|| raw.payload.get("entities")))
            .into_iter()
            .collect(),
        provider: raw.provider.clone(),
        collected_at: collected_at(&raw.payload, &raw.context),
    };

    Ok(NormalizeOutcome::from_parts(
        vec![Signal::PageAudit(signal)],
        missing,
    ))
}

/// Heading outline from either shape: `{"headers": {"h1": [..], "h2": [..]}}`
/// or `{"headings": [{"level": 2, "text": ".."}]}`.
fn headings(payload: &Value) -> Vec<HeadingEntry> {
    if let Some(map) = payload.get("headers").and_then(Value::as_object) {
        let mut out = Vec::new();
        for level in 1..=6u8 {
            if let Some(texts) = map.get(&format!("h{level}")).and_then(Value::as_array) {
                for text in texts.iter().filter_map(Value::as_str) {
                    out.push(HeadingEntry {
                        level,
                        text: text.to_string(),
                    });
                }
            }
        }
        return out;
    }
    payload
        .get("headings")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|h| {
                    Some(HeadingEntry {
                        level: h.get("level")?.as_u64()?.clamp(1, 6) as u8,
                        text: h.get("text")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Schema types from `schema_types: ["FAQPage"]` or raw JSON-LD blocks in
/// `schema_markup: [{"@type": "FAQPage"}, ..]`.
fn schema_types(payload: &Value) -> std::collections::BTreeSet<String> {
    let mut out = std::collections::BTreeSet::new();
    for ty in string_list(payload.get("schema_types")) {
        out.insert(ty);
    }
    if let Some(blocks) = payload.get("schema_markup").and_then(Value::as_array) {
        for block in blocks {
            match block.get("@type") {
                Some(Value::String(s)) => {
                    out.insert(s.clone());
                }
                Some(Value::Array(arr)) => {
                    out.extend(arr.iter().filter_map(Value::as_str).map(str::to_string));
                }
                _ => {}
            }
        }
    }
    out
}

fn vitals(payload: &Value, device: &str) -> Option<WebVitals> {
    let block = payload.get("performance")?.get(device)?;
    if !block.is_object() {
        return None;
    }
    Some(WebVitals {
        lcp_ms: block.get("lcp_ms").and_then(Value::as_f64),
        cls: block.get("cls").and_then(Value::as_f64),
        inp_ms: block.get("inp_ms").and_then(Value::as_f64),
        performance_score: block.get("performance_score").and_then(Value::as_f64),
    })
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn payload_timestamp(payload: &Value) -> Option<DateTime<Utc>> {
    let raw = payload
        .get("captured_at")
        .or_else(|| payload.get("search_date"))
        .or_else(|| payload.get("timestamp"))?
        .as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn collected_at(payload: &Value, context: &RequestContext) -> DateTime<Utc> {
    payload_timestamp(payload).unwrap_or(context.requested_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(call: CallKind, keyword: Option<&str>, payload: Value) -> RawResponse {
        RawResponse {
            provider: "test-provider".to_string(),
            call,
            context: RequestContext {
                keyword: keyword.map(str::to_string),
                url: None,
                locale: "us".to_string(),
                requested_at: "2026-08-01T00:00:00Z".parse().unwrap(),
            },
            payload,
        }
    }

    // --- cpc_value ---

    #[test]
    fn cpc_handles_all_provider_shapes() {
        assert_eq!(cpc_value(Some(&json!({"currency": "$", "value": "0.09"}))), Some(0.09));
        assert_eq!(cpc_value(Some(&json!(1.25))), Some(1.25));
        assert_eq!(cpc_value(Some(&json!("2.50"))), Some(2.5));
        assert_eq!(cpc_value(Some(&json!(null))), None);
        assert_eq!(cpc_value(Some(&json!({"currency": "$"}))), None);
        assert_eq!(cpc_value(None), None);
    }

    #[test]
    fn missing_cpc_is_none_not_zero() {
        assert_ne!(cpc_value(Some(&json!("n/a"))), Some(0.0));
        assert_eq!(cpc_value(Some(&json!("n/a"))), None);
    }

    // --- competition_value ---

    #[test]
    fn competition_labels_map_to_midpoints() {
        assert_eq!(competition_value(Some(&json!("Low"))), Some(0.2));
        assert_eq!(competition_value(Some(&json!("medium"))), Some(0.5));
        assert_eq!(competition_value(Some(&json!("HIGH"))), Some(0.8));
        assert_eq!(competition_value(Some(&json!(0.35))), Some(0.35));
        assert_eq!(competition_value(Some(&json!(3.0))), Some(1.0));
        assert_eq!(competition_value(Some(&json!("unknown"))), None);
    }

    // --- keyword metrics ---

    #[test]
    fn keyword_metrics_parses_rows() {
        let response = raw(
            CallKind::KeywordMetrics,
            None,
            json!({
                "data": [
                    {"keyword": "Email Marketing", "vol": 1200, "cpc": {"value": "0.80"}, "competition": 0.35},
                    {"keyword": "seo tools", "vol": null, "competition": "High"}
                ]
            }),
        );

        let outcome = normalize(&response).unwrap();
        assert!(!outcome.is_partial());
        let signals = outcome.signals();
        assert_eq!(signals.len(), 2);

        let Signal::Keyword(first) = &signals[0] else {
            panic!("expected keyword signal");
        };
        assert_eq!(first.key.text, "email marketing");
        assert_eq!(first.volume, Some(1200));
        assert_eq!(first.cpc_usd, Some(0.80));
        assert_eq!(first.competition, Some(0.35));

        let Signal::Keyword(second) = &signals[1] else {
            panic!("expected keyword signal");
        };
        assert_eq!(second.volume, None, "null volume stays null");
        assert_eq!(second.competition, Some(0.8));
        assert_eq!(second.cpc_usd, None);
    }

    #[test]
    fn unresolved_keywords_surface_as_partial() {
        let response = raw(
            CallKind::KeywordMetrics,
            None,
            json!({
                "data": [{"keyword": "seo", "vol": 500}],
                "not_found": ["qwzrty marketing"]
            }),
        );

        let outcome = normalize(&response).unwrap();
        let NormalizeOutcome::Partial { signals, missing } = outcome else {
            panic!("expected partial outcome");
        };
        assert_eq!(signals.len(), 1);
        assert_eq!(missing, vec!["unresolved keyword: qwzrty marketing"]);
    }

    #[test]
    fn keyword_metrics_without_data_is_malformed() {
        let response = raw(CallKind::KeywordMetrics, None, json!({"rows": []}));
        let err = normalize(&response).unwrap_err();
        assert!(matches!(err, KeyscopeError::MalformedResponse { .. }));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let response = raw(CallKind::KeywordMetrics, None, json!([1, 2, 3]));
        assert!(matches!(
            normalize(&response),
            Err(KeyscopeError::MalformedResponse { .. })
        ));
    }

    // --- related keywords ---

    #[test]
    fn related_keywords_attach_to_seed() {
        let response = raw(
            CallKind::RelatedKeywords,
            Some("email marketing"),
            json!({
                "data": [
                    {"keyword": "email marketing tips", "vol": 300},
                    {"keyword": "best email marketing", "vol": 150}
                ]
            }),
        );

        let signals = normalize(&response).unwrap().signals();
        assert_eq!(signals.len(), 3);

        let seed = signals
            .iter()
            .find_map(|s| match s {
                Signal::Keyword(k) if k.key.text == "email marketing" => Some(k),
                _ => None,
            })
            .expect("seed signal present");
        assert_eq!(seed.related_terms.len(), 2);
        assert!(seed.related_terms.contains(&"email marketing tips".to_string()));
        assert_eq!(seed.volume, None, "seed carries terms, not metrics");
    }

    // --- serp collect ---

    fn serp_payload() -> Value {
        json!({
            "search_date": "2026-07-30T12:00:00Z",
            "organic_results": [
                {"position": 1, "link": "https://a.com/guide", "title": "Guide", "snippet": "..."},
                {"position": 2, "link": "https://b.com/post", "title": "Post"}
            ],
            "answer_box": {"type": "paragraph", "link": "https://a.com/guide"},
            "people_also_ask": [
                {"question": "What is email marketing?"},
                {"question": "How much does it cost?"}
            ],
            "videos": [{"title": "intro"}],
            "related_searches": [{"query": "email marketing software"}, "email campaigns"],
            "search_information": {"total_results": 128000000}
        })
    }

    #[test]
    fn serp_collect_builds_snapshot_with_features() {
        let response = raw(CallKind::SerpCollect, Some("email marketing"), serp_payload());
        let outcome = normalize(&response).unwrap();
        assert!(!outcome.is_partial());

        let signals = outcome.signals();
        let Signal::Serp(snap) = &signals[0] else {
            panic!("expected serp signal");
        };
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.captured_at.to_rfc3339(), "2026-07-30T12:00:00+00:00");
        assert!(snap.features.contains(&SerpFeature::FeaturedSnippet));
        assert!(snap.features.contains(&SerpFeature::PeopleAlsoAsk));
        assert!(snap.features.contains(&SerpFeature::VideoPack));
        assert!(!snap.features.contains(&SerpFeature::LocalPack));
        assert_eq!(snap.featured_snippet_url.as_deref(), Some("https://a.com/guide"));
        assert_eq!(snap.paa_questions.len(), 2);
        assert_eq!(snap.related_queries.len(), 2);
        assert_eq!(snap.total_results, Some(128000000));
    }

    #[test]
    fn serp_without_timestamp_is_partial_with_fallback() {
        let mut payload = serp_payload();
        payload.as_object_mut().unwrap().remove("search_date");
        let response = raw(CallKind::SerpCollect, Some("email marketing"), payload);

        let outcome = normalize(&response).unwrap();
        let NormalizeOutcome::Partial { signals, missing } = outcome else {
            panic!("expected partial outcome");
        };
        assert!(missing.contains(&"snapshot timestamp".to_string()));
        let Signal::Serp(snap) = &signals[0] else {
            panic!("expected serp signal");
        };
        assert_eq!(snap.captured_at, response.context.requested_at);
    }

    #[test]
    fn serp_without_results_is_malformed() {
        let response = raw(
            CallKind::SerpCollect,
            Some("email marketing"),
            json!({"search_date": "2026-07-30T12:00:00Z"}),
        );
        assert!(matches!(
            normalize(&response),
            Err(KeyscopeError::MalformedResponse { .. })
        ));
    }

    // --- page audit ---

    #[test]
    fn page_audit_parses_heading_map_and_schema_blocks() {
        let response = raw(
            CallKind::PageAudit,
            None,
            json!({
                "url": "https://Example.com/guide#intro",
                "word_count": 1850,
                "headers": {
                    "h1": ["Email Marketing Guide"],
                    "h2": ["Getting Started", "FAQ"]
                },
                "schema_markup": [{"@type": "Article"}, {"@type": ["FAQPage", "WebPage"]}],
                "structured_data": {"valid": true},
                "topics": ["email marketing", "automation"],
                "performance": {
                    "desktop": {"lcp_ms": 1800.0, "performance_score": 92.0},
                    "mobile": null
                }
            }),
        );

        let outcome = normalize(&response).unwrap();
        assert!(!outcome.is_partial());
        let signals = outcome.signals();
        let Signal::PageAudit(audit) = &signals[0] else {
            panic!("expected page audit signal");
        };
        assert_eq!(audit.url, "https://example.com/guide");
        assert_eq!(audit.word_count, Some(1850));
        assert_eq!(audit.headings.len(), 3);
        assert!(audit.has_faq_section());
        assert!(audit.schema_types.contains("FAQPage"));
        assert!(audit.schema_types.contains("Article"));
        assert_eq!(audit.structured_data_valid, Some(true));
        assert!(audit.desktop_vitals.is_some());
        assert!(audit.mobile_vitals.is_none());
        assert_eq!(audit.topics.len(), 2);
    }

    #[test]
    fn page_audit_without_word_count_is_partial() {
        let response = raw(
            CallKind::PageAudit,
            None,
            json!({"url": "https://example.com/thin", "topics": []}),
        );
        let outcome = normalize(&response).unwrap();
        assert!(outcome.is_partial());
    }

    #[test]
    fn page_audit_bad_url_is_invalid_entity() {
        let response = raw(
            CallKind::PageAudit,
            None,
            json!({"url": "not a url", "word_count": 10}),
        );
        assert!(matches!(
            normalize(&response),
            Err(KeyscopeError::InvalidEntity(_))
        ));
    }
}
