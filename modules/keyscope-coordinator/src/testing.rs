//! Test mocks for the coordinator, one per provider trait boundary.
//!
//! HashMap-based payload registration with builder methods, plus a
//! failure queue per identity so tests can script "time out twice, then
//! succeed". Call counters expose how often each provider was actually
//! invoked — the coalescing and retry tests assert on them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::providers::{
    CallResult, KeywordDataProvider, PageAuditProvider, ProviderCallError, SerpDataProvider,
};

struct MockState {
    payloads: HashMap<String, Value>,
    failures: Mutex<HashMap<String, VecDeque<ProviderCallError>>>,
    calls: AtomicU32,
    delay: Option<std::time::Duration>,
}

impl MockState {
    fn new() -> Self {
        Self {
            payloads: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
            delay: None,
        }
    }

    async fn respond(&self, id: &str) -> CallResult<Value> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(queue) = self.failures.lock().unwrap().get_mut(id) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        self.payloads
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderCallError::Other(format!("no mock payload for {id}")))
    }
}

// ---------------------------------------------------------------------------
// MockKeywordProvider
// ---------------------------------------------------------------------------

/// Keyword-data mock. Metrics calls are keyed by the sorted, comma-joined
/// batch; related calls by the seed keyword.
pub struct MockKeywordProvider {
    state: MockState,
}

impl MockKeywordProvider {
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
        }
    }

    pub fn on_metrics(mut self, keywords: &[&str], payload: Value) -> Self {
        self.state.payloads.insert(batch_key(keywords), payload);
        self
    }

    pub fn on_related(mut self, seed: &str, payload: Value) -> Self {
        self.state
            .payloads
            .insert(format!("related:{seed}"), payload);
        self
    }

    /// Queue failures returned ahead of the registered payload.
    pub fn fail_metrics(self, keywords: &[&str], errors: Vec<ProviderCallError>) -> Self {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(batch_key(keywords), errors.into());
        self
    }

    /// Delay every response; lets tests hold a call in flight.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.state.delay = Some(std::time::Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockKeywordProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn batch_key(keywords: &[&str]) -> String {
    let mut sorted: Vec<&str> = keywords.to_vec();
    sorted.sort_unstable();
    sorted.join(",")
}

#[async_trait]
impl KeywordDataProvider for MockKeywordProvider {
    fn name(&self) -> &str {
        "mock-keywords"
    }

    async fn keyword_metrics(&self, keywords: &[String], _locale: &str) -> CallResult<Value> {
        let refs: Vec<&str> = keywords.iter().map(String::as_str).collect();
        self.state.respond(&batch_key(&refs)).await
    }

    async fn related_keywords(&self, seed: &str, _locale: &str) -> CallResult<Value> {
        self.state.respond(&format!("related:{seed}")).await
    }
}

// ---------------------------------------------------------------------------
// MockSerpProvider
// ---------------------------------------------------------------------------

pub struct MockSerpProvider {
    state: MockState,
}

impl MockSerpProvider {
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
        }
    }

    pub fn on_collect(mut self, keyword: &str, payload: Value) -> Self {
        self.state.payloads.insert(keyword.to_string(), payload);
        self
    }

    pub fn fail_collect(self, keyword: &str, errors: Vec<ProviderCallError>) -> Self {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(keyword.to_string(), errors.into());
        self
    }

    /// Delay every response; lets tests hold a call in flight.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.state.delay = Some(std::time::Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSerpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SerpDataProvider for MockSerpProvider {
    fn name(&self) -> &str {
        "mock-serp"
    }

    async fn collect(&self, keyword: &str, _locale: &str) -> CallResult<Value> {
        self.state.respond(keyword).await
    }
}

// ---------------------------------------------------------------------------
// MockAuditProvider
// ---------------------------------------------------------------------------

pub struct MockAuditProvider {
    state: MockState,
}

impl MockAuditProvider {
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
        }
    }

    pub fn on_audit(mut self, url: &str, payload: Value) -> Self {
        self.state.payloads.insert(url.to_string(), payload);
        self
    }

    pub fn fail_audit(self, url: &str, errors: Vec<ProviderCallError>) -> Self {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(url.to_string(), errors.into());
        self
    }

    /// Delay every response; lets tests hold a call in flight.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.state.delay = Some(std::time::Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAuditProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageAuditProvider for MockAuditProvider {
    fn name(&self) -> &str {
        "mock-audit"
    }

    async fn audit(&self, url: &str) -> CallResult<Value> {
        self.state.respond(url).await
    }
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

/// Minimal keyword-metrics payload for one row.
pub fn metrics_payload(keyword: &str, volume: u64, competition: f64) -> Value {
    json!({
        "data": [{"keyword": keyword, "vol": volume, "competition": competition}]
    })
}

/// Minimal SERP payload with a stable timestamp and the given result urls.
pub fn serp_payload(urls: &[&str]) -> Value {
    let results: Vec<Value> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| json!({"position": i + 1, "link": url, "title": format!("Result {}", i + 1)}))
        .collect();
    json!({
        "search_date": "2026-08-01T06:00:00Z",
        "organic_results": results
    })
}

/// Minimal page-audit payload.
pub fn audit_payload(url: &str, word_count: u64, topics: &[&str]) -> Value {
    json!({
        "url": url,
        "word_count": word_count,
        "topics": topics,
        "headers": {"h1": ["Title"]}
    })
}
