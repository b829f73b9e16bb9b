//! Fan-out Coordinator: drives provider calls under per-provider limits.
//!
//! Each provider gets its own limiter (concurrency cap + rate window +
//! call budget). Transient failures retry with bounded exponential
//! backoff; an auth rejection poisons the provider for the rest of the
//! run; duplicate in-flight requests for the same (provider, call, key)
//! coalesce onto one call. A run-level cancel flag is checked at every
//! provider-call boundary — the engine's own computation never blocks.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use keyscope_engine::normalize::{CallKind, RawResponse, RequestContext};

use crate::limiter::{backoff_delay, ProviderLimiter, ProviderLimits};
use crate::providers::{
    CallResult, KeywordDataProvider, PageAuditProvider, ProviderCallError, SerpDataProvider,
};

/// Run-level cancellation. Cloned into every caller; cancelling causes
/// in-flight work to wind down and the run to return partial results
/// rather than discarding already-obtained signals.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Identity of one logical provider request, for coalescing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub provider: String,
    pub call: CallKind,
    pub key: String,
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.call, self.key)
    }
}

type SharedResult = watch::Receiver<Option<CallResult<Value>>>;

pub struct FanOutCoordinator {
    keyword_provider: Arc<dyn KeywordDataProvider>,
    serp_provider: Arc<dyn SerpDataProvider>,
    audit_provider: Arc<dyn PageAuditProvider>,
    configured_limits: HashMap<String, ProviderLimits>,
    limiters: std::sync::Mutex<HashMap<String, Arc<ProviderLimiter>>>,
    inflight: tokio::sync::Mutex<HashMap<RequestKey, SharedResult>>,
    poisoned: std::sync::Mutex<HashSet<String>>,
    cancel: CancelFlag,
}

impl FanOutCoordinator {
    pub fn new(
        keyword_provider: Arc<dyn KeywordDataProvider>,
        serp_provider: Arc<dyn SerpDataProvider>,
        audit_provider: Arc<dyn PageAuditProvider>,
        limits: HashMap<String, ProviderLimits>,
    ) -> Self {
        Self {
            keyword_provider,
            serp_provider,
            audit_provider,
            configured_limits: limits,
            limiters: std::sync::Mutex::new(HashMap::new()),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
            poisoned: std::sync::Mutex::new(HashSet::new()),
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for callers that need to cancel the run.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn limiter(&self, provider: &str) -> Arc<ProviderLimiter> {
        let mut limiters = self.limiters.lock().expect("limiter registry poisoned");
        limiters
            .entry(provider.to_string())
            .or_insert_with(|| {
                let limits = self
                    .configured_limits
                    .get(provider)
                    .cloned()
                    .unwrap_or_default();
                Arc::new(ProviderLimiter::new(limits))
            })
            .clone()
    }

    fn is_poisoned(&self, provider: &str) -> bool {
        self.poisoned
            .lock()
            .expect("poison registry poisoned")
            .contains(provider)
    }

    fn poison(&self, provider: &str) {
        warn!(provider, "Credentials rejected, disabling provider for this run");
        self.poisoned
            .lock()
            .expect("poison registry poisoned")
            .insert(provider.to_string());
    }

    // --- Typed call surface ---

    /// One batched keyword-metrics call. The batch key is order-insensitive
    /// so overlapping discovery rounds coalesce.
    pub async fn keyword_metrics(
        &self,
        keywords: &[String],
        locale: &str,
    ) -> CallResult<RawResponse> {
        let mut batch: Vec<String> = keywords.to_vec();
        batch.sort();
        batch.dedup();
        let provider = self.keyword_provider.name().to_string();
        let key = RequestKey {
            provider: provider.clone(),
            call: CallKind::KeywordMetrics,
            key: batch.join(","),
        };
        let keyword_provider = self.keyword_provider.clone();
        let locale_owned = locale.to_string();
        let payload = self
            .execute(key, move || {
                let p = keyword_provider.clone();
                let batch = batch.clone();
                let locale = locale_owned.clone();
                async move { p.keyword_metrics(&batch, &locale).await }
            })
            .await?;
        Ok(self.wrap(provider, CallKind::KeywordMetrics, None, None, locale, payload))
    }

    pub async fn related_keywords(&self, seed: &str, locale: &str) -> CallResult<RawResponse> {
        let provider = self.keyword_provider.name().to_string();
        let key = RequestKey {
            provider: provider.clone(),
            call: CallKind::RelatedKeywords,
            key: format!("{locale}:{seed}"),
        };
        let keyword_provider = self.keyword_provider.clone();
        let seed_owned = seed.to_string();
        let locale_owned = locale.to_string();
        let payload = self
            .execute(key, move || {
                let p = keyword_provider.clone();
                let seed = seed_owned.clone();
                let locale = locale_owned.clone();
                async move { p.related_keywords(&seed, &locale).await }
            })
            .await?;
        Ok(self.wrap(
            provider,
            CallKind::RelatedKeywords,
            Some(seed.to_string()),
            None,
            locale,
            payload,
        ))
    }

    pub async fn serp_collect(&self, keyword: &str, locale: &str) -> CallResult<RawResponse> {
        let provider = self.serp_provider.name().to_string();
        let key = RequestKey {
            provider: provider.clone(),
            call: CallKind::SerpCollect,
            key: format!("{locale}:{keyword}"),
        };
        let serp_provider = self.serp_provider.clone();
        let keyword_owned = keyword.to_string();
        let locale_owned = locale.to_string();
        let payload = self
            .execute(key, move || {
                let p = serp_provider.clone();
                let keyword = keyword_owned.clone();
                let locale = locale_owned.clone();
                async move { p.collect(&keyword, &locale).await }
            })
            .await?;
        Ok(self.wrap(
            provider,
            CallKind::SerpCollect,
            Some(keyword.to_string()),
            None,
            locale,
            payload,
        ))
    }

    pub async fn page_audit(&self, url: &str, locale: &str) -> CallResult<RawResponse> {
        let provider = self.audit_provider.name().to_string();
        let key = RequestKey {
            provider: provider.clone(),
            call: CallKind::PageAudit,
            key: url.to_string(),
        };
        let audit_provider = self.audit_provider.clone();
        let url_owned = url.to_string();
        let payload = self
            .execute(key, move || {
                let p = audit_provider.clone();
                let url = url_owned.clone();
                async move { p.audit(&url).await }
            })
            .await?;
        Ok(self.wrap(
            provider,
            CallKind::PageAudit,
            None,
            Some(url.to_string()),
            locale,
            payload,
        ))
    }

    fn wrap(
        &self,
        provider: String,
        call: CallKind,
        keyword: Option<String>,
        url: Option<String>,
        locale: &str,
        payload: Value,
    ) -> RawResponse {
        RawResponse {
            provider,
            call,
            context: RequestContext {
                keyword,
                url,
                locale: locale.to_string(),
                requested_at: Utc::now(),
            },
            payload,
        }
    }

    // --- Core execution: coalescing + retry + limits ---

    async fn execute<F, Fut>(&self, key: RequestKey, make_call: F) -> CallResult<Value>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CallResult<Value>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ProviderCallError::Cancelled);
        }

        let tx = {
            let mut inflight = self.inflight.lock().await;
            if let Some(rx) = inflight.get(&key) {
                let rx = rx.clone();
                drop(inflight);
                debug!(key = %key, "Coalescing onto in-flight request");
                return await_shared(rx).await;
            }
            let (tx, rx) = watch::channel(None);
            inflight.insert(key.clone(), rx);
            tx
        };

        let result = self.call_with_retry(&key.provider, make_call).await;

        self.inflight.lock().await.remove(&key);
        let _ = tx.send(Some(result.clone()));
        result
    }

    async fn call_with_retry<F, Fut>(&self, provider: &str, make_call: F) -> CallResult<Value>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CallResult<Value>>,
    {
        let limiter = self.limiter(provider);
        let limits = limiter.limits().clone();
        let mut last = ProviderCallError::Other("no attempts made".to_string());

        for attempt in 0..limits.max_attempts.max(1) {
            if self.cancel.is_cancelled() {
                return Err(ProviderCallError::Cancelled);
            }
            if self.is_poisoned(provider) {
                return Err(ProviderCallError::Auth);
            }

            // Budget exhaustion fails fast here — the budget never refills
            // within a run, so retrying would only burn the backoff clock.
            let permit = limiter.acquire().await?;
            let outcome = tokio::time::timeout(limits.call_timeout(), make_call())
                .await
                .map_err(|_| ProviderCallError::Timeout)
                .and_then(|r| r);
            drop(permit);

            match outcome {
                Ok(value) => return Ok(value),
                Err(ProviderCallError::Auth) => {
                    self.poison(provider);
                    return Err(ProviderCallError::Auth);
                }
                Err(e) if e.is_retryable() && attempt + 1 < limits.max_attempts => {
                    let delay = backoff_delay(limits.backoff_base(), attempt);
                    warn!(
                        provider,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }
}

/// Wait for a coalesced result from the caller that owns the in-flight call.
async fn await_shared(mut rx: SharedResult) -> CallResult<Value> {
    loop {
        if let Some(result) = rx.borrow().clone() {
            return result;
        }
        if rx.changed().await.is_err() {
            return Err(ProviderCallError::Other(
                "in-flight call abandoned".to_string(),
            ));
        }
    }
}
