//! Collaborator contracts for the external data providers.
//!
//! The engine never talks to the network itself — these traits are the
//! seam where host applications plug in their clients. Providers return
//! raw `serde_json::Value` payloads in the shapes the normalizer parses;
//! the coordinator wraps them with request context into `RawResponse`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use keyscope_common::KeyscopeError;

pub type CallResult<T> = std::result::Result<T, ProviderCallError>;

/// Failure kinds at the provider-call boundary. `Clone` because coalesced
/// callers all receive the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderCallError {
    #[error("rate limit exhausted")]
    RateLimited,

    #[error("call timed out")]
    Timeout,

    #[error("credentials rejected")]
    Auth,

    /// The page could not be fetched at all.
    #[error("page unreachable: {0}")]
    PageUnreachable(String),

    /// The page was fetched but holds no detectable content. Distinct from
    /// unreachable — the audit happened, the page is just empty.
    #[error("no detectable content at {0}")]
    NoContent(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl ProviderCallError {
    /// Transient failures worth another attempt after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderCallError::RateLimited | ProviderCallError::Timeout
        )
    }

    /// Map onto the engine taxonomy for run-level reporting.
    pub fn into_engine_error(self, provider: &str) -> KeyscopeError {
        let provider = provider.to_string();
        match self {
            ProviderCallError::RateLimited => KeyscopeError::RateLimited { provider },
            ProviderCallError::Timeout => KeyscopeError::Timeout { provider },
            ProviderCallError::Auth => KeyscopeError::Auth { provider },
            other => KeyscopeError::Internal(anyhow::anyhow!("{provider}: {other}")),
        }
    }
}

/// Keyword volume/competition/CPC data. Unresolved keywords must be
/// reported in the payload (`not_found`), never silently omitted.
#[async_trait]
pub trait KeywordDataProvider: Send + Sync {
    /// Identity for rate limiting, coalescing, and logging.
    fn name(&self) -> &str;

    async fn keyword_metrics(&self, keywords: &[String], locale: &str) -> CallResult<Value>;

    async fn related_keywords(&self, seed: &str, locale: &str) -> CallResult<Value>;
}

/// Ranked result lists plus detected feature flags. Payloads must carry a
/// stable snapshot timestamp.
#[async_trait]
pub trait SerpDataProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self, keyword: &str, locale: &str) -> CallResult<Value>;
}

/// Structural/content facts about one URL. Implementations must return
/// `PageUnreachable` and `NoContent` as distinct failures.
#[async_trait]
pub trait PageAuditProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn audit(&self, url: &str) -> CallResult<Value>;
}
