//! Per-provider resource limits: a concurrency cap, a fixed-window rate
//! limiter, and a per-run call budget. Limits are provider-specific — a
//! keyword API sold at 100 calls/month needs a different budget than a
//! self-hosted audit scraper — so every provider gets its own limiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::providers::ProviderCallError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProviderLimits {
    /// Max simultaneous in-flight calls. Default 4.
    pub max_concurrency: usize,
    /// Fixed rate-limit window length. Default 1s.
    pub window_secs: u64,
    /// Calls admitted per window. Default 5.
    pub calls_per_window: u32,
    /// Total calls allowed this run; 0 = unlimited. Default 0.
    pub call_budget: u64,
    /// Max attempts per logical request (first try + retries). Default 3.
    pub max_attempts: u32,
    /// Base backoff delay; actual delay is base × 2^attempt + jitter.
    /// Default 500ms.
    pub backoff_base_ms: u64,
    /// Per-call timeout. Default 30s.
    pub call_timeout_secs: u64,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            window_secs: 1,
            calls_per_window: 5,
            call_budget: 0,
            max_attempts: 3,
            backoff_base_ms: 500,
            call_timeout_secs: 30,
        }
    }
}

impl ProviderLimits {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

struct WindowState {
    started: Instant,
    used: u32,
}

/// Enforces one provider's limits. Budget is tracked with atomics so
/// concurrent callers never over-admit; the window state sits behind an
/// async mutex because blocked callers sleep until the window turns over.
pub struct ProviderLimiter {
    limits: ProviderLimits,
    semaphore: Semaphore,
    window: Mutex<WindowState>,
    calls_made: AtomicU64,
}

impl ProviderLimiter {
    pub fn new(limits: ProviderLimits) -> Self {
        Self {
            semaphore: Semaphore::new(limits.max_concurrency),
            window: Mutex::new(WindowState {
                started: Instant::now(),
                used: 0,
            }),
            calls_made: AtomicU64::new(0),
            limits,
        }
    }

    pub fn limits(&self) -> &ProviderLimits {
        &self.limits
    }

    /// Acquire a call slot: waits for concurrency and for the rate-limit
    /// window, fails fast with `RateLimited` once the run budget is gone —
    /// an exhausted budget never refills within a run, so there is nothing
    /// to wait for.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, ProviderCallError> {
        if !self.try_spend_budget() {
            warn!(
                budget = self.limits.call_budget,
                "Provider call budget exhausted"
            );
            return Err(ProviderCallError::RateLimited);
        }

        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderCallError::Other("limiter closed".to_string()))?;

        let window_len = Duration::from_secs(self.limits.window_secs.max(1));
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let mut elapsed = window.started.elapsed();
                if elapsed >= window_len {
                    window.started = Instant::now();
                    window.used = 0;
                    elapsed = Duration::ZERO;
                }
                if window.used < self.limits.calls_per_window {
                    window.used += 1;
                    None
                } else {
                    Some(
                        window_len
                            .saturating_sub(elapsed)
                            .max(Duration::from_millis(1)),
                    )
                }
            };
            match wait {
                None => return Ok(permit),
                Some(delay) => {
                    debug!(delay_ms = delay.as_millis() as u64, "Rate window full, waiting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn try_spend_budget(&self) -> bool {
        if self.limits.call_budget == 0 {
            self.calls_made.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        // Reserve-then-check keeps concurrent callers from sneaking past
        // the limit between a load and a store.
        let prev = self.calls_made.fetch_add(1, Ordering::Relaxed);
        if prev >= self.limits.call_budget {
            return false;
        }
        true
    }

    /// Total acquire attempts that reached the budget gate, including the
    /// one that exhausted it.
    pub fn calls_made(&self) -> u64 {
        self.calls_made.load(Ordering::Relaxed)
    }

    /// Budget remaining; `u64::MAX` when unlimited.
    pub fn budget_remaining(&self) -> u64 {
        if self.limits.call_budget == 0 {
            return u64::MAX;
        }
        self.limits
            .call_budget
            .saturating_sub(self.calls_made.load(Ordering::Relaxed))
    }
}

/// Bounded exponential backoff with jitter: `base × 2^attempt` plus up to
/// 250ms of random jitter so synchronized retries spread out.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    use rand::Rng;
    let exp = base * 2u32.saturating_pow(attempt);
    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
    exp + jitter
}
