//! Fixed-window rate limiter over a shared [`CounterStore`].

use relay_kernel::{CounterStore, RateLimitConfig, StoreResult};
use std::sync::Arc;
use std::time::Duration;

/// Redis key namespace for rate counters.
const KEY_PREFIX: &str = "ratelimit:";

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Post-increment count in the current window.
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the window resets.
    pub reset_after: Duration,
}

/// Admits at most `max_calls` per `period_secs` window for each client key.
///
/// Every attempt increments the counter, rejected ones included; the window
/// resets when the counter expires.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn limit(&self) -> u64 {
        self.config.max_calls
    }

    /// Count one call for `client_key` and decide whether it is admitted.
    pub async fn check(&self, client_key: &str) -> StoreResult<RateLimitDecision> {
        let key = format!("{KEY_PREFIX}{client_key}");
        let window = self.store.increment(&key, self.config.period()).await?;
        let limit = self.config.max_calls;
        Ok(RateLimitDecision {
            allowed: window.count <= limit,
            count: window.count,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_after: window.expires_in,
        })
    }

    /// Boolean form of [`check`](Self::check). A counter-store failure
    /// rejects.
    pub async fn allow(&self, client_key: &str) -> bool {
        self.check(client_key)
            .await
            .map(|d| d.allowed)
            .unwrap_or(false)
    }
}
