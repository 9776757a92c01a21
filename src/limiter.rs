//! Per-provider token-bucket rate limiting.
//!
//! Every outbound provider call must pass through `try_acquire` (or the
//! awaiting `acquire`) first. Token counts stay within `[0, capacity]`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

pub const PROVIDER_MARKET_DATA: &str = "market_data";
pub const PROVIDER_ANALYSIS: &str = "analysis";

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens =
            (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("token bucket lock poisoned");
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// How long until a full token is available, given the current level.
    fn time_until_token(&self) -> Duration {
        let mut state = self.state.lock().expect("token bucket lock poisoned");
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let missing = 1.0 - state.tokens;
        Duration::from_secs_f64(missing / self.refill_per_sec)
    }
}

/// Independent token buckets keyed by provider name. Providers without a
/// configured budget are admitted unconditionally.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    buckets: Arc<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let buckets = config
            .budgets
            .iter()
            .map(|(provider, budget)| {
                (
                    provider.clone(),
                    TokenBucket::new(budget.capacity, budget.refill_per_sec),
                )
            })
            .collect();
        Self {
            buckets: Arc::new(buckets),
        }
    }

    /// Non-blocking admission check. Consumes one token on success.
    pub fn try_acquire(&self, provider: &str) -> bool {
        match self.buckets.get(provider) {
            Some(bucket) => bucket.try_acquire(),
            None => true,
        }
    }

    /// Waits for a token up to `timeout`. Returns false when the budget did
    /// not refill in time.
    pub async fn acquire(&self, provider: &str, timeout: Duration) -> bool {
        let bucket = match self.buckets.get(provider) {
            Some(bucket) => bucket,
            None => return true,
        };

        let deadline = Instant::now() + timeout;
        loop {
            if bucket.try_acquire() {
                return true;
            }
            let wait = bucket.time_until_token();
            let now = Instant::now();
            if now + wait > deadline {
                return false;
            }
            tokio::time::sleep(wait).await;
        }
    }
}
