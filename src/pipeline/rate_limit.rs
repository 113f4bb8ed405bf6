//! Token bucket rate limiting

use super::{Next, ToolInvocation, ToolMiddleware, ToolOutcome};
use crate::config::RateLimitConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tokens are tracked in billionths so refill stays exact at any rate
const NANOS_PER_TOKEN: u128 = 1_000_000_000;

/// Minimum gap between sweeps of idle per-caller buckets
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct BucketState {
    available: u128,
    last_refill: Instant,
}

/// A token bucket: `burst` capacity refilled at `rate` tokens per second
#[derive(Debug)]
pub struct TokenBucket {
    rate: u32,
    capacity: u128,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate: u32, burst: u32) -> Self {
        Self::starting_at(rate, burst, Instant::now())
    }

    /// A full bucket whose refill clock starts at `now`
    pub fn starting_at(rate: u32, burst: u32, now: Instant) -> Self {
        let capacity = u128::from(burst) * NANOS_PER_TOKEN;
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                available: capacity,
                last_refill: now,
            }),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one token if available at `now`. Never waits.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.lock();

        let elapsed = now.saturating_duration_since(state.last_refill).as_nanos();
        if elapsed > 0 {
            // elapsed is in ns and rate in tokens/s, so the product is nanotokens
            let refill = elapsed.saturating_mul(u128::from(self.rate));
            state.available = state.available.saturating_add(refill).min(self.capacity);
            state.last_refill = now;
        }

        if state.available >= NANOS_PER_TOKEN {
            state.available -= NANOS_PER_TOKEN;
            true
        } else {
            false
        }
    }

    /// Whether the bucket would be back at capacity by `now`.
    /// A full bucket behaves exactly like a fresh one, so it can be dropped.
    pub fn is_full_at(&self, now: Instant) -> bool {
        let state = self.lock();
        let elapsed = now.saturating_duration_since(state.last_refill).as_nanos();
        let refill = elapsed.saturating_mul(u128::from(self.rate));
        state.available.saturating_add(refill) >= self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct RateLimitingMiddleware {
    rate: u32,
    burst: u32,
    global: TokenBucket,
    per_caller: Option<DashMap<String, TokenBucket>>,
    last_sweep: Mutex<Instant>,
}

impl RateLimitingMiddleware {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            rate: config.requests_per_second,
            burst: config.burst,
            global: TokenBucket::new(config.requests_per_second, config.burst),
            per_caller: config.per_caller.then(DashMap::new),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    fn admit(&self, invocation: &ToolInvocation) -> bool {
        let subject = invocation.caller.as_ref().map(|caller| caller.subject.as_str());
        self.admit_at(subject, Instant::now())
    }

    fn admit_at(&self, subject: Option<&str>, now: Instant) -> bool {
        match (&self.per_caller, subject) {
            (Some(buckets), Some(subject)) => {
                self.sweep_idle(buckets, now);
                buckets
                    .entry(subject.to_string())
                    .or_insert_with(|| TokenBucket::starting_at(self.rate, self.burst, now))
                    .try_acquire_at(now)
            }
            _ => self.global.try_acquire_at(now),
        }
    }

    /// Drop buckets that have refilled to capacity, at most once per `SWEEP_INTERVAL`
    fn sweep_idle(&self, buckets: &DashMap<String, TokenBucket>, now: Instant) {
        {
            let mut last_sweep = match self.last_sweep.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if now.saturating_duration_since(*last_sweep) < SWEEP_INTERVAL {
                return;
            }
            *last_sweep = now;
        }

        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_full_at(now));
        let evicted = before.saturating_sub(buckets.len());
        if evicted > 0 {
            debug!(evicted, remaining = buckets.len(), "Evicted idle rate limit buckets");
        }
    }

    #[cfg(test)]
    fn tracked_callers(&self) -> usize {
        self.per_caller.as_ref().map_or(0, DashMap::len)
    }
}

#[async_trait]
impl ToolMiddleware for RateLimitingMiddleware {
    fn name(&self) -> &'static str {
        "rate_limiting"
    }

    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
        if !self.admit(invocation) {
            warn!(
                execution_id = %invocation.execution_id,
                tool_name = %invocation.tool_name(),
                "Rate limit exceeded"
            );
            return Err(GatewayError::rate_limited(format!(
                "more than {} requests per second (burst {})",
                self.rate, self.burst
            )));
        }
        next.run(invocation).await
    }
}
