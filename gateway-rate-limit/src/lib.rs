//! In-memory token-bucket rate limiting, used by the edge (C7) to enforce
//! each endpoint's per-minute rate ceiling (spec.md §4.5). Keyed by endpoint
//! id so tenants never share a bucket.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Refill tokens based on elapsed time and try to consume one.
/// Returns `true` if a token was consumed, `false` if rate-limited.
#[inline]
fn refill_and_try_consume(
    tokens: &mut f64,
    last_refill: &mut Instant,
    max_tokens: f64,
    window: Duration,
) -> bool {
    let now = Instant::now();
    let elapsed = now.duration_since(*last_refill);
    let refill = (elapsed.as_secs_f64() / window.as_secs_f64()) * max_tokens;
    *tokens = (*tokens + refill).min(max_tokens);
    *last_refill = now;

    if *tokens >= 1.0 {
        *tokens -= 1.0;
        true
    } else {
        false
    }
}

/// Per-key bucket with heterogeneous max/window, set by the first call for
/// that key. Endpoints carry their own `rate_limit_per_minute`, so the
/// gateway cannot size every bucket up front.
struct ConfiguredBucket {
    tokens: f64,
    max_tokens: f64,
    window: Duration,
    last_refill: Instant,
}

/// In-memory token-bucket registry, one bucket per endpoint id.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    buckets: Arc<DashMap<String, ConfiguredBucket>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Try to acquire a permit for `endpoint_id`, allowing `max` requests
    /// per 60-second window. Returns `true` if the call may proceed.
    pub fn try_acquire(&self, endpoint_id: &str, max_per_minute: u32) -> bool {
        let max_tokens = max_per_minute as f64;
        let window = Duration::from_secs(60);

        let mut entry = self
            .buckets
            .entry(endpoint_id.to_string())
            .or_insert_with(|| ConfiguredBucket {
                tokens: max_tokens,
                max_tokens,
                window,
                last_refill: Instant::now(),
            });

        let bucket = entry.value_mut();
        // The endpoint's configured ceiling can change between calls (the
        // dashboard may edit it); always refill against the latest value.
        bucket.max_tokens = max_tokens;
        refill_and_try_consume(
            &mut bucket.tokens,
            &mut bucket.last_refill,
            bucket.max_tokens,
            bucket.window,
        )
    }
}

impl Default for EndpointRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_rate_limiter_isolates_endpoints() {
        let limiter = EndpointRateLimiter::new();
        assert!(limiter.try_acquire("endpoint-a", 1));
        assert!(!limiter.try_acquire("endpoint-a", 1));
        assert!(limiter.try_acquire("endpoint-b", 1));
    }

    #[test]
    fn endpoint_rate_limiter_blocks_over_ceiling() {
        let limiter = EndpointRateLimiter::new();
        assert!(limiter.try_acquire("e", 2));
        assert!(limiter.try_acquire("e", 2));
        assert!(!limiter.try_acquire("e", 2));
    }
}
