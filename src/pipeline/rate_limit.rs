//! Rate limiter (spec.md §4.F): one token bucket per source. Each source
//! gets its own `governor::RateLimiter`, rebuilt whenever its
//! `RateLimitConfig` changes (hot-reloadable, same as every other
//! per-source config) — `governor` itself has no notion of a per-key
//! quota, only a single quota shared by every key in a keyed limiter, so
//! per-source buckets are modeled as direct limiters in a `DashMap`
//! instead.

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{Quota, RateLimiter};

use crate::config::RateLimitConfig;
use crate::internal_events::{InternalEvent, ObservationRateLimited};

type DirectLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

struct Bucket {
    config: RateLimitConfig,
    limiter: DirectLimiter,
}

fn quota_for(config: RateLimitConfig) -> Quota {
    let per_minute = NonZeroU32::new(config.max_per_minute.max(1)).unwrap();
    let burst = NonZeroU32::new(config.burst.max(1)).unwrap();
    Quota::per_minute(per_minute).allow_burst(burst)
}

/// Process-wide rate limiter state, keyed by source. Cheap to clone.
#[derive(Clone, Default)]
pub struct RateLimiterState {
    buckets: Arc<DashMap<String, Bucket>>,
}

impl RateLimiterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the event passes (a token was available).
    /// Dropped events are counted as rate-limited, never queued (spec.md
    /// §4.F: "events arriving with an empty bucket are dropped").
    pub fn check(&self, source: &str, config: RateLimitConfig) -> bool {
        let needs_rebuild = self
            .buckets
            .get(source)
            .map(|b| b.config != config)
            .unwrap_or(true);
        if needs_rebuild {
            self.buckets.insert(
                source.to_string(),
                Bucket {
                    config,
                    limiter: RateLimiter::direct(quota_for(config)),
                },
            );
        }

        let passed = self
            .buckets
            .get(source)
            .map(|b| b.limiter.check().is_ok())
            .unwrap_or(true);

        if !passed {
            ObservationRateLimited { source }.emit();
        }
        passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_capacity_then_drops() {
        let state = RateLimiterState::new();
        let config = RateLimitConfig::new(60, 2);
        assert!(state.check("trivy", config));
        assert!(state.check("trivy", config));
        assert!(!state.check("trivy", config));
    }

    #[test]
    fn different_sources_have_independent_buckets() {
        let state = RateLimiterState::new();
        let config = RateLimitConfig::new(60, 1);
        assert!(state.check("trivy", config));
        assert!(state.check("falco", config));
    }
}
