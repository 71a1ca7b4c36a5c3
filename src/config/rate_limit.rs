//! `RateLimitConfig`: per-source token-bucket parameters (spec.md §4.F).

use serde::{Deserialize, Serialize};

/// Plain-old-data so it can be used in a `const` default
/// ([`super::defaults::DEFAULT_RATE_LIMIT`]); the actual token bucket lives
/// in [`crate::pipeline::rate_limit`] and is built from this at snapshot
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_per_minute: u32,
    pub burst: u32,
}

impl RateLimitConfig {
    pub const fn new(max_per_minute: u32, burst: u32) -> Self {
        Self { max_per_minute, burst }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_construction() {
        const CFG: RateLimitConfig = RateLimitConfig::new(100, 200);
        assert_eq!(CFG.max_per_minute, 100);
        assert_eq!(CFG.burst, 200);
    }
}
