//! `SourceSnapshot`: the immutable, atomically-swapped view of everything
//! a pipeline worker needs for one source (spec.md §3 "Ownership", §5
//! "Hot-reload without races"). Workers dereference their `Arc` once per
//! event at stage entry and finish the event under that snapshot even if
//! the Registry is updated mid-flight.

use std::sync::Arc;
use std::time::Duration;

use super::dedup::DedupConfig;
use super::filter::FilterConfig;
use super::ingester::IngesterConfig;
use super::rate_limit::RateLimitConfig;

/// Everything [`super::registry::Registry::get`] returns for one source:
/// the compiled `IngesterConfig` plus the filter/dedup/rate-limit configs
/// already merged and defaulted, so pipeline stages never need to consult
/// `SourceDefaults`/`TypeDefaults` themselves.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub ingester: Arc<IngesterConfig>,
    pub filter: FilterConfig,
    pub dedup: DedupConfig,
    pub rate_limit: RateLimitConfig,
    /// `ttl.default` from `ObservationSourceConfig`, or `None` if the
    /// source has none configured (the persister then writes a record
    /// with no expiry label).
    pub ttl: Option<Duration>,
}

impl SourceSnapshot {
    pub fn source(&self) -> &str {
        &self.ingester.source
    }
}
