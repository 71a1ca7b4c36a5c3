//! Deduplicator (spec.md §4.E): per-source sliding windows keyed by
//! fingerprint/key/event-stream strategy. Sharded by source via `DashMap`
//! so no single lock serializes unrelated sources; a background sweep
//! evicts expired entries on a fixed cadence and a global counter bounds
//! total memory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::DedupConfig;
use crate::internal_events::{DedupWindowEntriesGauge, InternalEvent, ObservationDedupSuppressed};
use zen_core::Observation;

/// Global cap on tracked entries across all sources (spec.md §4.E
/// `DefaultDedupMaxSize`), enforced independently of any one source's
/// own `max_events_per_window`.
const GLOBAL_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

struct Entry {
    first_seen: Instant,
    arrivals: VecDeque<Instant>,
}

/// One source's window: keyed on the dedup key (fingerprint bytes or the
/// `key` strategy's concatenation), each entry tracking enough history to
/// answer `event_stream`'s "N per window" question as well as plain
/// first-wins suppression.
#[derive(Default)]
struct SourceWindow {
    entries: DashMap<Vec<u8>, Entry>,
}

/// Process-wide dedup state. One instance shared by every pipeline
/// worker; cheap to clone.
#[derive(Clone)]
pub struct DedupState {
    by_source: Arc<DashMap<String, SourceWindow>>,
    total_entries: Arc<AtomicUsize>,
    global_max: usize,
}

impl DedupState {
    pub fn new(global_max: usize) -> Self {
        Self {
            by_source: Arc::new(DashMap::new()),
            total_entries: Arc::new(AtomicUsize::new(0)),
            global_max,
        }
    }

    fn dedup_key(obs: &Observation, config: &DedupConfig) -> Vec<u8> {
        match config.strategy {
            crate::config::dedup::DedupStrategy::Key => {
                zen_core::fingerprint::field_key(&obs.details, &config.fields).into_bytes()
            }
            crate::config::dedup::DedupStrategy::Fingerprint | crate::config::dedup::DedupStrategy::EventStream => {
                obs.fingerprint.clone()
            }
        }
    }

    /// Returns `true` if `obs` should be suppressed (a duplicate within
    /// the window). Evicts the oldest global entry first if the new key
    /// would push total tracked entries over `global_max`.
    pub fn check_and_record(&self, obs: &Observation, config: &DedupConfig) -> bool {
        if !config.enabled {
            return false;
        }
        let now = Instant::now();
        let key = Self::dedup_key(obs, config);

        // Fast path first, without holding the per-source shard lock across
        // `reserve_capacity`'s cross-shard scan below (which could
        // otherwise deadlock against this same shard).
        let existing = self
            .by_source
            .get(&obs.source)
            .and_then(|window| window.entries.get_mut(&key).map(|mut entry| {
                entry.arrivals.retain(|t| now.duration_since(*t) < config.window);
                let within_window = now.duration_since(entry.first_seen) < config.window;
                if !within_window {
                    entry.first_seen = now;
                    entry.arrivals.clear();
                }
                use crate::config::dedup::DedupStrategy;
                let suppress = match config.strategy {
                    DedupStrategy::Fingerprint | DedupStrategy::Key => within_window,
                    DedupStrategy::EventStream => entry.arrivals.len() >= config.max_events_per_window,
                };
                if !suppress {
                    entry.arrivals.push_back(now);
                }
                suppress
            }));

        let suppress = match existing {
            Some(suppress) => suppress,
            None => {
                self.reserve_capacity();
                let window = self.by_source.entry(obs.source.clone()).or_default();
                window.entries.entry(key).or_insert_with(|| {
                    self.total_entries.fetch_add(1, Ordering::Relaxed);
                    Entry {
                        first_seen: now,
                        arrivals: VecDeque::from([now]),
                    }
                });
                false
            }
        };

        if suppress {
            ObservationDedupSuppressed {
                source: &obs.source,
                strategy: match config.strategy {
                    crate::config::dedup::DedupStrategy::Fingerprint => "fingerprint",
                    crate::config::dedup::DedupStrategy::Key => "key",
                    crate::config::dedup::DedupStrategy::EventStream => "event_stream",
                },
            }
            .emit();
        }
        suppress
    }

    /// Evicts the globally-oldest entry if we're already at capacity,
    /// making room for the key about to be inserted. `O(sources)` scan is
    /// acceptable at the configured default of 10k entries and a sweep
    /// cadence measured in seconds, not a hot per-event path.
    fn reserve_capacity(&self) {
        if self.total_entries.load(Ordering::Relaxed) < self.global_max {
            return;
        }
        let mut oldest: Option<(String, Vec<u8>, Instant)> = None;
        for shard in self.by_source.iter() {
            for entry in shard.entries.iter() {
                let candidate = (shard.key().clone(), entry.key().clone(), entry.first_seen);
                if oldest.as_ref().map(|(_, _, t)| candidate.2 < *t).unwrap_or(true) {
                    oldest = Some(candidate);
                }
            }
        }
        if let Some((source, key, _)) = oldest {
            if let Some(window) = self.by_source.get(&source) {
                if window.entries.remove(&key).is_some() {
                    self.total_entries.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn sweep(&self, window_lookup: impl Fn(&str) -> Duration) {
        for shard in self.by_source.iter() {
            let window = window_lookup(shard.key());
            let now = Instant::now();
            let before = shard.entries.len();
            shard.entries.retain(|_, entry| now.duration_since(entry.first_seen) < window);
            let removed = before.saturating_sub(shard.entries.len());
            if removed > 0 {
                self.total_entries.fetch_sub(removed, Ordering::Relaxed);
            }
            DedupWindowEntriesGauge {
                source: shard.key(),
                entries: shard.entries.len(),
            }
            .emit();
        }
    }
}

/// Background eviction loop (spec.md §4.E: "lazy eviction on access plus a
/// background sweep every `window/4`"). Uses a single fixed cadence across
/// all sources and asks the Registry for each source's current window at
/// sweep time, since windows are hot-reloadable per source.
pub async fn run_sweeper(state: DedupState, registry: crate::config::Registry, token: CancellationToken) {
    let mut interval = tokio::time::interval(GLOBAL_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {
                state.sweep(|source| registry.get(source).dedup.window);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use zen_core::ResourceRef;

    fn obs(fingerprint: Vec<u8>) -> Observation {
        Observation {
            source: "trivy".to_string(),
            category: "vulnerability".to_string(),
            severity: zen_core::Severity::High,
            event_type: "cve".to_string(),
            message: String::new(),
            detected_at: chrono::Utc::now(),
            resource_ref: ResourceRef {
                group: None,
                kind: "Pod".to_string(),
                name: "nginx".to_string(),
                namespace: Some("default".to_string()),
            },
            details: IndexMap::new(),
            priority: 0.5,
            fingerprint,
            ttl: None,
        }
    }

    #[test]
    fn second_identical_fingerprint_within_window_is_suppressed() {
        let state = DedupState::new(10_000);
        let config = DedupConfig {
            enabled: true,
            window: Duration::from_secs(60),
            strategy: crate::config::dedup::DedupStrategy::Fingerprint,
            fields: vec![],
            max_events_per_window: 10,
        };
        let e = obs(vec![1, 2, 3]);
        assert!(!state.check_and_record(&e, &config));
        assert!(state.check_and_record(&e, &config));
    }

    #[test]
    fn event_stream_strategy_allows_up_to_n_per_window() {
        let state = DedupState::new(10_000);
        let config = DedupConfig {
            enabled: true,
            window: Duration::from_secs(60),
            strategy: crate::config::dedup::DedupStrategy::EventStream,
            fields: vec![],
            max_events_per_window: 2,
        };
        let e = obs(vec![9, 9, 9]);
        assert!(!state.check_and_record(&e, &config));
        assert!(!state.check_and_record(&e, &config));
        assert!(state.check_and_record(&e, &config));
    }

    #[test]
    fn disabled_dedup_never_suppresses() {
        let state = DedupState::new(10_000);
        let config = DedupConfig {
            enabled: false,
            ..Default::default()
        };
        let e = obs(vec![1]);
        assert!(!state.check_and_record(&e, &config));
        assert!(!state.check_and_record(&e, &config));
    }
}
