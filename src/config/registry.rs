//! The Config Registry (spec.md §4.A): a process-wide, read-mostly store
//! of compiled configs keyed by source, mutated only by reconcilers and
//! read wait-free by every pipeline worker.
//!
//! Validation happens in each reconciler before it calls an `upsert_*`
//! method here; the Registry itself never rejects a write. That gives
//! last-known-good retention (P4) for free — an invalid CRD update simply
//! never reaches `upsert`, so the previous entry is untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use super::dedup::DedupConfig;
use super::filter::FilterConfig;
use super::ingester::{IngesterConfig, IngesterKind};
use super::rate_limit::RateLimitConfig;
use super::snapshot::SourceSnapshot;
use super::defaults;
use super::type_config::TypeConfig;
use zen_core::Severity;

#[derive(Debug, Default)]
struct SourceEntry {
    ingester: Option<IngesterConfig>,
    /// Names of live `Ingester` CRDs declaring this source. Evicted only
    /// when this set is empty — resolves the spec's open question about
    /// same-source multi-Ingester deletes (SPEC_FULL.md supplemented
    /// features). Keyed by CRD name rather than a bare count so that
    /// the same CRD reapplied (e.g. on every `Apply`/`InitApply`) never
    /// inflates the live count.
    ingester_crds: HashSet<String>,
    /// `ObservationFilter` CRDs targeting this source, keyed by CRD name
    /// so a delete can remove exactly the one that was deleted.
    filters: HashMap<String, FilterConfig>,
    /// `ObservationDedupConfig` / dedup block of `ObservationSourceConfig`,
    /// keyed by CRD name; merged the same way as filters.
    dedups: HashMap<String, DedupConfig>,
    rate_limit: Option<RateLimitConfig>,
    /// `ttl.default` from `ObservationSourceConfig`, stamped onto every
    /// `Observation` normalized for this source (spec.md §6).
    ttl: Option<std::time::Duration>,
}

impl SourceEntry {
    fn merged_filter(&self) -> FilterConfig {
        let mut iter = self.filters.values();
        let Some(first) = iter.next() else {
            return self.ingester.as_ref().map(|i| i.filter.clone()).unwrap_or_default();
        };
        let mut merged = first.clone();
        for f in iter {
            merged = merged.merge(f);
        }
        if let Some(ingester) = &self.ingester {
            merged = merged.merge(&ingester.filter);
        }
        merged
    }

    fn merged_dedup(&self) -> DedupConfig {
        let mut iter = self.dedups.values();
        let Some(first) = iter.next() else {
            return self
                .ingester
                .as_ref()
                .and_then(|i| i.dedup.clone())
                .unwrap_or_else(|| DedupConfig {
                    window: defaults::DEFAULT_DEDUP_WINDOW,
                    max_events_per_window: defaults::DEFAULT_DEDUP_MAX_SIZE,
                    ..Default::default()
                });
        };
        let mut merged = first.clone();
        for d in iter {
            merged = merged.merge(d);
        }
        if let Some(ingester) = &self.ingester {
            if let Some(ingester_dedup) = &ingester.dedup {
                merged = merged.merge(ingester_dedup);
            }
        }
        merged
    }

    fn effective_rate_limit(&self) -> RateLimitConfig {
        self.rate_limit
            .or(self.ingester.as_ref().and_then(|i| i.rate_limit))
            .unwrap_or(defaults::DEFAULT_RATE_LIMIT)
    }
}

/// Process-wide compiled config store. Cheap to clone (every field is an
/// `Arc`-like handle); reconcilers and pipeline workers share one
/// instance.
#[derive(Clone)]
pub struct Registry {
    by_source: Arc<DashMap<String, SourceEntry>>,
    by_kind: Arc<DashMap<&'static str, HashSet<String>>>,
    by_namespace: Arc<DashMap<String, HashSet<String>>>,
    type_configs: Arc<DashMap<String, TypeConfig>>,
    version_tx: watch::Sender<u64>,
}

impl Registry {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            by_source: Arc::new(DashMap::new()),
            by_kind: Arc::new(DashMap::new()),
            by_namespace: Arc::new(DashMap::new()),
            type_configs: Arc::new(DashMap::new()),
            version_tx,
        }
    }

    /// Coalesced, at-most-once-per-change notification stream. A `watch`
    /// channel naturally coalesces bursts of writes into a single
    /// wakeable change for a slow subscriber, matching the spec's
    /// `subscribe()` contract.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    fn bump_version(&self) {
        self.version_tx.send_modify(|v| *v += 1);
    }

    fn kind_label(kind: &IngesterKind) -> &'static str {
        match kind {
            IngesterKind::Informer(_) => "informer",
            IngesterKind::Logs(_) => "logs",
            IngesterKind::Webhook(_) => "webhook",
            IngesterKind::Events(_) => "events",
        }
    }

    fn namespace_of(kind: &IngesterKind) -> Option<String> {
        match kind {
            IngesterKind::Informer(b) => b.namespace.clone(),
            IngesterKind::Events(b) => b.namespaces.first().cloned(),
            IngesterKind::Logs(_) | IngesterKind::Webhook(_) => None,
        }
    }

    /// Called by the Ingester reconciler on Add/Update (including the
    /// initial `InitApply` replay). Records `crd_name` in the source's
    /// live-CRD set rather than blindly incrementing a counter, so the
    /// same CRD reapplied on every edit never inflates how many distinct
    /// Ingesters are considered to reference this source.
    pub fn upsert_ingester(&self, crd_name: &str, config: IngesterConfig) {
        let source = config.source.clone();
        let kind_label = Self::kind_label(&config.kind);
        let namespace = Self::namespace_of(&config.kind);

        self.by_source
            .entry(source.clone())
            .and_modify(|e| {
                e.ingester_crds.insert(crd_name.to_string());
                e.ingester = Some(config.clone());
            })
            .or_insert_with(|| SourceEntry {
                ingester: Some(config),
                ingester_crds: HashSet::from([crd_name.to_string()]),
                ..Default::default()
            });

        self.by_kind.entry(kind_label).or_default().insert(source.clone());
        if let Some(ns) = namespace {
            self.by_namespace.entry(ns).or_default().insert(source.clone());
        }
        self.bump_version();
    }

    /// Called by the Ingester reconciler on Delete (including a
    /// recoverable tombstone). Removes `crd_name` from the source's
    /// live-CRD set; the entry's ingester-derived config is evicted only
    /// once that set is empty, so a second live Ingester CRD still
    /// referencing this source keeps the source configured (P5, and the
    /// multi-Ingester open question).
    pub fn delete_ingester(&self, crd_name: &str, source: &str) {
        let mut should_remove = false;
        if let Some(mut entry) = self.by_source.get_mut(source) {
            entry.ingester_crds.remove(crd_name);
            if entry.ingester_crds.is_empty() {
                entry.ingester = None;
                should_remove = entry.filters.is_empty()
                    && entry.dedups.is_empty()
                    && entry.rate_limit.is_none()
                    && entry.ttl.is_none();
            }
        }
        if should_remove {
            self.by_source.remove(source);
        }
        for mut kinds in self.by_kind.iter_mut() {
            kinds.remove(source);
        }
        self.bump_version();
    }

    pub fn upsert_filter(&self, crd_name: &str, source: &str, filter: FilterConfig) {
        self.by_source
            .entry(source.to_string())
            .or_default()
            .filters
            .insert(crd_name.to_string(), filter);
        self.bump_version();
    }

    pub fn delete_filter(&self, crd_name: &str, source: &str) {
        if let Some(mut entry) = self.by_source.get_mut(source) {
            entry.filters.remove(crd_name);
        }
        self.bump_version();
    }

    pub fn upsert_dedup(&self, crd_name: &str, source: &str, dedup: DedupConfig) {
        self.by_source
            .entry(source.to_string())
            .or_default()
            .dedups
            .insert(crd_name.to_string(), dedup);
        self.bump_version();
    }

    pub fn delete_dedup(&self, crd_name: &str, source: &str) {
        if let Some(mut entry) = self.by_source.get_mut(source) {
            entry.dedups.remove(crd_name);
        }
        self.bump_version();
    }

    pub fn upsert_rate_limit(&self, source: &str, rate_limit: RateLimitConfig) {
        self.by_source.entry(source.to_string()).or_default().rate_limit = Some(rate_limit);
        self.bump_version();
    }

    pub fn delete_rate_limit(&self, source: &str) {
        if let Some(mut entry) = self.by_source.get_mut(source) {
            entry.rate_limit = None;
        }
        self.bump_version();
    }

    pub fn upsert_ttl(&self, source: &str, ttl: std::time::Duration) {
        self.by_source.entry(source.to_string()).or_default().ttl = Some(ttl);
        self.bump_version();
    }

    pub fn delete_ttl(&self, source: &str) {
        if let Some(mut entry) = self.by_source.get_mut(source) {
            entry.ttl = None;
        }
        self.bump_version();
    }

    pub fn upsert_type_config(&self, config: TypeConfig) {
        self.type_configs.insert(config.event_type.clone(), config);
        self.bump_version();
    }

    pub fn delete_type_config(&self, event_type: &str) {
        self.type_configs.remove(event_type);
        self.bump_version();
    }

    pub fn type_config(&self, event_type: &str) -> Option<TypeConfig> {
        self.type_configs.get(event_type).map(|e| e.clone())
    }

    /// Wait-free hot path: returns a fully-merged, fully-defaulted
    /// snapshot even for a source with no CRD at all (synthesized from
    /// [`defaults::SOURCE_DEFAULTS`]/[`defaults::TYPE_DEFAULTS`]).
    pub fn get(&self, source: &str) -> SourceSnapshot {
        match self.by_source.get(source) {
            Some(entry) => {
                let ingester = entry
                    .ingester
                    .clone()
                    .unwrap_or_else(|| synthetic_ingester_config(source));
                SourceSnapshot {
                    filter: entry.merged_filter(),
                    dedup: entry.merged_dedup(),
                    rate_limit: entry.effective_rate_limit(),
                    ttl: entry.ttl,
                    ingester: Arc::new(ingester),
                }
            }
            None => SourceSnapshot {
                ingester: Arc::new(synthetic_ingester_config(source)),
                filter: FilterConfig::default(),
                dedup: DedupConfig {
                    window: defaults::DEFAULT_DEDUP_WINDOW,
                    max_events_per_window: defaults::DEFAULT_DEDUP_MAX_SIZE,
                    ..Default::default()
                },
                rate_limit: defaults::DEFAULT_RATE_LIMIT,
                ttl: None,
            },
        }
    }

    /// Priority resolution for a normalized event, delegating to the
    /// `ObservationTypeConfig` for `event_type` when one exists, then to
    /// [`defaults::resolve_priority`] (spec.md §4.C step 3).
    pub fn resolve_priority(&self, source: &str, event_type: &str, severity: Severity) -> f64 {
        if let Some(type_config) = self.type_config(event_type) {
            if let Some(p) = type_config.priority_for(severity) {
                return p;
            }
        }
        defaults::resolve_priority(source, event_type, severity)
    }

    pub fn sources_by_kind(&self, kind: &str) -> Vec<String> {
        self.by_kind
            .get(kind)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sources_by_namespace(&self, namespace: &str) -> Vec<String> {
        self.by_namespace
            .get(namespace)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every source with a live `Ingester` CRD, i.e. everything the
    /// adapter supervisor should have a running adapter for.
    pub fn ingester_sources(&self) -> Vec<String> {
        self.by_source
            .iter()
            .filter(|entry| entry.ingester.is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Built when a source has no live `Ingester` CRD but other config
/// (a standalone `ObservationFilter`, or simply nothing) still needs a
/// `SourceSnapshot` to carry. `destinations` is empty — callers must treat
/// an empty destination list as "no Ingester configured, drop upstream of
/// the pipeline" rather than attempt to persist.
fn synthetic_ingester_config(source: &str) -> IngesterConfig {
    use super::ingester::{EventsBlock, IngesterKind, NormalizationConfig, ProcessingOrder};
    IngesterConfig {
        source: source.to_string(),
        kind: IngesterKind::Events(EventsBlock {
            namespaces: vec![],
            involved_object_kinds: vec![],
        }),
        normalization: NormalizationConfig::default(),
        filter: FilterConfig::default(),
        dedup: None,
        rate_limit: None,
        destinations: vec![],
        order: ProcessingOrder::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ingester::{Destination, DestinationKind, EventsBlock, IngesterKind};

    fn ingester(source: &str) -> IngesterConfig {
        IngesterConfig {
            source: source.to_string(),
            kind: IngesterKind::Events(EventsBlock {
                namespaces: vec!["default".to_string()],
                involved_object_kinds: vec![],
            }),
            normalization: Default::default(),
            filter: FilterConfig::default(),
            dedup: None,
            rate_limit: None,
            destinations: vec![Destination {
                kind: DestinationKind::Crd,
                group: "zen.kube-zen.io".to_string(),
                version: "v1".to_string(),
                resource: "observations".to_string(),
            }],
            order: Default::default(),
        }
    }

    #[test]
    fn get_on_unknown_source_returns_defaults() {
        let registry = Registry::new();
        let snapshot = registry.get("never-seen");
        assert_eq!(snapshot.rate_limit, defaults::DEFAULT_RATE_LIMIT);
        assert!(snapshot.ingester.destinations.is_empty());
    }

    #[test]
    fn second_ingester_keeps_source_alive_after_one_delete() {
        let registry = Registry::new();
        registry.upsert_ingester("a", ingester("trivy"));
        registry.upsert_ingester("b", ingester("trivy"));
        registry.delete_ingester("a", "trivy");
        let snapshot = registry.get("trivy");
        assert!(!snapshot.ingester.destinations.is_empty());
    }

    #[test]
    fn reapplying_the_same_ingester_crd_does_not_inflate_the_live_count() {
        let registry = Registry::new();
        registry.upsert_ingester("a", ingester("trivy"));
        registry.upsert_ingester("a", ingester("trivy"));
        registry.upsert_ingester("a", ingester("trivy"));
        registry.delete_ingester("a", "trivy");
        let snapshot = registry.get("trivy");
        assert!(snapshot.ingester.destinations.is_empty());
    }

    #[test]
    fn deleting_last_ingester_falls_back_to_defaults() {
        let registry = Registry::new();
        registry.upsert_ingester("a", ingester("trivy"));
        registry.delete_ingester("a", "trivy");
        let snapshot = registry.get("trivy");
        assert!(snapshot.ingester.destinations.is_empty());
    }

    #[test]
    fn filter_merge_is_visible_through_get() {
        let registry = Registry::new();
        registry.upsert_filter(
            "f1",
            "trivy",
            FilterConfig {
                min_severity: Some(Severity::Medium),
                ..Default::default()
            },
        );
        registry.upsert_filter(
            "f2",
            "trivy",
            FilterConfig {
                min_severity: Some(Severity::High),
                ..Default::default()
            },
        );
        let snapshot = registry.get("trivy");
        assert_eq!(snapshot.filter.min_severity, Some(Severity::High));
    }

    #[test]
    fn last_known_good_survives_skipped_invalid_update() {
        let registry = Registry::new();
        registry.upsert_ingester("a", ingester("trivy"));
        // Simulates a reconciler that validated a new CRD revision,
        // found it invalid, and never called upsert_ingester again.
        let snapshot = registry.get("trivy");
        assert!(!snapshot.ingester.destinations.is_empty());
    }
}
