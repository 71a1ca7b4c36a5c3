//! The six seed end-to-end scenarios, driven through the pipeline stage
//! functions and the Registry directly (no real API server: adapters and
//! the persister are the only components that need one, and they are
//! exercised separately in their own unit tests).

use std::collections::HashSet;
use std::time::Duration;

use indexmap::IndexMap;
use zen_watcher::config::ingester::{
    Destination, DestinationKind, EventsBlock, IngesterConfig, IngesterKind, NormalizationConfig, ProcessingOrder,
};
use zen_watcher::config::{DedupConfig, FilterConfig, RateLimitConfig, Registry};
use zen_watcher::pipeline::dedup::DedupState;
use zen_watcher::pipeline::filter;
use zen_watcher::pipeline::rate_limit::RateLimiterState;
use zen_core::{Observation, ResourceRef, Severity};

fn observation(source: &str, severity: Severity, fingerprint: Vec<u8>) -> Observation {
    Observation {
        source: source.to_string(),
        category: "vulnerability".to_string(),
        severity,
        event_type: "cve".to_string(),
        message: "test".to_string(),
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

fn destination() -> Destination {
    Destination {
        kind: DestinationKind::Crd,
        group: "zen.kube-zen.io".to_string(),
        version: "v1".to_string(),
        resource: "observations".to_string(),
    }
}

fn ingester_config(source: &str, destinations: Vec<Destination>) -> IngesterConfig {
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
        destinations,
        order: ProcessingOrder::default(),
    }
}

/// Scenario 1: dedup window, fingerprint strategy. 20 identical fingerprints
/// within 1s against a 60s window; exactly one survives, 19 are suppressed.
#[test]
fn scenario_1_dedup_window_fingerprint_strategy() {
    let state = DedupState::new(10_000);
    let config = DedupConfig {
        enabled: true,
        window: Duration::from_secs(60),
        strategy: zen_watcher::config::DedupStrategy::Fingerprint,
        fields: vec![],
        max_events_per_window: 10,
    };
    let obs = observation("trivy", Severity::High, vec![7, 7, 7]);

    let mut suppressed = 0;
    let mut passed = 0;
    for _ in 0..20 {
        if state.check_and_record(&obs, &config) {
            suppressed += 1;
        } else {
            passed += 1;
        }
    }
    assert_eq!(passed, 1);
    assert_eq!(suppressed, 19);
}

/// Scenario 2: two `ObservationFilter`s targeting the same source merge to
/// the more restrictive `min_severity`; a MEDIUM event is dropped, a HIGH
/// one passes.
#[test]
fn scenario_2_filter_restrictiveness_on_merge() {
    let registry = Registry::new();
    registry.upsert_filter(
        "ObservationFilter/a",
        "trivy",
        FilterConfig {
            min_severity: Some(Severity::Medium),
            ..Default::default()
        },
    );
    registry.upsert_filter(
        "ObservationFilter/b",
        "trivy",
        FilterConfig {
            min_severity: Some(Severity::High),
            ..Default::default()
        },
    );

    let snapshot = registry.get("trivy");
    let medium = observation("trivy", Severity::Medium, vec![1]);
    let high = observation("trivy", Severity::High, vec![2]);

    assert_eq!(filter::evaluate(&medium, &snapshot.filter), Err(filter::REASON_MIN_SEVERITY));
    assert_eq!(filter::evaluate(&high, &snapshot.filter), Ok(()));
}

/// Scenario 3: tombstone delete. An Ingester CRD is created then deleted;
/// `registry.get` falls back to synthetic defaults afterward and nothing
/// panics.
#[test]
fn scenario_3_tombstone_delete_falls_back_to_defaults() {
    let registry = Registry::new();
    registry.upsert_ingester("Ingester/trivy", ingester_config("trivy", vec![destination()]));
    assert!(!registry.get("trivy").ingester.destinations.is_empty());

    registry.delete_ingester("Ingester/trivy", "trivy");
    let snapshot = registry.get("trivy");
    assert!(snapshot.ingester.destinations.is_empty());
}

/// Scenario 4: last-known-good. A valid filter is applied; a subsequent
/// "invalid config" is simulated by simply not calling `upsert_filter`
/// again (mirroring `parse_legacy_filters` returning `None` and the
/// reconciler closure never touching the Registry) — the previously
/// excluded LOW-severity event stays excluded.
#[test]
fn scenario_4_last_known_good_on_invalid_update() {
    let registry = Registry::new();
    registry.upsert_filter(
        "ObservationFilter/a",
        "trivy",
        FilterConfig {
            min_severity: Some(Severity::Medium),
            ..Default::default()
        },
    );

    let low = observation("trivy", Severity::Low, vec![3]);
    let before = filter::evaluate(&low, &registry.get("trivy").filter);
    assert_eq!(before, Err(filter::REASON_MIN_SEVERITY));

    // "invalid update" arrives and is dropped by the reconciler before ever
    // reaching the Registry; nothing changes.
    let after = filter::evaluate(&low, &registry.get("trivy").filter);
    assert_eq!(after, Err(filter::REASON_MIN_SEVERITY));
}

/// Scenario 5: rate limit. `max_per_minute=60, burst=10`; of 100 events
/// arriving back-to-back, exactly the first 10 pass and the rest are
/// dropped (the bucket has no time to refill within the burst).
#[test]
fn scenario_5_rate_limit_burst_then_drops() {
    let state = RateLimiterState::new();
    let config = RateLimitConfig::new(60, 10);

    let mut passed = 0;
    let mut dropped = 0;
    for _ in 0..100 {
        if state.check("trivy", config) {
            passed += 1;
        } else {
            dropped += 1;
        }
    }
    assert_eq!(passed, 10);
    assert_eq!(dropped, 90);
}

/// Scenario 6: multi-destination fan-out. An Ingester with two destinations
/// has both present in the compiled config, so the pipeline's persist
/// dispatch fans the same observation out to both.
#[test]
fn scenario_6_multi_destination_fan_out_has_both_destinations() {
    let registry = Registry::new();
    let destinations = vec![
        destination(),
        Destination {
            kind: DestinationKind::Crd,
            group: "zen.kube-zen.io".to_string(),
            version: "v1".to_string(),
            resource: "vulnerabilityobservations".to_string(),
        },
    ];
    registry.upsert_ingester("Ingester/trivy", ingester_config("trivy", destinations.clone()));

    let snapshot = registry.get("trivy");
    assert_eq!(snapshot.ingester.destinations.len(), 2);
    let resources: HashSet<_> = snapshot.ingester.destinations.iter().map(|d| d.resource.clone()).collect();
    assert_eq!(resources, destinations.iter().map(|d| d.resource.clone()).collect());
}
