//! Reconciler for the two ConfigMap-backed config sources (spec.md §6):
//! `features.yaml` (base + environment overlay) and the legacy
//! `filter.json` filter map. Same pattern as the CRD reconcilers — watch,
//! parse, push into shared state — just scoped to a ConfigMap's `.data`
//! key instead of a typed `spec`.

use std::collections::{HashMap, HashSet};

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

use crate::config::feature_flags::{FeatureFlagStore, FeatureFlags};
use crate::config::filter::FilterConfig;
use crate::config::{Registry, StartupConfig};
use zen_core::Severity;

const FILTER_CRD_NAME: &str = "configmap/filter.json";

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyFilterEntry {
    min_severity: Option<Severity>,
    include_severity: Vec<Severity>,
    include_event_types: Vec<String>,
    exclude_event_types: Vec<String>,
    include_namespaces: Vec<String>,
    exclude_namespaces: Vec<String>,
    include_kinds: Vec<String>,
    exclude_kinds: Vec<String>,
    include_categories: Vec<String>,
    exclude_categories: Vec<String>,
    exclude_rules: Vec<String>,
    enabled: Option<bool>,
}

fn compile_legacy(entry: LegacyFilterEntry) -> FilterConfig {
    FilterConfig {
        enabled: entry.enabled,
        min_severity: entry.min_severity,
        include_severities: entry.include_severity.into_iter().collect(),
        include_event_types: entry.include_event_types.into_iter().collect(),
        exclude_event_types: entry.exclude_event_types.into_iter().collect(),
        include_namespaces: entry.include_namespaces.into_iter().collect(),
        exclude_namespaces: entry.exclude_namespaces.into_iter().collect(),
        include_kinds: entry.include_kinds.into_iter().collect(),
        exclude_kinds: entry.exclude_kinds.into_iter().collect(),
        include_categories: entry.include_categories.into_iter().collect(),
        exclude_categories: entry.exclude_categories.into_iter().collect(),
        exclude_rules: entry.exclude_rules.into_iter().collect(),
        min_priority: None,
        expression: None,
    }
}

fn parse_features(obj: &ConfigMap, key: &str) -> Option<FeatureFlags> {
    let raw = obj.data.as_ref()?.get(key)?;
    match serde_yaml::from_str(raw) {
        Ok(flags) => Some(flags),
        Err(error) => {
            warn!(configmap = %obj.name_any(), %error, "invalid features.yaml, retaining last-known-good");
            metrics::counter!(
                "config_validation_errors_total",
                "kind" => "ConfigMap:features",
                "reason" => "yaml parse error"
            )
            .increment(1);
            None
        }
    }
}

fn parse_legacy_filters(obj: &ConfigMap, key: &str) -> Option<HashMap<String, FilterConfig>> {
    let raw = obj.data.as_ref()?.get(key)?;
    match serde_json::from_str::<HashMap<String, LegacyFilterEntry>>(raw) {
        Ok(map) => Some(map.into_iter().map(|(source, entry)| (source, compile_legacy(entry))).collect()),
        Err(error) => {
            warn!(configmap = %obj.name_any(), %error, "invalid filter.json, retaining last-known-good");
            metrics::counter!(
                "config_validation_errors_total",
                "kind" => "ConfigMap:filter",
                "reason" => "json parse error"
            )
            .increment(1);
            None
        }
    }
}

pub async fn run(
    client: Client,
    registry: Registry,
    feature_flags: std::sync::Arc<FeatureFlagStore>,
    startup: StartupConfig,
    token: CancellationToken,
) {
    let api: Api<ConfigMap> = match &startup.watch_namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    let base_name = startup.base_config_name.clone();
    let env_name = startup.env_config_name.clone();
    let filter_name = startup
        .filter_configmap_name
        .clone()
        .unwrap_or_else(|| "observation-filter-config".to_string());
    let filter_key = startup.filter_configmap_key.clone();
    let mut known_filter_sources: HashSet<String> = HashSet::new();

    super::run_watcher(
        api,
        token,
        move |obj| {
            let name = obj.name_any();
            if base_name.as_deref() == Some(name.as_str()) {
                if let Some(flags) = parse_features(&obj, "features.yaml") {
                    feature_flags.set_base(flags);
                }
            } else if env_name.as_deref() == Some(name.as_str()) {
                if let Some(flags) = parse_features(&obj, "features.yaml") {
                    feature_flags.set_env(flags);
                }
            } else if name == filter_name {
                if let Some(map) = parse_legacy_filters(&obj, &filter_key) {
                    let new_sources: HashSet<String> = map.keys().cloned().collect();
                    for stale in known_filter_sources.difference(&new_sources) {
                        registry.delete_filter(FILTER_CRD_NAME, stale);
                    }
                    for (source, filter) in map {
                        registry.upsert_filter(FILTER_CRD_NAME, &source, filter);
                    }
                    known_filter_sources = new_sources;
                }
            }
        },
        move |obj| {
            info!(configmap = %obj.name_any(), "watched configmap deleted, retaining last-known-good");
        },
    )
    .await;
}
