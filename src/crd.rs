//! The five CRD kinds the config reconcilers watch (spec.md §6). Each
//! `spec` mirrors only the fields the spec enumerates; unrecognized
//! fields are ignored by `kube`'s/`serde`'s default deny-nothing
//! deserialization, giving forward compatibility for free.

use std::collections::HashMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ingester::{
    Destination, FieldMapping, IngesterKind, NormalizationConfig, ProcessingOrder,
};

fn default_api_group() -> String {
    std::env::var("ZEN_API_GROUP").unwrap_or_else(|_| "zen.kube-zen.io".to_string())
}

/// `Ingester`: declares a source, its adapter kind, and where surviving
/// observations are written (spec.md §6).
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "zen.kube-zen.io",
    version = "v1",
    kind = "Ingester",
    plural = "ingesters",
    namespaced,
    status = "IngesterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IngesterSpec {
    pub source: String,
    #[serde(flatten)]
    pub ingester: IngesterKind,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub processing: Option<ProcessingBlock>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingBlock {
    #[serde(default)]
    pub order: ProcessingOrder,
    #[serde(default)]
    pub filter: Option<crate::config::filter::FilterConfig>,
    #[serde(default)]
    pub dedup: Option<crate::config::dedup::DedupConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct IngesterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `ObservationFilter`: one filter predicate set targeting a source,
/// merged with any sibling filters for the same source (spec.md §4.A,
/// §6).
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "zen.kube-zen.io",
    version = "v1",
    kind = "ObservationFilter",
    plural = "observationfilters",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObservationFilterSpec {
    pub target_source: String,
    #[serde(default)]
    pub min_severity: Option<zen_core::Severity>,
    #[serde(default)]
    pub include_severity: Vec<zen_core::Severity>,
    #[serde(default)]
    pub include_event_types: Vec<String>,
    #[serde(default)]
    pub exclude_event_types: Vec<String>,
    #[serde(default)]
    pub include_namespaces: Vec<String>,
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,
    #[serde(default)]
    pub include_kinds: Vec<String>,
    #[serde(default)]
    pub exclude_kinds: Vec<String>,
    #[serde(default)]
    pub include_categories: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    #[serde(default)]
    pub exclude_rules: Vec<String>,
    /// Accepted for forward compatibility with older revisions that
    /// distinguish `ignoreKinds` from `excludeKinds`; folded into the
    /// same exclude set at compile time.
    #[serde(default)]
    pub ignore_kinds: Vec<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// `ObservationDedupConfig`: the narrow, older dedup-only CRD (spec.md
/// §6). `ObservationSourceConfig.dedup` supersedes it for sources that
/// have both; both compile into the same [`crate::config::DedupConfig`]
/// and merge the same way.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "zen.kube-zen.io",
    version = "v1",
    kind = "ObservationDedupConfig",
    plural = "observationdedupconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObservationDedupConfigSpec {
    pub target_source: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub window_seconds: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfigDedupBlock {
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub strategy: Option<crate::config::dedup::DedupStrategy>,
    #[serde(default)]
    pub fields: Vec<String>,
    /// Parsed but not applied by the default pipeline path; see
    /// SPEC_FULL.md's resolution of the TTL open question for the same
    /// parsed-but-inert treatment of `adaptive`/`minChange`/`learningRate`.
    #[serde(default)]
    pub adaptive: bool,
    #[serde(default)]
    pub min_change: Option<f64>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfigFilterBlock {
    #[serde(default)]
    pub min_priority: Option<f64>,
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,
    #[serde(default)]
    pub include_types: Vec<String>,
    #[serde(default)]
    pub adaptive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TtlBlock {
    #[serde(default)]
    pub default: Option<String>,
    /// Parsed and stored on the compiled `SourceConfig`; not applied by
    /// the default pipeline path unless a caller opts into
    /// `SourceConfig::clamp_ttl` (SPEC_FULL.md's resolution of the open
    /// question).
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfigRateLimitBlock {
    #[serde(default)]
    pub max_per_minute: Option<u32>,
    #[serde(default)]
    pub burst: Option<u32>,
    #[serde(default)]
    pub adaptive: bool,
    #[serde(default)]
    pub cooldown_period: Option<String>,
    #[serde(default)]
    pub targets: HashMap<zen_core::Severity, u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfigProcessingBlock {
    #[serde(default)]
    pub order: Option<ProcessingOrder>,
    /// Advisory only — parsed but inert for the core pipeline
    /// (SPEC_FULL.md's resolution of the `autoOptimize` open question).
    #[serde(default)]
    pub auto_optimize: bool,
    #[serde(default)]
    pub analysis_interval: Option<String>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfigThresholds {
    #[serde(default)]
    pub observations_per_minute: Option<f64>,
    #[serde(default)]
    pub low_severity_percent: Option<f64>,
    #[serde(default)]
    pub dedup_effectiveness: Option<f64>,
}

/// `ObservationSourceConfig`: the richest per-source tuning CRD
/// (spec.md §6). Several of its fields are accepted for forward
/// compatibility and parsed but intentionally inert — see the block-level
/// doc comments.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "zen.kube-zen.io",
    version = "v1",
    kind = "ObservationSourceConfig",
    plural = "observationsourceconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObservationSourceConfigSpec {
    pub source: String,
    #[serde(default)]
    pub dedup: Option<SourceConfigDedupBlock>,
    #[serde(default)]
    pub filter: Option<SourceConfigFilterBlock>,
    #[serde(default)]
    pub ttl: Option<TtlBlock>,
    #[serde(default)]
    pub rate_limit: Option<SourceConfigRateLimitBlock>,
    #[serde(default)]
    pub processing: Option<SourceConfigProcessingBlock>,
    #[serde(default)]
    pub thresholds: Option<SourceConfigThresholds>,
}

/// `ObservationTypeConfig`: per-event-type normalization rules
/// (spec.md §4.C step 4, §6).
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "zen.kube-zen.io",
    version = "v1",
    kind = "ObservationTypeConfig",
    plural = "observationtypeconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObservationTypeConfigSpec {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub priority: HashMap<zen_core::Severity, f64>,
    #[serde(default)]
    pub field_mapping: Vec<FieldMapping>,
    #[serde(default)]
    pub templates: Option<crate::config::type_config::Templates>,
    #[serde(default)]
    pub resource_extraction: Option<crate::config::type_config::ResourceExtraction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingester_spec_round_trips_through_json() {
        let raw = serde_json::json!({
            "source": "trivy",
            "kind": "events",
            "namespaces": ["default"],
            "involvedObjectKinds": [],
            "destinations": [
                {"type": "crd", "group": "zen.kube-zen.io", "version": "v1", "resource": "observations"}
            ],
        });
        let spec: IngesterSpec = serde_json::from_value(raw).expect("deserializes");
        assert_eq!(spec.source, "trivy");
        assert_eq!(spec.destinations.len(), 1);
    }

    #[test]
    fn default_api_group_falls_back_when_env_unset() {
        std::env::remove_var("ZEN_API_GROUP");
        assert_eq!(default_api_group(), "zen.kube-zen.io");
    }
}
