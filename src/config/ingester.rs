//! `IngesterConfig`: the compiled form of one `Ingester` CRD (spec.md §3,
//! §6).

use serde::{Deserialize, Serialize};

use super::dedup::DedupConfig;
use super::filter::FilterConfig;
use super::rate_limit::RateLimitConfig;
use crate::error::{Error, StartupSnafu};
use schemars::JsonSchema;

/// Which order Filter and Dedup run in for a given source. Only affects
/// observations that *would* pass both stages regardless — P8 requires
/// the produced `Observation` to be identical under either order for
/// those (spec.md §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOrder {
    FilterFirst,
    DedupFirst,
}

impl Default for ProcessingOrder {
    fn default() -> Self {
        ProcessingOrder::FilterFirst
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InformerBlock {
    pub group: String,
    pub version: String,
    pub resource: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub label_selector: Option<String>,
    #[serde(default = "default_resync_seconds")]
    pub resync_seconds: u64,
}

fn default_resync_seconds() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogPattern {
    pub regex: String,
    pub event_type: String,
    #[serde(default)]
    pub priority: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogsBlock {
    pub pod_selector: String,
    #[serde(default)]
    pub container: Option<String>,
    pub patterns: Vec<LogPattern>,
    #[serde(default = "default_since_seconds")]
    pub since_seconds: u64,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

fn default_since_seconds() -> u64 {
    0
}

fn default_poll_interval_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAuthType {
    None,
    Hmac,
}

impl Default for WebhookAuthType {
    fn default() -> Self {
        WebhookAuthType::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAuth {
    #[serde(rename = "type", default)]
    pub kind: WebhookAuthType,
    /// `namespace/name` of the Secret holding the HMAC shared secret.
    #[serde(default)]
    pub secret_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBlock {
    pub path: String,
    pub port: u16,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub auth: WebhookAuth,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

fn default_buffer_size() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventsBlock {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub involved_object_kinds: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngesterKind {
    Informer(InformerBlock),
    Logs(LogsBlock),
    Webhook(WebhookBlock),
    Events(EventsBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Crd,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(rename = "type")]
    pub kind: DestinationKind,
    pub group: String,
    pub version: String,
    pub resource: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub transform: Option<Transform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Transform {
    Lower,
    Upper,
    Truncate { n: usize },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationConfig {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub priority: std::collections::HashMap<zen_core::Severity, f64>,
    #[serde(default)]
    pub field_mapping: Vec<FieldMapping>,
}

/// Compiled form of a single `Ingester` CRD. One per logical source; the
/// Registry is keyed on `source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngesterConfig {
    pub source: String,
    pub kind: IngesterKind,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub dedup: Option<DedupConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub order: ProcessingOrder,
}

impl IngesterConfig {
    /// Invariants from spec.md §3: `source` non-empty (uniqueness is
    /// enforced by the Registry, not here), at least one destination, and
    /// the kind-specific block is structurally present (guaranteed by the
    /// tagged-enum deserialization itself, so only the destinations
    /// cardinality needs a runtime check).
    pub fn validate(&self) -> Result<(), Error> {
        if self.source.trim().is_empty() {
            return StartupSnafu {
                message: "ingester config: source must not be empty".to_string(),
            }
            .fail();
        }
        if self.destinations.is_empty() {
            return StartupSnafu {
                message: format!("ingester config {}: at least one destination is required", self.source),
            }
            .fail();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(destinations: Vec<Destination>) -> IngesterConfig {
        IngesterConfig {
            source: "trivy".to_string(),
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

    #[test]
    fn rejects_empty_destinations() {
        assert!(base(vec![]).validate().is_err());
    }

    #[test]
    fn accepts_one_destination() {
        let cfg = base(vec![Destination {
            kind: DestinationKind::Crd,
            group: "zen.kube-zen.io".to_string(),
            version: "v1".to_string(),
            resource: "observations".to_string(),
        }]);
        assert!(cfg.validate().is_ok());
    }
}
