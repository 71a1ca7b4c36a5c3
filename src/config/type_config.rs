//! `TypeConfig`: the compiled form of one `ObservationTypeConfig` CRD
//! (spec.md §4.C step 4, §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zen_core::Severity;

use super::ingester::FieldMapping;
use schemars::JsonSchema;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct K8sOwnerExtraction {
    pub api_version_field: String,
    pub kind_field: String,
    pub name_field: String,
    #[serde(default)]
    pub namespace_field: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ManualResourceRef {
    #[serde(default)]
    pub group: Option<String>,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// How `Observation.resource_ref` is populated, one of the three
/// strategies named in spec.md §4.C step 4.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResourceExtraction {
    Jsonpath { jsonpath: String },
    K8sOwner(K8sOwnerExtraction),
    Manual(ManualResourceRef),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Templates {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeConfig {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub priority: HashMap<Severity, f64>,
    #[serde(default)]
    pub field_mapping: Vec<FieldMapping>,
    #[serde(default)]
    pub templates: Templates,
    #[serde(default)]
    pub resource_extraction: Option<ResourceExtraction>,
}

impl TypeConfig {
    pub fn priority_for(&self, severity: Severity) -> Option<f64> {
        self.priority.get(&severity).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_lookup_by_severity() {
        let cfg = TypeConfig {
            event_type: "vulnerability".to_string(),
            domain: None,
            priority: HashMap::from([(Severity::Critical, 0.99)]),
            field_mapping: vec![],
            templates: Templates::default(),
            resource_extraction: None,
        };
        assert_eq!(cfg.priority_for(Severity::Critical), Some(0.99));
        assert_eq!(cfg.priority_for(Severity::Low), None);
    }
}
