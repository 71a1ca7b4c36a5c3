//! RawEvent -> Observation (spec.md §4.C). Stateless and pure given the
//! `SourceSnapshot` passed in; the worker loop around it only owns I/O
//! (channel recv/send), never business logic.

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ingester::{FieldMapping, Transform};
use crate::config::type_config::{K8sOwnerExtraction, ManualResourceRef, ResourceExtraction};
use crate::config::{Registry, SourceSnapshot};
use crate::internal_events::{InternalEvent, ObservationDropped, ObservationNormalized};
use zen_core::{Observation, RawEvent, ResourceRef, Severity, Value};

fn apply_transform(value: &Value, transform: &Transform) -> Value {
    match transform {
        Transform::Lower => Value::String(value.to_string().to_lowercase()),
        Transform::Upper => Value::String(value.to_string().to_uppercase()),
        Transform::Truncate { n } => {
            let s = value.to_string();
            Value::String(s.chars().take(*n).collect())
        }
    }
}

fn apply_field_mappings(payload: &Value, mappings: &[FieldMapping]) -> IndexMap<String, Value> {
    let mut details = IndexMap::new();
    for mapping in mappings {
        let Some(value) = payload.get_path(&mapping.from) else {
            continue;
        };
        let value = match &mapping.transform {
            Some(transform) => apply_transform(value, transform),
            None => value.clone(),
        };
        details.insert(mapping.to.clone(), value);
    }
    details
}

fn resolve_severity(payload: &Value, mappings: &[FieldMapping]) -> Severity {
    let from_path = mappings
        .iter()
        .find(|m| m.to == "severity")
        .map(|m| m.from.as_str())
        .unwrap_or("severity");
    payload
        .get_path(from_path)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Severity>().ok())
        .unwrap_or(Severity::Info)
}

fn resolve_event_type(payload: &Value, configured: &Option<String>) -> String {
    if let Some(t) = configured {
        return t.clone();
    }
    payload
        .get_path("event_type")
        .or_else(|| payload.get_path("type"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn extract_resource_ref(
    payload: &Value,
    origin: &zen_core::OriginMeta,
    strategy: Option<&ResourceExtraction>,
) -> ResourceRef {
    match strategy {
        Some(ResourceExtraction::Jsonpath { jsonpath }) => payload
            .get_path(jsonpath)
            .and_then(Value::as_object)
            .map(|obj| ResourceRef {
                group: obj.get("group").and_then(Value::as_str).map(str::to_string),
                kind: obj.get("kind").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: obj.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                namespace: obj.get("namespace").and_then(Value::as_str).map(str::to_string),
            })
            .unwrap_or_else(|| fallback_resource_ref(origin)),
        Some(ResourceExtraction::K8sOwner(K8sOwnerExtraction {
            api_version_field,
            kind_field,
            name_field,
            namespace_field,
        })) => ResourceRef {
            group: payload
                .get_path(api_version_field)
                .and_then(Value::as_str)
                .map(|v| v.split_once('/').map(|(g, _)| g.to_string()).unwrap_or_default()),
            kind: payload.get_path(kind_field).and_then(Value::as_str).unwrap_or_default().to_string(),
            name: payload.get_path(name_field).and_then(Value::as_str).unwrap_or_default().to_string(),
            namespace: namespace_field
                .as_deref()
                .and_then(|p| payload.get_path(p))
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        Some(ResourceExtraction::Manual(ManualResourceRef {
            group,
            kind,
            name,
            namespace,
        })) => ResourceRef {
            group: group.clone(),
            kind: kind.clone(),
            name: name.clone(),
            namespace: namespace.clone(),
        },
        None => fallback_resource_ref(origin),
    }
}

fn fallback_resource_ref(origin: &zen_core::OriginMeta) -> ResourceRef {
    origin
        .resource
        .clone()
        .or_else(|| origin.pod.clone())
        .unwrap_or_default()
}

fn resolve_detected_at(payload: &Value, received_at: std::time::SystemTime) -> chrono::DateTime<chrono::Utc> {
    payload
        .get_path("timestamp")
        .or_else(|| payload.get_path("detected_at"))
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|| chrono::DateTime::<chrono::Utc>::from(received_at))
}

/// Pure normalization step (spec.md §4.C steps 1-5). `registry` is
/// consulted only for `resolve_priority`'s source/type fallback tables —
/// everything else comes from `snapshot`.
pub fn normalize(raw: RawEvent, snapshot: &SourceSnapshot, registry: &Registry) -> Observation {
    let normalization = &snapshot.ingester.normalization;
    let details = apply_field_mappings(&raw.payload, &normalization.field_mapping);
    let severity = resolve_severity(&raw.payload, &normalization.field_mapping);
    let event_type = resolve_event_type(&raw.payload, &normalization.event_type);
    let priority = registry.resolve_priority(&raw.source_id, &event_type, severity);

    let type_config = registry.type_config(&event_type);
    let resource_ref = extract_resource_ref(
        &raw.payload,
        &raw.origin_meta,
        type_config.as_ref().and_then(|t| t.resource_extraction.as_ref()),
    );

    let fields = snapshot.dedup.fields.clone();
    let fingerprint = zen_core::fingerprint::compute(&raw.source_id, &event_type, &resource_ref, &details, &fields);

    let message = raw
        .payload
        .get_path("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Observation {
        source: raw.source_id.clone(),
        category: normalization
            .domain
            .clone()
            .or_else(|| type_config.as_ref().and_then(|t| t.domain.clone()))
            .unwrap_or_else(|| "uncategorized".to_string()),
        severity,
        event_type,
        message,
        detected_at: resolve_detected_at(&raw.payload, raw.received_at),
        resource_ref,
        details,
        priority,
        fingerprint,
        ttl: snapshot.ttl,
    }
}

pub async fn run(
    mut rx: mpsc::Receiver<RawEvent>,
    tx: mpsc::Sender<Observation>,
    registry: Registry,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("normalizer stopping");
                return;
            }
            raw = rx.recv() => {
                let Some(raw) = raw else {
                    info!("normalizer input channel closed");
                    return;
                };
                let start = std::time::Instant::now();
                let snapshot = registry.get(&raw.source_id);
                if snapshot.ingester.destinations.is_empty() {
                    ObservationDropped { source: &raw.source_id, reason: "no_ingester_configured" }.emit();
                    continue;
                }
                let source = raw.source_id.clone();
                let observation = normalize(raw, &snapshot, &registry);
                ObservationNormalized { source: &source, duration: start.elapsed() }.emit();

                if tx.send(observation).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ingester::*;
    use crate::config::{DedupConfig, FilterConfig, RateLimitConfig};
    use std::sync::Arc;

    fn snapshot_for(mappings: Vec<FieldMapping>) -> SourceSnapshot {
        SourceSnapshot {
            ingester: Arc::new(IngesterConfig {
                source: "trivy".to_string(),
                kind: IngesterKind::Events(EventsBlock {
                    namespaces: vec![],
                    involved_object_kinds: vec![],
                }),
                normalization: NormalizationConfig {
                    domain: Some("vulnerability".to_string()),
                    event_type: Some("vulnerability".to_string()),
                    priority: Default::default(),
                    field_mapping: mappings,
                },
                filter: FilterConfig::default(),
                dedup: None,
                rate_limit: None,
                destinations: vec![Destination {
                    kind: DestinationKind::Crd,
                    group: "zen.kube-zen.io".to_string(),
                    version: "v1".to_string(),
                    resource: "observations".to_string(),
                }],
                order: ProcessingOrder::default(),
            }),
            filter: FilterConfig::default(),
            dedup: DedupConfig::default(),
            rate_limit: RateLimitConfig::new(100, 200),
            ttl: None,
        }
    }

    #[test]
    fn field_mapping_reads_json_path_and_transforms() {
        let payload = Value::from(serde_json::json!({"cve": {"id": "CVE-2024-1"}}));
        let mappings = vec![FieldMapping {
            from: "cve.id".to_string(),
            to: "cve_id".to_string(),
            transform: Some(Transform::Lower),
        }];
        let details = apply_field_mappings(&payload, &mappings);
        assert_eq!(details.get("cve_id").and_then(Value::as_str), Some("cve-2024-1"));
    }

    #[test]
    fn unknown_severity_falls_back_to_info() {
        let payload = Value::from(serde_json::json!({"severity": "banana"}));
        assert_eq!(resolve_severity(&payload, &[]), Severity::Info);
    }

    #[test]
    fn normalize_stamps_priority_and_fingerprint() {
        let raw = RawEvent::new("trivy", Value::from(serde_json::json!({"severity": "critical"})));
        let snapshot = snapshot_for(vec![]);
        let registry = Registry::new();
        let obs = normalize(raw, &snapshot, &registry);
        assert_eq!(obs.severity, Severity::Critical);
        assert!(!obs.fingerprint.is_empty());
        assert_eq!(obs.priority, 0.95);
    }

    #[test]
    fn normalize_stamps_ttl_from_snapshot() {
        let raw = RawEvent::new("trivy", Value::from(serde_json::json!({"severity": "low"})));
        let mut snapshot = snapshot_for(vec![]);
        snapshot.ttl = Some(std::time::Duration::from_secs(3600));
        let registry = Registry::new();
        let obs = normalize(raw, &snapshot, &registry);
        assert_eq!(obs.ttl, Some(std::time::Duration::from_secs(3600)));
    }
}
