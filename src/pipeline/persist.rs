//! Persister (spec.md §4.G): translates an `Observation` into one
//! unstructured object per configured destination, with retry and
//! conflict handling. Runs as a bounded worker pool; the channel feeding
//! it is the pipeline's designated backpressure point (overflow policy:
//! block, spec.md §5), so a slow API server slows the whole pipeline
//! instead of silently dropping observations.

use std::time::Duration;

use kube::api::{DynamicObject, GroupVersionKind, ObjectMeta, PostParams};
use kube::core::ApiResource;
use kube::{Api, Client};
use rand::Rng;

use crate::config::ingester::Destination;
use crate::internal_events::{InternalEvent, ObservationPersisted, PersistFailed, PersistRetried};
use zen_core::Observation;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_MIN: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(10);
const JITTER_FRACTION: f64 = 0.2;

fn next_backoff(attempt: u32) -> Duration {
    let base = BACKOFF_MIN.saturating_mul(1u32 << attempt.min(20)).min(BACKOFF_MAX);
    let jitter_range = base.as_secs_f64() * JITTER_FRACTION;
    let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((base.as_secs_f64() + jitter).max(0.0))
}

fn build_object(obs: &Observation, destination: &Destination) -> DynamicObject {
    let fingerprint_hex: String = obs.fingerprint.iter().map(|b| format!("{b:02x}")).collect();
    let mut annotations = std::collections::BTreeMap::new();
    annotations.insert("zen.kube-zen.io/fingerprint".to_string(), fingerprint_hex);

    let mut labels = std::collections::BTreeMap::new();
    labels.insert("zen.kube-zen.io/source".to_string(), obs.source.clone());
    labels.insert("zen.kube-zen.io/severity".to_string(), obs.severity.to_string().to_lowercase());
    labels.insert("zen.kube-zen.io/category".to_string(), obs.category.clone());
    if let Some(ttl) = obs.ttl {
        labels.insert(
            "zen.kube-zen.io/ttl".to_string(),
            humantime::format_duration(ttl).to_string(),
        );
    }

    let namespace = obs.resource_ref.namespace.clone();
    let spec = serde_json::json!({
        "source": obs.source,
        "category": obs.category,
        "severity": obs.severity,
        "eventType": obs.event_type,
        "message": obs.message,
        "detectedAt": obs.detected_at,
        "resource": {
            "apiVersion": obs.resource_ref.group.clone().map(|g| format!("{g}/v1")).unwrap_or_else(|| "v1".to_string()),
            "kind": obs.resource_ref.kind,
            "name": obs.resource_ref.name,
            "namespace": obs.resource_ref.namespace,
        },
        "details": obs.details,
    });

    let gvk = GroupVersionKind {
        group: destination.group.clone(),
        version: destination.version.clone(),
        kind: destination.resource.clone(),
    };
    let ar = ApiResource::from_gvk(&gvk);

    let mut obj = DynamicObject::new(&format!("{}-", obs.source), &ar);
    obj.metadata = ObjectMeta {
        generate_name: Some(format!("{}-", obs.source.to_lowercase())),
        namespace,
        annotations: Some(annotations),
        labels: Some(labels),
        ..Default::default()
    };
    obj.data = serde_json::json!({ "spec": spec });
    obj
}

fn api_for(client: &Client, destination: &Destination, namespace: Option<&str>) -> Api<DynamicObject> {
    let gvk = GroupVersionKind {
        group: destination.group.clone(),
        version: destination.version.clone(),
        kind: destination.resource.clone(),
    };
    let ar = ApiResource::from_gvk(&gvk);
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    }
}

/// Creates one destination object, retrying transient failures with
/// exponential backoff. A 409 (another replica already wrote an
/// equivalent object) is treated as success; any other 4xx is permanent.
async fn persist_one(client: &Client, obs: &Observation, destination: &Destination) {
    let api = api_for(client, destination, obs.resource_ref.namespace.as_deref());
    let destination_label = format!("{}/{}/{}", destination.group, destination.version, destination.resource);
    let start = std::time::Instant::now();

    for attempt in 1..=MAX_ATTEMPTS {
        let obj = build_object(obs, destination);
        match api.create(&PostParams::default(), &obj).await {
            Ok(_) => {
                ObservationPersisted {
                    destination: &destination_label,
                    duration: start.elapsed(),
                }
                .emit();
                return;
            }
            Err(kube::Error::Api(err)) if err.code == 409 => {
                ObservationPersisted {
                    destination: &destination_label,
                    duration: start.elapsed(),
                }
                .emit();
                return;
            }
            Err(kube::Error::Api(err)) if (400..500).contains(&err.code) => {
                PersistFailed {
                    destination: &destination_label,
                    error: err.message,
                }
                .emit();
                return;
            }
            Err(error) => {
                if attempt == MAX_ATTEMPTS {
                    PersistFailed {
                        destination: &destination_label,
                        error: error.to_string(),
                    }
                    .emit();
                    return;
                }
                PersistRetried {
                    destination: &destination_label,
                    attempt,
                    error: error.to_string(),
                }
                .emit();
                tokio::time::sleep(next_backoff(attempt)).await;
            }
        }
    }
}

/// Persists one observation to every one of its configured destinations
/// (spec.md §4.G: an observation may fan out to more than one CRD/ConfigMap
/// destination).
pub async fn persist(client: &Client, obs: Observation, destinations: &[Destination]) {
    for destination in destinations {
        persist_one(client, &obs, destination).await;
    }
}
