//! Reconciler for the `ObservationDedupConfig` CRD (spec.md §4.H, §6).

use std::time::Duration;

use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

use crate::config::dedup::{DedupConfig, DedupStrategy};
use crate::config::{defaults, Registry};
use crate::crd::{ObservationDedupConfig, ObservationDedupConfigSpec};

fn compile(spec: ObservationDedupConfigSpec) -> DedupConfig {
    DedupConfig {
        enabled: spec.enabled,
        window: Duration::from_secs(spec.window_seconds),
        strategy: DedupStrategy::Fingerprint,
        fields: Vec::new(),
        max_events_per_window: defaults::DEFAULT_DEDUP_MAX_SIZE,
    }
}

pub async fn run(client: Client, registry: Registry, namespace: Option<String>, token: CancellationToken) {
    let api: Api<ObservationDedupConfig> = match namespace {
        Some(ns) => Api::namespaced(client, &ns),
        None => Api::all(client),
    };

    let delete_registry = registry.clone();
    super::run_watcher(
        api,
        token,
        move |obj| {
            if obj.spec.window_seconds == 0 {
                warn!(crd = %obj.name_any(), "rejecting ObservationDedupConfig with windowSeconds=0, retaining last-known-good");
                metrics::counter!(
                    "config_validation_errors_total",
                    "kind" => "ObservationDedupConfig",
                    "reason" => "window_seconds must be positive"
                )
                .increment(1);
                return;
            }
            let crd_name = obj.name_any();
            let source = obj.spec.target_source.clone();
            info!(crd = %crd_name, %source, "dedup config applied");
            registry.upsert_dedup(&crd_name, &source, compile(obj.spec.clone()));
        },
        move |obj| {
            delete_registry.delete_dedup(&obj.name_any(), &obj.spec.target_source);
        },
    )
    .await;
}
