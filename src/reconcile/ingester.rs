//! Reconciler for the `Ingester` CRD (spec.md §4.H, §6).

use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

use crate::config::ingester::{Destination, IngesterConfig};
use crate::config::Registry;
use crate::crd::{Ingester, IngesterSpec};

fn compile(spec: IngesterSpec) -> IngesterConfig {
    IngesterConfig {
        source: spec.source,
        kind: spec.ingester,
        normalization: spec.normalization,
        filter: spec
            .processing
            .as_ref()
            .and_then(|p| p.filter.clone())
            .unwrap_or_default(),
        dedup: spec.processing.as_ref().and_then(|p| p.dedup.clone()),
        rate_limit: None,
        destinations: spec.destinations,
        order: spec.processing.map(|p| p.order).unwrap_or_default(),
    }
}

fn validate(config: &IngesterConfig) -> Result<(), String> {
    config.validate().map_err(|e| e.to_string())?;
    if config.destinations.iter().any(|d: &Destination| d.resource.is_empty()) {
        return Err(format!("ingester {}: destination resource must not be empty", config.source));
    }
    Ok(())
}

pub async fn run(client: Client, registry: Registry, namespace: Option<String>, token: CancellationToken) {
    let api: Api<Ingester> = match namespace {
        Some(ns) => Api::namespaced(client, &ns),
        None => Api::all(client),
    };

    let delete_registry = registry.clone();
    super::run_watcher(
        api,
        token,
        move |obj| {
            let name = obj.name_any();
            let config = compile(obj.spec.clone());
            match validate(&config) {
                Ok(()) => {
                    info!(crd = %name, source = %config.source, "ingester config applied");
                    registry.upsert_ingester(&name, config);
                }
                Err(reason) => {
                    warn!(crd = %name, %reason, "rejecting invalid Ingester, retaining last-known-good");
                    metrics::counter!("config_validation_errors_total", "kind" => "Ingester", "reason" => reason).increment(1);
                }
            }
        },
        move |obj| {
            let name = obj.name_any();
            info!(crd = %name, source = %obj.spec.source, "ingester deleted");
            delete_registry.delete_ingester(&name, &obj.spec.source);
        },
    )
    .await;
}
