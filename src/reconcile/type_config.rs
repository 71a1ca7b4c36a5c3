//! Reconciler for the `ObservationTypeConfig` CRD (spec.md §4.C step 4,
//! §6).

use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

use crate::config::type_config::TypeConfig;
use crate::config::Registry;
use crate::crd::{ObservationTypeConfig, ObservationTypeConfigSpec};

fn compile(spec: ObservationTypeConfigSpec) -> TypeConfig {
    TypeConfig {
        event_type: spec.event_type,
        domain: spec.domain,
        priority: spec.priority,
        field_mapping: spec.field_mapping,
        templates: spec.templates.unwrap_or_default(),
        resource_extraction: spec.resource_extraction,
    }
}

pub async fn run(client: Client, registry: Registry, namespace: Option<String>, token: CancellationToken) {
    let api: Api<ObservationTypeConfig> = match namespace {
        Some(ns) => Api::namespaced(client, &ns),
        None => Api::all(client),
    };

    let delete_registry = registry.clone();
    super::run_watcher(
        api,
        token,
        move |obj| {
            info!(crd = %obj.name_any(), event_type = %obj.spec.event_type, "type config applied");
            registry.upsert_type_config(compile(obj.spec.clone()));
        },
        move |obj| {
            delete_registry.delete_type_config(&obj.spec.event_type);
        },
    )
    .await;
}
