//! Reconciler for the `ObservationFilter` CRD (spec.md §4.H, §6).

use std::collections::HashSet;

use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

use crate::config::filter::FilterConfig;
use crate::config::Registry;
use crate::crd::{ObservationFilter, ObservationFilterSpec};

fn compile(spec: ObservationFilterSpec) -> FilterConfig {
    let mut exclude_kinds: HashSet<String> = spec.exclude_kinds.into_iter().collect();
    exclude_kinds.extend(spec.ignore_kinds);

    FilterConfig {
        enabled: spec.enabled,
        min_severity: spec.min_severity,
        include_severities: spec.include_severity.into_iter().collect(),
        include_event_types: spec.include_event_types.into_iter().collect(),
        exclude_event_types: spec.exclude_event_types.into_iter().collect(),
        include_namespaces: spec.include_namespaces.into_iter().collect(),
        exclude_namespaces: spec.exclude_namespaces.into_iter().collect(),
        include_kinds: spec.include_kinds.into_iter().collect(),
        exclude_kinds,
        include_categories: spec.include_categories.into_iter().collect(),
        exclude_categories: spec.exclude_categories.into_iter().collect(),
        exclude_rules: spec.exclude_rules.into_iter().collect(),
        min_priority: None,
        expression: None,
    }
}

pub async fn run(client: Client, registry: Registry, namespace: Option<String>, token: CancellationToken) {
    let api: Api<ObservationFilter> = match namespace {
        Some(ns) => Api::namespaced(client, &ns),
        None => Api::all(client),
    };

    let delete_registry = registry.clone();
    super::run_watcher(
        api,
        token,
        move |obj| {
            let crd_name = obj.name_any();
            let source = obj.spec.target_source.clone();
            let filter = compile(obj.spec.clone());
            info!(crd = %crd_name, %source, "observation filter applied");
            registry.upsert_filter(&crd_name, &source, filter);
        },
        move |obj| {
            let crd_name = obj.name_any();
            delete_registry.delete_filter(&crd_name, &obj.spec.target_source);
        },
    )
    .await;
}
