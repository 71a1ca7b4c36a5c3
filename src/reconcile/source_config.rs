//! Reconciler for the `ObservationSourceConfig` CRD (spec.md §4.H, §6).
//!
//! `ttl.min`/`ttl.max` and `processing.autoOptimize` are parsed into the
//! typed spec by [`crate::crd`] but never reach the Registry — see
//! SPEC_FULL.md's resolution of both open questions. `ttl.default` does
//! reach the Registry and is stamped onto every `Observation` normalized
//! for the source; only the min/max clamp is left unapplied.

use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

use crate::config::dedup::DedupConfig;
use crate::config::rate_limit::RateLimitConfig;
use crate::config::{defaults, Registry};
use crate::crd::{
    ObservationSourceConfig, ObservationSourceConfigSpec, SourceConfigDedupBlock, SourceConfigRateLimitBlock, TtlBlock,
};

fn compile_dedup(block: &SourceConfigDedupBlock) -> Option<DedupConfig> {
    let window = block
        .window
        .as_deref()
        .and_then(|s| humantime::parse_duration(s).ok())
        .unwrap_or(defaults::DEFAULT_DEDUP_WINDOW);
    Some(DedupConfig {
        enabled: true,
        window,
        strategy: block.strategy.unwrap_or_default(),
        fields: block.fields.clone(),
        max_events_per_window: defaults::DEFAULT_DEDUP_MAX_SIZE,
    })
}

fn compile_rate_limit(block: &SourceConfigRateLimitBlock) -> Option<RateLimitConfig> {
    match (block.max_per_minute, block.burst) {
        (None, None) => None,
        (max_per_minute, burst) => Some(RateLimitConfig {
            max_per_minute: max_per_minute.unwrap_or(defaults::DEFAULT_RATE_LIMIT.max_per_minute),
            burst: burst.unwrap_or(defaults::DEFAULT_RATE_LIMIT.burst),
        }),
    }
}

fn compile_ttl_default(block: &TtlBlock) -> Option<std::time::Duration> {
    block.default.as_deref().and_then(|s| humantime::parse_duration(s).ok())
}

fn apply(registry: &Registry, crd_name: &str, spec: &ObservationSourceConfigSpec) {
    if let Some(dedup_block) = &spec.dedup {
        if let Some(dedup) = compile_dedup(dedup_block) {
            registry.upsert_dedup(crd_name, &spec.source, dedup);
        }
    }
    if let Some(rate_limit_block) = &spec.rate_limit {
        if let Some(rate_limit) = compile_rate_limit(rate_limit_block) {
            registry.upsert_rate_limit(&spec.source, rate_limit);
        }
    }
    if let Some(ttl_block) = &spec.ttl {
        if let Some(ttl) = compile_ttl_default(ttl_block) {
            registry.upsert_ttl(&spec.source, ttl);
        }
    }
}

pub async fn run(client: Client, registry: Registry, namespace: Option<String>, token: CancellationToken) {
    let api: Api<ObservationSourceConfig> = match namespace {
        Some(ns) => Api::namespaced(client, &ns),
        None => Api::all(client),
    };

    let delete_registry = registry.clone();
    super::run_watcher(
        api,
        token,
        move |obj| {
            let crd_name = obj.name_any();
            info!(crd = %crd_name, source = %obj.spec.source, "source config applied");
            apply(&registry, &crd_name, &obj.spec);
        },
        move |obj| {
            let crd_name = obj.name_any();
            delete_registry.delete_dedup(&crd_name, &obj.spec.source);
            delete_registry.delete_rate_limit(&obj.spec.source);
            delete_registry.delete_ttl(&obj.spec.source);
        },
    )
    .await;
}
