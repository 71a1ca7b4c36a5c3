//! `FeatureFlags`: compiled form of the `features.yaml` ConfigMap key
//! (spec.md §6), published through the same Registry subscription
//! mechanism as CRD-sourced config (see SPEC_FULL.md's supplemented
//! features section).

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolFlags {
    pub persister_workers: Option<usize>,
    pub dedup_workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBatchingFlags {
    pub enabled: bool,
    pub max_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientFlags {
    pub timeout_seconds: Option<u64>,
    pub max_idle_connections: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceFilteringFlags {
    pub allowed_namespaces: Vec<String>,
    pub denied_namespaces: Vec<String>,
}

/// The four sections of `features.yaml` (spec.md §6). Overlaid: `base`
/// loaded from `BASE_CONFIG_NAME`, then `env` from `ENV_CONFIG_NAME`
/// merged on top field-by-field (env wins when present).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub worker_pool: WorkerPoolFlags,
    pub event_batching: EventBatchingFlags,
    pub http_client: HttpClientFlags,
    pub namespace_filtering: NamespaceFilteringFlags,
}

impl FeatureFlags {
    /// Overlay `env` onto `base`; `Option` fields in `env` win when
    /// `Some`, list fields in `env` replace `base`'s wholesale when
    /// non-empty.
    pub fn overlay(base: &FeatureFlags, env: &FeatureFlags) -> FeatureFlags {
        FeatureFlags {
            worker_pool: WorkerPoolFlags {
                persister_workers: env.worker_pool.persister_workers.or(base.worker_pool.persister_workers),
                dedup_workers: env.worker_pool.dedup_workers.or(base.worker_pool.dedup_workers),
            },
            event_batching: EventBatchingFlags {
                enabled: env.event_batching.enabled || base.event_batching.enabled,
                max_batch_size: env.event_batching.max_batch_size.or(base.event_batching.max_batch_size),
            },
            http_client: HttpClientFlags {
                timeout_seconds: env.http_client.timeout_seconds.or(base.http_client.timeout_seconds),
                max_idle_connections: env
                    .http_client
                    .max_idle_connections
                    .or(base.http_client.max_idle_connections),
            },
            namespace_filtering: NamespaceFilteringFlags {
                allowed_namespaces: if env.namespace_filtering.allowed_namespaces.is_empty() {
                    base.namespace_filtering.allowed_namespaces.clone()
                } else {
                    env.namespace_filtering.allowed_namespaces.clone()
                },
                denied_namespaces: if env.namespace_filtering.denied_namespaces.is_empty() {
                    base.namespace_filtering.denied_namespaces.clone()
                } else {
                    env.namespace_filtering.denied_namespaces.clone()
                },
            },
        }
    }
}

/// Hot-swapped base/environment-overlay pair, same atomic-snapshot
/// pattern as [`super::snapshot::SourceSnapshot`] (spec.md §9 "Hot-reload
/// without races").
pub struct FeatureFlagStore {
    base: ArcSwap<FeatureFlags>,
    env: ArcSwap<FeatureFlags>,
}

impl FeatureFlagStore {
    pub fn new() -> Self {
        Self {
            base: ArcSwap::from_pointee(FeatureFlags::default()),
            env: ArcSwap::from_pointee(FeatureFlags::default()),
        }
    }

    pub fn set_base(&self, flags: FeatureFlags) {
        self.base.store(Arc::new(flags));
    }

    pub fn set_env(&self, flags: FeatureFlags) {
        self.env.store(Arc::new(flags));
    }

    pub fn effective(&self) -> FeatureFlags {
        FeatureFlags::overlay(&self.base.load(), &self.env.load())
    }
}

impl Default for FeatureFlagStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_env_option_wins_when_present() {
        let base = FeatureFlags {
            worker_pool: WorkerPoolFlags {
                persister_workers: Some(5),
                dedup_workers: Some(5),
            },
            ..Default::default()
        };
        let env = FeatureFlags {
            worker_pool: WorkerPoolFlags {
                persister_workers: Some(10),
                dedup_workers: None,
            },
            ..Default::default()
        };
        let merged = FeatureFlags::overlay(&base, &env);
        assert_eq!(merged.worker_pool.persister_workers, Some(10));
        assert_eq!(merged.worker_pool.dedup_workers, Some(5));
    }

    #[test]
    fn store_reflects_latest_base_and_env() {
        let store = FeatureFlagStore::new();
        store.set_base(FeatureFlags {
            worker_pool: WorkerPoolFlags {
                persister_workers: Some(5),
                dedup_workers: None,
            },
            ..Default::default()
        });
        store.set_env(FeatureFlags {
            worker_pool: WorkerPoolFlags {
                persister_workers: Some(20),
                dedup_workers: None,
            },
            ..Default::default()
        });
        assert_eq!(store.effective().worker_pool.persister_workers, Some(20));
    }
}
