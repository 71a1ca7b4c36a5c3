//! Config Reconcilers (spec.md §4.H): one watcher per CRD kind plus one
//! for the legacy filter/features ConfigMaps, each converting
//! unstructured-to-typed-then-compiled config and pushing it into the
//! [`crate::config::Registry`].
//!
//! Every reconciler here is a thin wrapper around [`kube::runtime::watcher`]
//! rather than the full `Controller` abstraction: there is no owned
//! subresource to reconcile against and no requeue-on-failure policy
//! needed, just "convert CRD to compiled config, push it in" — the same
//! shape as this codebase's own `reflect_shared`-backed watch loops.

pub mod configmap;
pub mod dedup_config;
pub mod ingester;
pub mod observation_filter;
pub mod source_config;
pub mod type_config;

use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;

/// Runs `watcher` against `api` with default exponential backoff, calling
/// `on_apply`/`on_delete` for each event until `token` is cancelled. The
/// initial list-then-watch sequence hands every pre-existing object to
/// `on_apply` via `InitApply` before `InitDone` fires, so a freshly started
/// watcher loads whatever CRDs/ConfigMaps already exist in the cluster
/// rather than sitting empty until the next edit; we treat `InitApply`
/// identically to a steady-state `Apply`. A watcher `Delete` event for a
/// typed kube-rs resource always carries the last reflected object —
/// unlike client-go's `DeletedFinalStateUnknown`, there is no opaque-key
/// case, since the object was already deserialized to reach this point.
/// We still treat a delete whose object fails our own domain conversion
/// (e.g. an empty `source`) as "unrecoverable": the registry entry for
/// that key is left untouched and a warning is logged, matching the
/// spec's prescribed tombstone behavior (spec.md §4.H, P5).
pub async fn run_watcher<K, ApplyFn, DeleteFn>(
    api: Api<K>,
    token: CancellationToken,
    mut on_apply: ApplyFn,
    mut on_delete: DeleteFn,
) where
    K: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    ApplyFn: FnMut(K) + Send,
    DeleteFn: FnMut(K) + Send,
{
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(stream);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("reconciler watcher cancelled");
                return;
            }
            next = stream.next() => {
                match next {
                    Some(Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj))) => on_apply(obj),
                    Some(Ok(watcher::Event::Delete(obj))) => on_delete(obj),
                    Some(Ok(watcher::Event::Init | watcher::Event::InitDone)) => {}
                    Some(Err(error)) => {
                        warn!(%error, "reconciler watch stream error");
                    }
                    None => {
                        warn!("reconciler watch stream ended");
                        return;
                    }
                }
            }
        }
    }
}

pub(crate) fn object_namespace<K: ResourceExt>(obj: &K) -> Option<String> {
    obj.namespace()
}
