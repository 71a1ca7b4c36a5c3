//! Adapter supervisor (spec.md §9): owns the capability set, not a class
//! hierarchy. Watches the Registry's version counter, and for every
//! source with a live `Ingester` CRD makes sure exactly one adapter task
//! of the right kind is running — spawning new ones, and restarting any
//! whose kind or kind-specific block changed since last reconcile.

use std::collections::HashMap;

use kube::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::EventsAdapter;
use super::informer::InformerAdapter;
use super::logs::LogsAdapter;
use super::webhook::WebhookAdapter;
use super::Adapter;
use crate::config::ingester::IngesterKind;
use crate::config::Registry;
use zen_core::RawEvent;

struct Running {
    handle: JoinHandle<()>,
    token: CancellationToken,
    kind_fingerprint: String,
}

/// Builds the concrete adapter for one source's compiled `IngesterKind`.
/// Webhook HMAC secrets are resolved here (the only place an adapter
/// needs a second API read beyond its own domain resource) via a plain
/// `Secret` get; missing or unreadable secrets degrade to no secret,
/// which `WebhookAdapter` then refuses at request time rather than
/// silently accepting unsigned payloads.
async fn build_adapter(client: &Client, source: &str, kind: IngesterKind) -> Box<dyn Adapter> {
    match kind {
        IngesterKind::Informer(block) => Box::new(InformerAdapter::new(source, client.clone(), block)),
        IngesterKind::Logs(block) => Box::new(LogsAdapter::new(source, client.clone(), block)),
        IngesterKind::Events(block) => Box::new(EventsAdapter::new(source, client.clone(), block)),
        IngesterKind::Webhook(block) => {
            let secret = resolve_webhook_secret(client, &block.auth.secret_ref).await;
            Box::new(WebhookAdapter::new(source, block, secret))
        }
    }
}

async fn resolve_webhook_secret(client: &Client, secret_ref: &Option<String>) -> Option<Vec<u8>> {
    let secret_ref = secret_ref.as_ref()?;
    let (namespace, name) = secret_ref.split_once('/')?;
    let api: kube::Api<k8s_openapi::api::core::v1::Secret> = kube::Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(secret) => secret.data.and_then(|mut d| d.remove("hmac-secret")).map(|b| b.0),
        Err(error) => {
            warn!(%secret_ref, %error, "failed to resolve webhook hmac secret");
            None
        }
    }
}

fn kind_fingerprint(kind: &IngesterKind) -> String {
    // Cheap change-detection key: serialize the kind-specific block so a
    // field edit (new pattern, new port, new selector) is detected as a
    // restart-worthy change without hand-maintaining a diff per variant.
    serde_json::to_string(kind).unwrap_or_default()
}

pub async fn run(client: Client, registry: Registry, tx: mpsc::Sender<RawEvent>, token: CancellationToken) {
    let mut version_rx = registry.subscribe();
    let mut running: HashMap<String, Running> = HashMap::new();

    loop {
        let sources = registry.ingester_sources();
        let mut wanted: HashMap<String, IngesterKind> = HashMap::new();
        for source in &sources {
            let snapshot = registry.get(source);
            if !snapshot.ingester.destinations.is_empty() {
                wanted.insert(source.clone(), snapshot.ingester.kind.clone());
            }
        }

        let stale: Vec<String> = running.keys().filter(|s| !wanted.contains_key(*s)).cloned().collect();
        for source in stale {
            if let Some(r) = running.remove(&source) {
                r.token.cancel();
                r.handle.abort();
                info!(%source, "adapter stopped: source no longer has a live ingester");
            }
        }

        for (source, kind) in &wanted {
            let fingerprint = kind_fingerprint(kind);
            let needs_restart = match running.get(source) {
                Some(r) => r.kind_fingerprint != fingerprint,
                None => true,
            };
            if !needs_restart {
                continue;
            }
            if let Some(old) = running.remove(source) {
                old.token.cancel();
                old.handle.abort();
                info!(%source, "adapter restarting: ingester config changed");
            }
            let adapter_token = token.child_token();
            let adapter = build_adapter(&client, source, kind.clone()).await;
            let tx = tx.clone();
            let spawned_token = adapter_token.clone();
            let handle = tokio::spawn(async move {
                adapter.run(tx, spawned_token).await;
            });
            running.insert(
                source.clone(),
                Running {
                    handle,
                    token: adapter_token,
                    kind_fingerprint: fingerprint,
                },
            );
            info!(source = %source, "adapter started");
        }

        tokio::select! {
            _ = token.cancelled() => {
                for (_, r) in running {
                    r.token.cancel();
                    r.handle.abort();
                }
                return;
            }
            changed = version_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
