//! Native `v1/Event` adapter (spec.md §4.B): watches Kubernetes `Event`
//! objects and emits one `RawEvent` per watched change, optionally
//! restricted to a set of involved-object kinds and namespaces.

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event as K8sEvent;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{try_emit, Adapter};
use crate::config::ingester::EventsBlock;
use zen_core::{OriginMeta, RawEvent, ResourceRef, Value};

pub struct EventsAdapter {
    source: String,
    client: Client,
    block: EventsBlock,
}

impl EventsAdapter {
    pub fn new(source: impl Into<String>, client: Client, block: EventsBlock) -> Self {
        Self {
            source: source.into(),
            client,
            block,
        }
    }

    fn passes_filters(&self, event: &K8sEvent) -> bool {
        if !self.block.involved_object_kinds.is_empty() {
            let kind = event.involved_object.kind.as_deref().unwrap_or_default();
            if !self.block.involved_object_kinds.iter().any(|k| k == kind) {
                return false;
            }
        }
        if !self.block.namespaces.is_empty() {
            let ns = event.namespace().unwrap_or_default();
            if !self.block.namespaces.iter().any(|n| n == &ns) {
                return false;
            }
        }
        true
    }

    fn to_raw_event(&self, event: &K8sEvent) -> RawEvent {
        let involved = &event.involved_object;
        let resource = ResourceRef {
            group: None,
            kind: involved.kind.clone().unwrap_or_default(),
            name: involved.name.clone().unwrap_or_default(),
            namespace: involved.namespace.clone().or_else(|| event.namespace()),
        };
        let payload = Value::from(serde_json::to_value(event).unwrap_or(serde_json::Value::Null));
        RawEvent::new(self.source.clone(), payload).with_origin(OriginMeta {
            resource: Some(resource),
            ..Default::default()
        })
    }

    fn api(&self) -> Api<K8sEvent> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl Adapter for EventsAdapter {
    fn source(&self) -> &str {
        &self.source
    }

    async fn run(self: Box<Self>, tx: mpsc::Sender<RawEvent>, token: CancellationToken) {
        let stream = watcher(self.api(), watcher::Config::default()).default_backoff();
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(source = %self.source, "events adapter stopping");
                    return;
                }
                next = stream.next() => match next {
                    Some(Ok(watcher::Event::Apply(event))) => {
                        if self.passes_filters(&event) {
                            try_emit(&tx, &self.source, self.to_raw_event(&event));
                        }
                    }
                    Some(Ok(watcher::Event::Delete(_))) => {}
                    Some(Ok(watcher::Event::Init | watcher::Event::InitApply(_) | watcher::Event::InitDone)) => {}
                    Some(Err(error)) => {
                        warn!(source = %self.source, %error, "event watch error, backing off");
                    }
                    None => {
                        warn!(source = %self.source, "event watch stream ended");
                        return;
                    }
                },
            }
        }
    }
}
