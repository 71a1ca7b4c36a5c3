//! Pod-log tailer adapter (spec.md §4.B): follows the logs of every pod
//! matching a label selector, applies the first matching `LogPattern` to
//! each line, and emits one `RawEvent` per match. Reconnects per-container
//! streams with exponential backoff; refreshes the pod set on a timer
//! since there's no "watch the logs of pods matching a selector" verb in
//! the API, only "watch pods" + "stream logs of one pod".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{AsyncBufReadExt, StreamExt};
use kube::api::LogParams;
use kube::{Api, Client, ResourceExt};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{try_emit, Adapter};
use crate::config::ingester::{LogPattern, LogsBlock};
use zen_core::{OriginMeta, RawEvent, ResourceRef, Value};

const RECONNECT_MIN: Duration = Duration::from_millis(100);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

struct CompiledPattern {
    regex: Regex,
    event_type: String,
    priority: Option<f64>,
}

pub struct LogsAdapter {
    source: String,
    client: Client,
    block: LogsBlock,
    patterns: Vec<CompiledPattern>,
}

impl LogsAdapter {
    pub fn new(source: impl Into<String>, client: Client, block: LogsBlock) -> Self {
        let patterns = block
            .patterns
            .iter()
            .filter_map(|p: &LogPattern| match Regex::new(&p.regex) {
                Ok(regex) => Some(CompiledPattern {
                    regex,
                    event_type: p.event_type.clone(),
                    priority: p.priority,
                }),
                Err(error) => {
                    warn!(pattern = %p.regex, %error, "invalid log pattern regex, skipping");
                    None
                }
            })
            .collect();
        Self {
            source: source.into(),
            client,
            block,
            patterns,
        }
    }

    fn matched_event(&self, pod: &str, namespace: &str, line: &str) -> Option<RawEvent> {
        let pattern = self.patterns.iter().find(|p| p.regex.is_match(line))?;
        let mut fields = indexmap::IndexMap::new();
        fields.insert("line".to_string(), Value::String(line.to_string()));
        fields.insert("event_type".to_string(), Value::String(pattern.event_type.clone()));
        if let Some(priority) = pattern.priority {
            fields.insert(
                "priority".to_string(),
                Value::Number(serde_json::Number::from_f64(priority).unwrap_or_else(|| 0.into())),
            );
        }
        let resource = ResourceRef {
            group: None,
            kind: "Pod".to_string(),
            name: pod.to_string(),
            namespace: Some(namespace.to_string()),
        };
        Some(
            RawEvent::new(self.source.clone(), Value::Object(fields)).with_origin(OriginMeta {
                pod: Some(resource),
                ..Default::default()
            }),
        )
    }

    async fn tail_one(&self, pod: &str, namespace: &str, tx: &mpsc::Sender<RawEvent>, token: &CancellationToken) {
        let api: Api<k8s_openapi::api::core::v1::Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut backoff = RECONNECT_MIN;
        loop {
            if token.is_cancelled() {
                return;
            }
            let params = LogParams {
                follow: true,
                since_seconds: if self.block.since_seconds > 0 {
                    Some(self.block.since_seconds as i64)
                } else {
                    None
                },
                container: self.block.container.clone(),
                ..Default::default()
            };
            match api.log_stream(pod, &params).await {
                Ok(stream) => {
                    backoff = RECONNECT_MIN;
                    let mut lines = stream.lines();
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => return,
                            next = lines.next() => match next {
                                Some(Ok(line)) => {
                                    if let Some(event) = self.matched_event(pod, namespace, &line) {
                                        try_emit(tx, &self.source, event);
                                    }
                                }
                                Some(Err(error)) => {
                                    warn!(%pod, %namespace, %error, "log stream read error, reconnecting");
                                    break;
                                }
                                None => break,
                            },
                        }
                    }
                }
                Err(error) => {
                    debug!(%pod, %namespace, %error, "log stream open failed, backing off");
                }
            }
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(RECONNECT_MAX);
        }
    }
}

#[async_trait]
impl Adapter for LogsAdapter {
    fn source(&self) -> &str {
        &self.source
    }

    async fn run(self: Box<Self>, tx: mpsc::Sender<RawEvent>, token: CancellationToken) {
        let pods_api: Api<k8s_openapi::api::core::v1::Pod> = Api::all(self.client.clone());
        let mut active: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();
        let poll_interval = Duration::from_secs(self.block.poll_interval_seconds.max(1));

        loop {
            if token.is_cancelled() {
                break;
            }
            let list_params = kube::api::ListParams::default().labels(&self.block.pod_selector);
            match pods_api.list(&list_params).await {
                Ok(list) => {
                    let mut seen = std::collections::HashSet::new();
                    for pod in &list.items {
                        let name = pod.name_any();
                        let namespace = pod.namespace().unwrap_or_default();
                        let key = format!("{namespace}/{name}");
                        seen.insert(key.clone());
                        if !active.contains_key(&key) {
                            let self_ref: &LogsAdapter = &self;
                            // Each tailer needs its own clone of the adapter's compiled
                            // state; `Arc` would avoid this, but the adapter is cheap
                            // (one Client handle, a small pattern list) and short-lived
                            // per pod lifetime.
                            let source = self_ref.source.clone();
                            let client = self_ref.client.clone();
                            let block = self_ref.block.clone();
                            let tx = tx.clone();
                            let token = token.clone();
                            let pod_name = name.clone();
                            let ns = namespace.clone();
                            let handle = tokio::spawn(async move {
                                let adapter = LogsAdapter::new(source, client, block);
                                adapter.tail_one(&pod_name, &ns, &tx, &token).await;
                            });
                            active.insert(key, handle);
                        }
                    }
                    active.retain(|key, handle| {
                        if seen.contains(key) {
                            true
                        } else {
                            handle.abort();
                            false
                        }
                    });
                }
                Err(error) => {
                    warn!(source = %self.source, %error, "failed to list pods for log tailer");
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        for (_, handle) in active {
            handle.abort();
        }
    }
}
