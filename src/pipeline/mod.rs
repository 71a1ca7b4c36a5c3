//! The observation pipeline (spec.md §4): normalize -> filter/dedup (in
//! the source's configured order) -> rate-limit -> persist. Each stage
//! after normalization reads its `SourceSnapshot` once per event at
//! dequeue (spec.md §5) rather than re-reading the Registry per
//! predicate, so a config change mid-flight never produces a
//! half-old-half-new decision for a single event.

pub mod dedup;
pub mod filter;
pub mod normalize;
pub mod persist;
pub mod rate_limit;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ingester::{Destination, ProcessingOrder};
use crate::config::Registry;
use crate::internal_events::{InternalEvent, ObservationDropped};
use dedup::DedupState;
use rate_limit::RateLimiterState;
use zen_core::Observation;

const PERSIST_QUEUE_CAPACITY: usize = 256;
const PERSIST_WORKER_COUNT: usize = 5;

/// Runs the D/E/F stages for one `Observation`, in the order its source
/// requests (spec.md §4.C `order`, §8 P8 "processing order is observable
/// only for which predicate drops an event, never for non-dropped
/// events"). Returns the destinations to persist to, or `None` if the
/// event was dropped at any stage.
fn run_filter_dedup_rate_limit(
    obs: &Observation,
    order: ProcessingOrder,
    snapshot: &crate::config::SourceSnapshot,
    dedup_state: &DedupState,
    rate_limiter: &RateLimiterState,
) -> Option<()> {
    let run_filter = |obs: &Observation| filter::evaluate(obs, &snapshot.filter);
    let run_dedup = |obs: &Observation| dedup_state.check_and_record(obs, &snapshot.dedup);

    match order {
        ProcessingOrder::FilterFirst => {
            if let Err(reason) = run_filter(obs) {
                ObservationDropped { source: &obs.source, reason }.emit();
                return None;
            }
            if run_dedup(obs) {
                return None;
            }
        }
        ProcessingOrder::DedupFirst => {
            if run_dedup(obs) {
                return None;
            }
            if let Err(reason) = run_filter(obs) {
                ObservationDropped { source: &obs.source, reason }.emit();
                return None;
            }
        }
    }

    if !rate_limiter.check(&obs.source, snapshot.rate_limit) {
        return None;
    }
    Some(())
}

/// The D/E/F worker: one per configured concurrency unit, all sharing the
/// same `DedupState`/`RateLimiterState` so per-source state is process-wide
/// rather than per-worker.
async fn run_stage_worker(
    mut rx: mpsc::Receiver<Observation>,
    persist_tx: mpsc::Sender<(Observation, Vec<Destination>)>,
    registry: Registry,
    dedup_state: DedupState,
    rate_limiter: RateLimiterState,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            obs = rx.recv() => {
                let Some(obs) = obs else { return };
                let snapshot = registry.get(&obs.source);
                let destinations = snapshot.ingester.destinations.clone();
                if run_filter_dedup_rate_limit(&obs, snapshot.ingester.order, &snapshot, &dedup_state, &rate_limiter).is_some()
                    && persist_tx.send((obs, destinations)).await.is_err()
                {
                    return;
                }
            }
        }
    }
}

/// Wires the full B-through-G dataflow and spawns every worker task.
/// `raw_rx` is the merged stream from every source adapter (spec.md §4.B);
/// everything downstream of it is source-agnostic.
pub async fn run(
    raw_rx: mpsc::Receiver<zen_core::RawEvent>,
    client: kube::Client,
    registry: Registry,
    dedup_max_size: usize,
    token: CancellationToken,
) {
    let (normalized_tx, normalized_rx) = mpsc::channel(1024);
    let (persist_tx, persist_rx) = mpsc::channel(PERSIST_QUEUE_CAPACITY);

    let dedup_state = DedupState::new(dedup_max_size);
    let rate_limiter = RateLimiterState::new();

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(normalize::run(raw_rx, normalized_tx, registry.clone(), token.child_token())));
    tasks.push(tokio::spawn(dedup::run_sweeper(dedup_state.clone(), registry.clone(), token.child_token())));
    tasks.push(tokio::spawn(run_stage_worker(
        normalized_rx,
        persist_tx,
        registry.clone(),
        dedup_state,
        rate_limiter,
        token.child_token(),
    )));

    // `mpsc::Receiver` has no fan-out primitive, so the persist stage's
    // worker pool shares one receiver behind a mutex: each worker pulls
    // the next item whenever it's free, giving the same bounded-pool
    // semantics as spec.md §5's "worker pool, default 5" without a
    // second channel layer per worker.
    let persist_rx = std::sync::Arc::new(tokio::sync::Mutex::new(persist_rx));
    for _ in 0..PERSIST_WORKER_COUNT {
        let persist_rx = persist_rx.clone();
        let client = client.clone();
        let token = token.child_token();
        tasks.push(tokio::spawn(async move {
            loop {
                let item = {
                    let mut rx = persist_rx.lock().await;
                    tokio::select! {
                        _ = token.cancelled() => return,
                        item = rx.recv() => item,
                    }
                };
                let Some((obs, destinations)) = item else { return };
                persist::persist(&client, obs, &destinations).await;
            }
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
}
