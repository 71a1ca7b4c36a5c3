//! Source Adapters (spec.md §4.B): four adapter kinds behind one
//! capability set, per the spec's own design note on dynamic dispatch —
//! "model adapters behind a capability set `{start, stop, events_channel}`;
//! the supervisor owns the set, not a class hierarchy."

pub mod events;
pub mod informer;
pub mod logs;
pub mod supervisor;
pub mod webhook;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zen_core::RawEvent;

/// Default bounded outbound channel capacity (spec.md §4.B, §5).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Common contract every adapter kind implements. `run` owns the adapter
/// and drives it to completion; cancellation is observed via `token`, not
/// a separate `stop()` call, since every suspension point inside an
/// adapter already needs to select on it.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn source(&self) -> &str;

    async fn run(self: Box<Self>, tx: mpsc::Sender<RawEvent>, token: CancellationToken);
}

/// Adapter -> Normalizer boundary policy (spec.md §5): drop with a
/// counter rather than block, to protect against upstream bursts. Every
/// adapter should funnel its sends through this helper instead of calling
/// `tx.send` directly.
pub fn try_emit(tx: &mpsc::Sender<RawEvent>, source: &str, event: RawEvent) {
    use crate::internal_events::{InternalEvent, ObservationDropped, ObservationReceived};

    match tx.try_send(event) {
        Ok(()) => ObservationReceived { source }.emit(),
        Err(mpsc::error::TrySendError::Full(_)) => ObservationDropped {
            source,
            reason: "adapter_channel_full",
        }
        .emit(),
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
