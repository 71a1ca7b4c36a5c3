//! Shutdown sequencing shared by every long-lived worker (spec.md §5):
//! stop accepting new input, drain bounded queues with a bounded timeout,
//! then cancel in-flight I/O.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default drain timeout before in-flight I/O is cancelled outright.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A single root cancellation token shared by every worker, plus a
/// `Notify`-backed counter so `shutdown()` can wait for workers to report
/// they've drained before returning.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: tokio_util::task::TaskTracker,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: tokio_util::task::TaskTracker::new(),
        }
    }

    /// A clone of the root cancellation token; workers `select!` on
    /// `.cancelled()` alongside their normal suspension points (queue
    /// send/recv, HTTP calls, log-stream reads, timer fires).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Registers a long-lived worker task so `shutdown()` can wait for it.
    /// Cloned trackers share the same closed/open state.
    pub fn tracker(&self) -> tokio_util::task::TaskTracker {
        self.tracker.clone()
    }

    /// Signals cancellation, then waits up to [`DRAIN_TIMEOUT`] for all
    /// tracked tasks to finish. Tasks still running after the timeout are
    /// left to be dropped when the process exits — we do not forcibly
    /// abort them, since an in-flight persister write is safer completed
    /// than interrupted mid-HTTP-call.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        if tokio::time::timeout(DRAIN_TIMEOUT, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "shutdown drain timeout elapsed with workers still running"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_completes_once_tracked_tasks_finish() {
        let coordinator = ShutdownCoordinator::new();
        let tracker = coordinator.tracker();
        let token = coordinator.token();

        tracker.spawn(async move {
            token.cancelled().await;
        });

        coordinator.shutdown().await;
    }
}
