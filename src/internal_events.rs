//! One struct per pipeline event, each emitting both a `tracing` line and
//! a `metrics` update from a single `emit` call — this codebase's own
//! convention for keeping logging and metrics in lockstep instead of
//! scattering `counter!`/`info!` calls through stage bodies.

use std::time::Duration;

/// Implemented by every internal event struct; `emit` consumes `self` so
/// an event can only be recorded once.
pub trait InternalEvent {
    fn emit(self);
}

pub struct ObservationReceived<'a> {
    pub source: &'a str,
}

impl InternalEvent for ObservationReceived<'_> {
    fn emit(self) {
        trace!(source = %self.source, "raw event received");
        metrics::counter!("observations_received_total", "source" => self.source.to_string()).increment(1);
    }
}

pub struct ObservationNormalized<'a> {
    pub source: &'a str,
    pub duration: Duration,
}

impl InternalEvent for ObservationNormalized<'_> {
    fn emit(self) {
        metrics::histogram!("normalize_latency_seconds", "source" => self.source.to_string())
            .record(self.duration.as_secs_f64());
    }
}

pub struct ObservationDropped<'a> {
    pub source: &'a str,
    pub reason: &'static str,
}

impl InternalEvent for ObservationDropped<'_> {
    fn emit(self) {
        debug!(source = %self.source, reason = %self.reason, "observation dropped");
        metrics::counter!(
            "observations_dropped_total",
            "source" => self.source.to_string(),
            "reason" => self.reason
        )
        .increment(1);
    }
}

pub struct ObservationDedupSuppressed<'a> {
    pub source: &'a str,
    pub strategy: &'static str,
}

impl InternalEvent for ObservationDedupSuppressed<'_> {
    fn emit(self) {
        metrics::counter!(
            "observations_dedup_suppressed_total",
            "source" => self.source.to_string(),
            "strategy" => self.strategy
        )
        .increment(1);
    }
}

pub struct ObservationRateLimited<'a> {
    pub source: &'a str,
}

impl InternalEvent for ObservationRateLimited<'_> {
    fn emit(self) {
        metrics::counter!("observations_rate_limited_total", "source" => self.source.to_string()).increment(1);
    }
}

pub struct ObservationPersisted<'a> {
    pub destination: &'a str,
    pub duration: Duration,
}

impl InternalEvent for ObservationPersisted<'_> {
    fn emit(self) {
        metrics::counter!("observations_persisted_total", "destination" => self.destination.to_string()).increment(1);
        metrics::histogram!("persist_latency_seconds", "destination" => self.destination.to_string())
            .record(self.duration.as_secs_f64());
    }
}

pub struct PersistRetried<'a> {
    pub destination: &'a str,
    pub attempt: u32,
    pub error: String,
}

impl InternalEvent for PersistRetried<'_> {
    fn emit(self) {
        warn!(
            destination = %self.destination,
            attempt = self.attempt,
            error = %self.error,
            "persist attempt failed, retrying"
        );
        metrics::counter!("persist_retry_total", "destination" => self.destination.to_string()).increment(1);
    }
}

pub struct PersistFailed<'a> {
    pub destination: &'a str,
    pub error: String,
}

impl InternalEvent for PersistFailed<'_> {
    fn emit(self) {
        error!(destination = %self.destination, error = %self.error, "persist failed permanently, dropping observation");
        metrics::counter!("persist_failed_total", "destination" => self.destination.to_string()).increment(1);
    }
}

pub struct RegistrySourcesGauge {
    pub count: usize,
}

impl InternalEvent for RegistrySourcesGauge {
    fn emit(self) {
        metrics::gauge!("registry_sources").set(self.count as f64);
    }
}

pub struct DedupWindowEntriesGauge<'a> {
    pub source: &'a str,
    pub entries: usize,
}

impl InternalEvent for DedupWindowEntriesGauge<'_> {
    fn emit(self) {
        metrics::gauge!("dedup_window_entries", "source" => self.source.to_string()).set(self.entries as f64);
    }
}

pub struct RateLimitTokensGauge<'a> {
    pub source: &'a str,
    pub tokens: f64,
}

impl InternalEvent for RateLimitTokensGauge<'_> {
    fn emit(self) {
        metrics::gauge!("rate_limit_tokens", "source" => self.source.to_string()).set(self.tokens);
    }
}
