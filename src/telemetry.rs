//! Logging and metrics bootstrap.
//!
//! Process lifecycle, leader election, and metrics/tracing *exporters* are
//! explicitly out of scope (spec.md §1); this module only wires up the
//! recording/formatting layers so the rest of the crate has somewhere to
//! send `tracing` events and `metrics` updates. An embedder can install its
//! own `metrics::Recorder` before calling [`init`] if it needs anything
//! fancier than the default no-op recorder.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for logs, mirroring the human/JSON toggle this codebase's
/// own trace-init helpers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("ZEN_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Installs the global `tracing` subscriber. Idempotent-safe to call once
/// at process start; a second call is a programmer error and panics, same
/// as `tracing_subscriber::util::SubscriberInitExt::init`.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_env("ZEN_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}
