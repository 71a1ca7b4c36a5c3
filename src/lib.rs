//! `zen-watcher`: a Kubernetes-resident observation aggregation pipeline.
//!
//! Third-party security, compliance, and operational tooling emits raw
//! events through heterogeneous channels (custom resources, pod logs,
//! webhooks, native events). This crate normalizes, filters, deduplicates,
//! rate-limits, and persists survivors as destination custom resources. See
//! `SPEC_FULL.md` for the full component design.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod crd;
pub mod internal_events;
pub mod pipeline;
pub mod reconcile;
pub mod run;
pub mod shutdown;
pub mod sources;
pub mod telemetry;

mod error;

pub use error::Error;

/// The crate-wide fallible result type, matching this codebase's existing
/// `crate::Result` convention of a boxed/typed error at module boundaries.
pub type Result<T> = std::result::Result<T, Error>;
