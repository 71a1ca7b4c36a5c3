//! Pure, I/O-free data model for `zen-watcher`: the `RawEvent`/`Observation`
//! record shapes, the severity scale, the schemaless value tree and its
//! path evaluator, and fingerprint computation.
//!
//! Kept separate from the main crate so the hot-path business logic (what a
//! fingerprint is, how paths resolve, how severities order) can be unit- and
//! property-tested without pulling in `tokio`, `kube`, or any other I/O
//! dependency — mirrors this codebase's existing split between a pure core
//! library and the binary that wires it to the outside world.

pub mod fingerprint;
pub mod observation;
pub mod severity;
pub mod value;

pub use observation::{OriginMeta, Observation, RawEvent, ResourceRef};
pub use severity::Severity;
pub use value::Value;
