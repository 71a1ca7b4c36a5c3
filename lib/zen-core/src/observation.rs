//! The two record shapes that cross stage boundaries: [`RawEvent`] (adapter
//! output) and [`Observation`] (normalizer output, persister input).

use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::severity::Severity;
use crate::value::Value;

/// A hint the adapter that produced a [`RawEvent`] attaches about where it
/// came from, consumed by the normalizer's `resource_ref` extraction and by
/// internal-event logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OriginMeta {
    pub pod: Option<ResourceRef>,
    pub webhook_path: Option<String>,
    pub resource: Option<ResourceRef>,
}

/// Produced by a source adapter; consumed only by the normalizer.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Identifies the logical ingester origin (matches `IngesterConfig::source`).
    pub source_id: String,
    pub received_at: SystemTime,
    pub payload: Value,
    pub origin_meta: OriginMeta,
}

impl RawEvent {
    pub fn new(source_id: impl Into<String>, payload: Value) -> Self {
        Self {
            source_id: source_id.into(),
            received_at: SystemTime::now(),
            payload,
            origin_meta: OriginMeta::default(),
        }
    }

    pub fn with_origin(mut self, origin_meta: OriginMeta) -> Self {
        self.origin_meta = origin_meta;
        self
    }
}

/// `group/version/kind/name/namespace` identifying the subject of an
/// observation (or, for cluster-scoped destinations, a source resource).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// The canonical, normalized record. Immutable after construction; its
/// `fingerprint` is computed once by the normalizer and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub source: String,
    pub category: String,
    pub severity: Severity,
    pub event_type: String,
    pub message: String,
    pub detected_at: chrono::DateTime<chrono::Utc>,
    pub resource_ref: ResourceRef,
    pub details: IndexMap<String, Value>,
    pub priority: f64,
    #[serde(with = "hex_bytes")]
    pub fingerprint: Vec<u8>,
    #[serde(default, with = "humantime_duration_opt")]
    pub ttl: Option<Duration>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        s.serialize_str(&hex)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(serde::de::Error::custom))
            .collect()
    }
}

mod humantime_duration_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        opt.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
