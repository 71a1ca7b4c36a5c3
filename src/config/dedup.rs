//! `DedupConfig`: per-source deduplication window parameters (spec.md §4.E).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;

/// Which fingerprint to dedup on. `Fingerprint` uses the full canonicalized
/// details map (or a declared subset via `fields`); `Key` concatenates
/// `fields` in declared order without sorting, cheaper when a caller
/// already knows a natural key; `EventStream` dedups only against the
/// immediately preceding observation from the same source (no window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    Fingerprint,
    Key,
    EventStream,
}

impl Default for DedupStrategy {
    fn default() -> Self {
        DedupStrategy::Fingerprint
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DedupConfig {
    pub enabled: bool,
    #[serde(with = "humantime_duration")]
    pub window: Duration,
    pub strategy: DedupStrategy,
    /// Field paths consulted by `Fingerprint`/`Key` strategies; empty means
    /// "use the whole details map" for `Fingerprint` and is invalid for
    /// `Key` (rejected at validation, spec.md §3).
    pub fields: Vec<String>,
    /// Caps the number of distinct fingerprints tracked per source within
    /// one window; the oldest entry is evicted on overflow (spec.md §4.E).
    pub max_events_per_window: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: super::defaults::DEFAULT_DEDUP_WINDOW,
            strategy: DedupStrategy::default(),
            fields: Vec::new(),
            max_events_per_window: super::defaults::DEFAULT_DEDUP_MAX_SIZE,
        }
    }
}

impl DedupConfig {
    /// Merge rule for multiple CRDs targeting the same source: the
    /// tightest window wins, same rationale as `FilterConfig::merge`'s
    /// most-restrictive-wins rule (spec.md §4.A).
    pub fn merge(&self, other: &DedupConfig) -> DedupConfig {
        DedupConfig {
            enabled: self.enabled && other.enabled,
            window: self.window.min(other.window),
            strategy: self.strategy,
            fields: if self.fields.is_empty() {
                other.fields.clone()
            } else {
                self.fields.clone()
            },
            max_events_per_window: self.max_events_per_window.min(other.max_events_per_window),
        }
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_tighter_window() {
        let a = DedupConfig {
            window: Duration::from_secs(120),
            ..Default::default()
        };
        let b = DedupConfig {
            window: Duration::from_secs(30),
            ..Default::default()
        };
        assert_eq!(a.merge(&b).window, Duration::from_secs(30));
    }

    #[test]
    fn merge_enabled_is_and() {
        let a = DedupConfig {
            enabled: true,
            ..Default::default()
        };
        let b = DedupConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!a.merge(&b).enabled);
    }
}
