//! Static fallback tables consulted when no per-source or per-type CRD
//! exists (spec.md §3: `SourceDefaults` and `TypeDefaults`).

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use zen_core::Severity;

use super::rate_limit::RateLimitConfig;

/// `100/min` with `burst 200`, applied when neither a per-source
/// `RateLimitConfig` nor an `ObservationSourceConfig` override exists.
pub const DEFAULT_RATE_LIMIT: RateLimitConfig = RateLimitConfig {
    max_per_minute: 100,
    burst: 200,
};

/// Dedup is most useful with a window on the order of a minute; sources
/// that never got an `ObservationDedupConfig` still get this much
/// protection against duplicate bursts.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Hard cap on total dedup window entries across all sources (spec.md
/// §4.E): `DefaultDedupMaxSize`.
pub const DEFAULT_DEDUP_MAX_SIZE: usize = 10_000;

/// Per-source priority floor used when a source has no `normalization.priority`
/// table of its own, keyed by well-known source name. Falls through to
/// [`TYPE_DEFAULTS`] and finally `0.5` (spec.md §4.C step 3).
pub static SOURCE_DEFAULTS: LazyLock<HashMap<&'static str, SourceDefault>> = LazyLock::new(|| {
    HashMap::from([
        (
            "trivy",
            SourceDefault {
                category: "vulnerability",
                priority_by_severity: &[
                    (Severity::Critical, 0.95),
                    (Severity::High, 0.8),
                    (Severity::Medium, 0.5),
                    (Severity::Low, 0.25),
                    (Severity::Info, 0.1),
                ],
            },
        ),
        (
            "falco",
            SourceDefault {
                category: "runtime-threat",
                priority_by_severity: &[
                    (Severity::Critical, 0.98),
                    (Severity::High, 0.85),
                    (Severity::Medium, 0.55),
                    (Severity::Low, 0.3),
                    (Severity::Info, 0.15),
                ],
            },
        ),
        (
            "opa-gatekeeper",
            SourceDefault {
                category: "policy",
                priority_by_severity: &[
                    (Severity::Critical, 0.9),
                    (Severity::High, 0.7),
                    (Severity::Medium, 0.45),
                    (Severity::Low, 0.2),
                    (Severity::Info, 0.1),
                ],
            },
        ),
        (
            "audit-logs",
            SourceDefault {
                category: "audit",
                priority_by_severity: &[
                    (Severity::Critical, 0.9),
                    (Severity::High, 0.65),
                    (Severity::Medium, 0.4),
                    (Severity::Low, 0.2),
                    (Severity::Info, 0.1),
                ],
            },
        ),
    ])
});

/// Fallback priority keyed by `event_type`, consulted when a source has no
/// default of its own (spec.md §4.C step 3: "fallback to TypeDefaults by
/// event_type").
pub static TYPE_DEFAULTS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    HashMap::from([
        ("vulnerability", 0.6),
        ("policy-violation", 0.5),
        ("runtime-anomaly", 0.7),
        ("audit-event", 0.4),
        ("metric-alert", 0.5),
    ])
});

pub struct SourceDefault {
    pub category: &'static str,
    pub priority_by_severity: &'static [(Severity, f64)],
}

impl SourceDefault {
    pub fn priority_for(&self, severity: Severity) -> Option<f64> {
        self.priority_by_severity
            .iter()
            .find(|(sev, _)| *sev == severity)
            .map(|(_, p)| *p)
    }
}

/// The normalizer's full priority resolution order (spec.md §4.C step 3):
/// per-source table → `TypeDefaults` by event_type → `0.5`.
pub fn resolve_priority(source: &str, event_type: &str, severity: Severity) -> f64 {
    if let Some(default) = SOURCE_DEFAULTS.get(source) {
        if let Some(p) = default.priority_for(severity) {
            return p;
        }
    }
    if let Some(p) = TYPE_DEFAULTS.get(event_type) {
        return *p;
    }
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_source_uses_its_own_table() {
        assert_eq!(resolve_priority("trivy", "vulnerability", Severity::Critical), 0.95);
    }

    #[test]
    fn unknown_source_falls_back_to_type() {
        assert_eq!(resolve_priority("mystery-scanner", "vulnerability", Severity::Low), 0.6);
    }

    #[test]
    fn unknown_source_and_type_falls_back_to_half() {
        assert_eq!(resolve_priority("mystery-scanner", "mystery-type", Severity::Low), 0.5);
    }
}
