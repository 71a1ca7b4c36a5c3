//! `FilterConfig`: per-source inclusion/exclusion predicates, and the merge
//! rule applied when more than one `ObservationFilter` CRD targets the same
//! source (spec.md §4.A).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use zen_core::Severity;
use schemars::JsonSchema;

/// Per-source filter predicates. `enabled = Some(false)` stops the source
/// at the filter stage entirely (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FilterConfig {
    pub enabled: Option<bool>,
    pub min_severity: Option<Severity>,
    pub include_severities: HashSet<Severity>,
    pub include_event_types: HashSet<String>,
    pub exclude_event_types: HashSet<String>,
    pub include_namespaces: HashSet<String>,
    pub exclude_namespaces: HashSet<String>,
    pub include_kinds: HashSet<String>,
    pub exclude_kinds: HashSet<String>,
    pub include_categories: HashSet<String>,
    pub exclude_categories: HashSet<String>,
    pub exclude_rules: HashSet<String>,
    pub min_priority: Option<f64>,
    /// A conservative subset of boolean expressions over observation
    /// fields (`=`, `>=`, `<=`, `AND`, `OR`) — see
    /// [`crate::pipeline::filter::Expression`] for exactly what's
    /// supported; spec.md §4.D explicitly allows implementing a
    /// documented subset.
    pub expression: Option<String>,
}

impl FilterConfig {
    /// Merge rule for multiple `ObservationFilter` CRDs targeting the same
    /// source (spec.md §4.A):
    /// - `min_severity`: most restrictive (highest rank) wins.
    /// - exclude lists: union.
    /// - include lists: intersection when both non-empty, else the
    ///   non-empty side.
    /// - `enabled`: logical AND.
    /// - `min_priority`: most restrictive (highest) wins.
    ///
    /// P3 (merge restrictiveness) follows directly from this: every rule
    /// above either tightens or leaves unchanged the set of observations
    /// that pass, so the merged filter's drop set is always a superset of
    /// either input's.
    pub fn merge(&self, other: &FilterConfig) -> FilterConfig {
        FilterConfig {
            enabled: merge_bool_and(self.enabled, other.enabled),
            min_severity: merge_most_restrictive(self.min_severity, other.min_severity),
            include_severities: merge_include(&self.include_severities, &other.include_severities),
            include_event_types: merge_include(&self.include_event_types, &other.include_event_types),
            exclude_event_types: union(&self.exclude_event_types, &other.exclude_event_types),
            include_namespaces: merge_include(&self.include_namespaces, &other.include_namespaces),
            exclude_namespaces: union(&self.exclude_namespaces, &other.exclude_namespaces),
            include_kinds: merge_include(&self.include_kinds, &other.include_kinds),
            exclude_kinds: union(&self.exclude_kinds, &other.exclude_kinds),
            include_categories: merge_include(&self.include_categories, &other.include_categories),
            exclude_categories: union(&self.exclude_categories, &other.exclude_categories),
            exclude_rules: union(&self.exclude_rules, &other.exclude_rules),
            min_priority: merge_max_f64(self.min_priority, other.min_priority),
            // An expression predicate from either side must still hold;
            // conjoining with AND keeps the merge result at least as
            // restrictive as either input, same as the other fields.
            expression: merge_expression(self.expression.as_deref(), other.expression.as_deref()),
        }
    }
}

fn merge_bool_and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(a && b),
    }
}

fn merge_most_restrictive(a: Option<Severity>, b: Option<Severity>) -> Option<Severity> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(if a > b { a } else { b }),
    }
}

fn merge_max_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(a.max(b)),
    }
}

fn union(a: &HashSet<String>, b: &HashSet<String>) -> HashSet<String> {
    a.union(b).cloned().collect()
}

fn merge_include<T: Clone + Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> HashSet<T> {
    if a.is_empty() {
        b.clone()
    } else if b.is_empty() {
        a.clone()
    } else {
        a.intersection(b).cloned().collect()
    }
}

fn merge_expression(a: Option<&str>, b: Option<&str>) -> Option<String> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (Some(a), Some(b)) => Some(format!("({a}) AND ({b})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_severity_takes_most_restrictive() {
        let a = FilterConfig {
            min_severity: Some(Severity::Medium),
            ..Default::default()
        };
        let b = FilterConfig {
            min_severity: Some(Severity::High),
            ..Default::default()
        };
        assert_eq!(a.merge(&b).min_severity, Some(Severity::High));
    }

    #[test]
    fn enabled_is_logical_and() {
        let a = FilterConfig {
            enabled: Some(true),
            ..Default::default()
        };
        let b = FilterConfig {
            enabled: Some(false),
            ..Default::default()
        };
        assert_eq!(a.merge(&b).enabled, Some(false));
    }

    #[test]
    fn exclude_lists_union() {
        let a = FilterConfig {
            exclude_namespaces: HashSet::from(["kube-system".to_string()]),
            ..Default::default()
        };
        let b = FilterConfig {
            exclude_namespaces: HashSet::from(["kube-public".to_string()]),
            ..Default::default()
        };
        let merged = a.merge(&b).exclude_namespaces;
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn include_lists_intersect_when_both_nonempty() {
        let a = FilterConfig {
            include_namespaces: HashSet::from(["default".to_string(), "prod".to_string()]),
            ..Default::default()
        };
        let b = FilterConfig {
            include_namespaces: HashSet::from(["prod".to_string(), "staging".to_string()]),
            ..Default::default()
        };
        let merged = a.merge(&b).include_namespaces;
        assert_eq!(merged, HashSet::from(["prod".to_string()]));
    }

    #[test]
    fn include_list_empty_side_takes_the_other() {
        let a = FilterConfig::default();
        let b = FilterConfig {
            include_namespaces: HashSet::from(["prod".to_string()]),
            ..Default::default()
        };
        assert_eq!(a.merge(&b).include_namespaces, b.include_namespaces);
    }
}
