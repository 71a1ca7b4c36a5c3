//! Filter stage (spec.md §4.D): ordered predicate evaluation with
//! short-circuit on first drop.

use crate::config::FilterConfig;
use zen_core::{Observation, Severity};

/// Drop reasons double as the `reason` label on `observations_dropped_total`
/// (spec.md §4.D: "labelled by drop-reason, one of the predicate names").
pub const REASON_DISABLED: &str = "enabled";
pub const REASON_MIN_SEVERITY: &str = "min_severity";
pub const REASON_CATEGORY: &str = "category";
pub const REASON_KIND: &str = "kind";
pub const REASON_NAMESPACE: &str = "namespace";
pub const REASON_EVENT_TYPE: &str = "event_type";
pub const REASON_RULE: &str = "rule";
pub const REASON_MIN_PRIORITY: &str = "min_priority";
pub const REASON_EXPRESSION: &str = "expression";

fn include_exclude(value: &str, include: &std::collections::HashSet<String>, exclude: &std::collections::HashSet<String>) -> bool {
    if exclude.contains(value) {
        return false;
    }
    if !include.is_empty() && !include.contains(value) {
        return false;
    }
    true
}

/// Evaluates the documented subset of spec.md §4.D's free-form expression
/// grammar: `field op value` clauses joined by `AND`/`OR` (no parens, no
/// operator precedence beyond left-to-right `AND` before `OR` grouping —
/// each `OR`-separated group must fully pass its own `AND`s). Supported
/// fields: `severity`, `priority`, `category`, `event_type`. Operators:
/// `=`, `>=`, `<=`.
fn evaluate_expression(expr: &str, obs: &Observation) -> bool {
    expr.split(" OR ").any(|and_group| and_group.split(" AND ").all(|clause| evaluate_clause(clause.trim(), obs)))
}

fn evaluate_clause(clause: &str, obs: &Observation) -> bool {
    for op in ["<=", ">=", "="] {
        if let Some((field, value)) = clause.split_once(op) {
            let field = field.trim();
            let value = value.trim();
            return match field {
                "severity" => value.parse::<Severity>().map(|v| match op {
                    "=" => obs.severity == v,
                    ">=" => obs.severity >= v,
                    "<=" => obs.severity <= v,
                    _ => unreachable!(),
                }).unwrap_or(false),
                "priority" => value.parse::<f64>().map(|v| match op {
                    "=" => (obs.priority - v).abs() < f64::EPSILON,
                    ">=" => obs.priority >= v,
                    "<=" => obs.priority <= v,
                    _ => unreachable!(),
                }).unwrap_or(false),
                "category" => op == "=" && obs.category == value,
                "event_type" => op == "=" && obs.event_type == value,
                _ => false,
            };
        }
    }
    false
}

/// Returns `Ok(())` if `obs` passes every predicate, `Err(reason)`
/// otherwise, short-circuiting at the first failing one.
pub fn evaluate(obs: &Observation, filter: &FilterConfig) -> Result<(), &'static str> {
    if filter.enabled == Some(false) {
        return Err(REASON_DISABLED);
    }
    if let Some(floor) = filter.min_severity {
        if obs.severity < floor {
            return Err(REASON_MIN_SEVERITY);
        }
    }
    if !filter.include_severities.is_empty() && !filter.include_severities.contains(&obs.severity) {
        return Err(REASON_MIN_SEVERITY);
    }
    if !include_exclude(&obs.category, &filter.include_categories, &filter.exclude_categories) {
        return Err(REASON_CATEGORY);
    }
    if !include_exclude(&obs.resource_ref.kind, &filter.include_kinds, &filter.exclude_kinds) {
        return Err(REASON_KIND);
    }
    let namespace = obs.resource_ref.namespace.as_deref().unwrap_or("");
    if !include_exclude(namespace, &filter.include_namespaces, &filter.exclude_namespaces) {
        return Err(REASON_NAMESPACE);
    }
    if !include_exclude(&obs.event_type, &filter.include_event_types, &filter.exclude_event_types) {
        return Err(REASON_EVENT_TYPE);
    }
    // No separate "rule id" field exists on Observation; `event_type` is the
    // closest stand-in for the rule identifiers `exclude_rules` names.
    if filter.exclude_rules.contains(&obs.event_type) {
        return Err(REASON_RULE);
    }
    if let Some(min_priority) = filter.min_priority {
        if obs.priority < min_priority {
            return Err(REASON_MIN_PRIORITY);
        }
    }
    if let Some(expr) = &filter.expression {
        if !evaluate_expression(expr, obs) {
            return Err(REASON_EXPRESSION);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use zen_core::ResourceRef;

    fn obs(severity: Severity, priority: f64) -> Observation {
        Observation {
            source: "trivy".to_string(),
            category: "vulnerability".to_string(),
            severity,
            event_type: "cve".to_string(),
            message: String::new(),
            detected_at: chrono::Utc::now(),
            resource_ref: ResourceRef {
                group: None,
                kind: "Pod".to_string(),
                name: "nginx".to_string(),
                namespace: Some("default".to_string()),
            },
            details: IndexMap::new(),
            priority,
            fingerprint: vec![],
            ttl: None,
        }
    }

    #[test]
    fn min_severity_floor_drops_below() {
        let filter = FilterConfig {
            min_severity: Some(Severity::High),
            ..Default::default()
        };
        assert_eq!(evaluate(&obs(Severity::Medium, 0.5), &filter), Err(REASON_MIN_SEVERITY));
        assert_eq!(evaluate(&obs(Severity::High, 0.5), &filter), Ok(()));
    }

    #[test]
    fn exclude_namespace_short_circuits_before_min_priority() {
        let filter = FilterConfig {
            exclude_namespaces: std::collections::HashSet::from(["default".to_string()]),
            min_priority: Some(0.9),
            ..Default::default()
        };
        assert_eq!(evaluate(&obs(Severity::Critical, 0.1), &filter), Err(REASON_NAMESPACE));
    }

    #[test]
    fn expression_conjunction_over_severity_and_priority() {
        let filter = FilterConfig {
            expression: Some("severity>=HIGH AND priority>=0.8".to_string()),
            ..Default::default()
        };
        assert_eq!(evaluate(&obs(Severity::Critical, 0.9), &filter), Ok(()));
        assert_eq!(evaluate(&obs(Severity::Critical, 0.5), &filter), Err(REASON_EXPRESSION));
    }
}
