//! Fingerprint computation shared by the normalizer (stamps it once) and the
//! deduplicator (keys its sliding windows on it).
//!
//! P1 (fingerprint stability): permuting map-key order in `details` must not
//! change the fingerprint. We satisfy this by canonicalizing to a
//! key-sorted form before hashing rather than hashing the map's iteration
//! order directly.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::observation::ResourceRef;
use crate::value::Value;

/// Selects which fields feed the fingerprint: the whole `details` map when
/// `fields` is empty, or the ordered subset of JSON paths otherwise. The
/// `source`/`event_type`/`resource_ref` triple is always included — two
/// observations from different sources are never the same fingerprint.
pub fn compute(
    source: &str,
    event_type: &str,
    resource_ref: &ResourceRef,
    details: &IndexMap<String, Value>,
    fields: &[String],
) -> Vec<u8> {
    let mut canon = String::new();
    canon.push_str(source);
    canon.push('\0');
    canon.push_str(event_type);
    canon.push('\0');
    canon.push_str(resource_ref.group.as_deref().unwrap_or(""));
    canon.push('\0');
    canon.push_str(&resource_ref.kind);
    canon.push('\0');
    canon.push_str(&resource_ref.name);
    canon.push('\0');
    canon.push_str(resource_ref.namespace.as_deref().unwrap_or(""));
    canon.push('\0');

    if fields.is_empty() {
        canonicalize_map(details, &mut canon);
    } else {
        for field in fields {
            canon.push_str(field);
            canon.push('=');
            if let Some(v) = details.get(field.as_str()).or_else(|| lookup_path(details, field)) {
                canonicalize_value(v, &mut canon);
            }
            canon.push('\0');
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    hasher.finalize().to_vec()
}

/// Builds the `key` strategy's concatenation key from ordered field values,
/// in declaration order (not sorted — order is meaningful to the author of
/// `DedupConfig::fields`).
pub fn field_key(details: &IndexMap<String, Value>, fields: &[String]) -> String {
    let mut key = String::new();
    for field in fields {
        if let Some(v) = details.get(field.as_str()).or_else(|| lookup_path(details, field)) {
            key.push_str(&v.to_string());
        }
        key.push('\u{1f}');
    }
    key
}

/// Resolves a dotted/indexed path against `details` without requiring the
/// caller to wrap it in a [`Value::Object`] first.
fn lookup_path<'a>(details: &'a IndexMap<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, rest) = path.split_once('.').unwrap_or((path, ""));
    let head_value = details.get(head)?;
    if rest.is_empty() {
        Some(head_value)
    } else {
        head_value.get_path(rest)
    }
}

fn canonicalize_map(map: &IndexMap<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for key in keys {
        out.push_str(key);
        out.push(':');
        canonicalize_value(&map[key], out);
        out.push(',');
    }
    out.push('}');
}

fn canonicalize_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for item in items {
                canonicalize_value(item, out);
                out.push(',');
            }
            out.push(']');
        }
        Value::Object(map) => canonicalize_map(map, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_ref() -> ResourceRef {
        ResourceRef {
            group: None,
            kind: "Pod".into(),
            name: "nginx-1".into(),
            namespace: Some("default".into()),
        }
    }

    #[test]
    fn permuting_detail_keys_does_not_change_fingerprint() {
        let mut a = IndexMap::new();
        a.insert("cve".to_string(), Value::String("CVE-1".into()));
        a.insert("pkg".to_string(), Value::String("libfoo".into()));

        let mut b = IndexMap::new();
        b.insert("pkg".to_string(), Value::String("libfoo".into()));
        b.insert("cve".to_string(), Value::String("CVE-1".into()));

        let rr = resource_ref();
        assert_eq!(
            compute("trivy", "vuln", &rr, &a, &[]),
            compute("trivy", "vuln", &rr, &b, &[])
        );
    }

    #[test]
    fn different_sources_never_collide() {
        let rr = resource_ref();
        let details = IndexMap::new();
        assert_ne!(
            compute("trivy", "vuln", &rr, &details, &[]),
            compute("falco", "vuln", &rr, &details, &[])
        );
    }

    #[test]
    fn selected_fields_ignore_unselected_noise() {
        let rr = resource_ref();
        let mut a = IndexMap::new();
        a.insert("cve".to_string(), Value::String("CVE-1".into()));
        a.insert("scan_id".to_string(), Value::String("run-1".into()));

        let mut b = a.clone();
        b.insert("scan_id".to_string(), Value::String("run-2".into()));

        let fields = vec!["cve".to_string()];
        assert_eq!(
            compute("trivy", "vuln", &rr, &a, &fields),
            compute("trivy", "vuln", &rr, &b, &fields)
        );
    }
}
