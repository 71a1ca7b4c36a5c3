//! A schemaless value tree and a small JSON-path evaluator over it.
//!
//! Adapter payloads (informer objects, webhook bodies, log pattern captures)
//! carry no fixed schema, so normalization and filtering operate on this
//! tagged-union tree rather than threading `serde_json::Value` (or worse,
//! `Box<dyn Any>`) through every stage interface.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A schemaless value: `Null | Bool | Number | String | Array | Object`.
///
/// `Object` preserves insertion order (via [`IndexMap`]) so that a value
/// round-tripped from JSON keeps a stable iteration order for anything that
/// cares to print it; fingerprinting explicitly canonicalizes by sorting
/// keys rather than relying on that order (see [`crate::fingerprint`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(_) | Value::Object(_) => {
                write!(f, "{}", serde_json::to_string(self).unwrap_or_default())
            }
        }
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Evaluate a dotted path with optional `[N]` array indices, e.g.
    /// `"metadata.labels.app"` or `"items[0].status.name"`.
    ///
    /// Returns `None` on any missing segment, type mismatch, or malformed
    /// path — callers treat a miss as "field absent", not an error.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in PathSegments::new(path) {
            current = match segment {
                PathSegment::Key(key) => current.as_object()?.get(key)?,
                PathSegment::Index(idx) => current.as_array()?.get(idx)?,
            };
        }
        Some(current)
    }

    /// Set a dotted path, creating intermediate objects as needed. Array
    /// segments in the path are rejected (the normalizer only ever writes
    /// into `details`, a map); returns `false` if the path could not be
    /// applied because an existing non-object value occupies a prefix.
    pub fn set_path(&mut self, path: &str, value: Value) -> bool {
        let segments: Vec<PathSegment<'_>> = PathSegments::new(path).collect();
        let Some((last, prefix)) = segments.split_last() else {
            return false;
        };
        let PathSegment::Key(last_key) = last else {
            return false;
        };

        let mut current = self;
        for segment in prefix {
            let PathSegment::Key(key) = segment else {
                return false;
            };
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(IndexMap::new());
            }
            let Value::Object(map) = current else {
                unreachable!()
            };
            current = map.entry((*key).to_string()).or_insert(Value::Object(IndexMap::new()));
        }

        if !matches!(current, Value::Object(_)) {
            *current = Value::Object(IndexMap::new());
        }
        let Value::Object(map) = current else {
            unreachable!()
        };
        map.insert((*last_key).to_string(), value);
        true
    }
}

enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Splits `a.b[0].c` into `[Key("a"), Key("b"), Index(0), Key("c")]`.
struct PathSegments<'a> {
    rest: &'a str,
}

impl<'a> PathSegments<'a> {
    fn new(path: &'a str) -> Self {
        Self { rest: path }
    }
}

impl<'a> Iterator for PathSegments<'a> {
    type Item = PathSegment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        if let Some(stripped) = self.rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            let idx: usize = stripped[..end].parse().ok()?;
            self.rest = stripped[end + 1..].trim_start_matches('.');
            return Some(PathSegment::Index(idx));
        }

        let end = self.rest.find(['.', '[']).unwrap_or(self.rest.len());
        let key = &self.rest[..end];
        self.rest = if end == self.rest.len() {
            ""
        } else if self.rest.as_bytes()[end] == b'.' {
            &self.rest[end + 1..]
        } else {
            &self.rest[end..]
        };
        if key.is_empty() {
            return None;
        }
        Some(PathSegment::Key(key))
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(a) => serde_json::Value::Array(a.into_iter().map(Into::into).collect()),
            Value::Object(o) => {
                serde_json::Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::from(serde_json::json!({
            "metadata": {"labels": {"app": "trivy"}},
            "items": [{"name": "first"}, {"name": "second"}],
        }))
    }

    #[test]
    fn get_path_object_traversal() {
        let v = sample();
        assert_eq!(
            v.get_path("metadata.labels.app").and_then(Value::as_str),
            Some("trivy")
        );
    }

    #[test]
    fn get_path_array_index() {
        let v = sample();
        assert_eq!(
            v.get_path("items[1].name").and_then(Value::as_str),
            Some("second")
        );
    }

    #[test]
    fn get_path_missing_is_none() {
        let v = sample();
        assert!(v.get_path("metadata.labels.missing").is_none());
        assert!(v.get_path("items[5].name").is_none());
        assert!(v.get_path("metadata.labels.app.nonexistent").is_none());
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut v = Value::Object(IndexMap::new());
        assert!(v.set_path("details.scan.severity", Value::String("high".into())));
        assert_eq!(
            v.get_path("details.scan.severity").and_then(Value::as_str),
            Some("high")
        );
    }
}
