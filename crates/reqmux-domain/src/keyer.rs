//! Deduplication keys derived from a request's route and data.
//!
//! Two requests with structurally equal `(route, data)` always map to the same
//! key. Object field order does not matter: data is encoded canonically with
//! keys sorted before hashing.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Content address of a `(route, data)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives dedup keys. Must be pure and deterministic.
pub trait RequestKeyer: Send + Sync {
    fn key(&self, route: &str, data: &Value) -> DedupKey;
}

/// Default keyer: hex SHA-256 over the route and canonical JSON of the data.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Keyer;

impl RequestKeyer for Sha256Keyer {
    fn key(&self, route: &str, data: &Value) -> DedupKey {
        let mut hasher = Sha256::new();
        hasher.update(route.as_bytes());
        // route cannot contain NUL in practice; it separates the two fields
        hasher.update([0u8]);
        hasher.update(canonical_json(data).as_bytes());

        DedupKey(hex::encode(hasher.finalize()))
    }
}

impl<F> RequestKeyer for F
where
    F: Fn(&str, &Value) -> DedupKey + Send + Sync,
{
    fn key(&self, route: &str, data: &Value) -> DedupKey {
        self(route, data)
    }
}

/// Encodes `value` as compact JSON with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // a String always serializes
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
