//! Request descriptors and fetch policies.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MuxResult;

/// Per-request rule governing how cache and network interact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve a cache hit without touching the network; fetch and populate on miss.
    #[default]
    CacheFirst,
    /// Serve a cache hit immediately and fetch anyway, updating on change.
    CacheAndNetwork,
    /// Always fetch; the result still populates the cache.
    NetworkOnly,
    /// Never fetch; a miss is an error.
    CacheOnly,
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchPolicy::CacheFirst => "cache-first",
            FetchPolicy::CacheAndNetwork => "cache-and-network",
            FetchPolicy::NetworkOnly => "network-only",
            FetchPolicy::CacheOnly => "cache-only",
        };
        f.write_str(name)
    }
}

/// Opaque identity of a submitted request.
///
/// Assigned by the multiplexer and unique for its lifetime. A refresh keeps
/// the id so that responses to earlier sends can be recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Defaults merged into every request that does not override them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestDefaults {
    pub fetch_policy: FetchPolicy,
    pub skip_cache: bool,
}

/// Caller-side description of a request, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    route: String,
    data: Value,
    fetch_policy: Option<FetchPolicy>,
    skip_cache: Option<bool>,
}

impl RequestSpec {
    /// Creates a spec for `route` with empty-object data.
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            data: Value::Object(Default::default()),
            fetch_policy: None,
            skip_cache: None,
        }
    }

    /// Sets the request payload from any serializable value.
    ///
    /// Fails with `InvalidRequestData` when the value cannot be represented
    /// as JSON (for example a map with non-string keys).
    pub fn data<T: Serialize + ?Sized>(mut self, data: &T) -> MuxResult<Self> {
        self.data = serde_json::to_value(data)?;
        Ok(self)
    }

    /// Sets the request payload from an already-built JSON value.
    pub fn json(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    pub fn skip_cache(mut self, skip: bool) -> Self {
        self.skip_cache = Some(skip);
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn payload(&self) -> &Value {
        &self.data
    }

    /// Builds an immutable descriptor, filling unset fields from `defaults`.
    pub fn into_descriptor(self, id: RequestId, defaults: &RequestDefaults) -> RequestDescriptor {
        RequestDescriptor {
            id,
            route: self.route,
            data: self.data,
            fetch_policy: self.fetch_policy.unwrap_or(defaults.fetch_policy),
            skip_cache: self.skip_cache.unwrap_or(defaults.skip_cache),
        }
    }
}

/// A submitted request. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    id: RequestId,
    route: String,
    data: Value,
    fetch_policy: FetchPolicy,
    skip_cache: bool,
}

impl RequestDescriptor {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        self.fetch_policy
    }

    pub fn skip_cache(&self) -> bool {
        self.skip_cache
    }

    /// Returns a copy with the same id that bypasses the cache on read.
    pub fn refreshed(&self) -> Self {
        Self {
            skip_cache: true,
            ..self.clone()
        }
    }
}
