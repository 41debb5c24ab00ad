//! Cache key composition.
//!
//! Keys stay structured rather than hashed: the store interface supports
//! path invalidation via key prefixes, so the route path must lead the
//! key and scope lineage must trail it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A cache key uniquely identifying a cached artifact.
///
/// Layout: `{path}?{sorted params}#{scope lineage}`. Keys for nested
/// cached regions extend the lineage segment, so invalidating a route
/// key prefix also covers its scoped fragments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a child key for a nested cached region.
    pub fn child(&self, segment: &str) -> CacheKey {
        if self.0.contains('#') {
            CacheKey(format!("{}/{}", self.0, segment))
        } else {
            CacheKey(format!("{}#{}", self.0, segment))
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builder for composing cache keys.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    path: String,
    params: BTreeMap<String, String>,
    lineage: Vec<String>,
}

impl CacheKeyBuilder {
    /// Create a builder for a route path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: BTreeMap::new(),
            lineage: Vec::new(),
        }
    }

    /// Include normalized route parameters.
    pub fn params(mut self, params: &BTreeMap<String, String>) -> Self {
        self.params.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Include a single parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Append a cache-scope lineage segment.
    pub fn scope(mut self, segment: impl Into<String>) -> Self {
        self.lineage.push(segment.into());
        self
    }

    /// Build the cache key.
    pub fn build(&self) -> CacheKey {
        let mut key = self.path.clone();

        if !self.params.is_empty() {
            let pairs: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&pairs.join("&"));
        }

        if !self.lineage.is_empty() {
            key.push('#');
            key.push_str(&self.lineage.join("/"));
        }

        CacheKey(key)
    }
}
