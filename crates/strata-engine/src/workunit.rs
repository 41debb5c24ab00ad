//! Route work units.

use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::{CacheKey, CacheKeyBuilder, CachePolicy};
use strata_render::Render;

/// One route (or one parameter instantiation of a route) to render:
/// the render function plus the cache policy governing it. Two work
/// units with the same route and parameters share a cache entry.
#[derive(Clone)]
pub struct RouteWorkUnit {
    /// Normalized route path, e.g. `/products/:id` instantiated.
    pub route_id: String,
    /// Resolved route parameters.
    pub params: BTreeMap<String, String>,
    /// The render function for this route.
    pub render: Arc<dyn Render>,
    /// Cache policy governing the unit.
    pub policy: CachePolicy,
}

impl RouteWorkUnit {
    pub fn new(route_id: impl Into<String>, render: Arc<dyn Render>, policy: CachePolicy) -> Self {
        Self {
            route_id: route_id.into(),
            params: BTreeMap::new(),
            render,
            policy,
        }
    }

    /// Add a resolved route parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Structured cache key for this unit: path plus sorted parameters.
    pub fn cache_key(&self) -> CacheKey {
        CacheKeyBuilder::new(&self.route_id).params(&self.params).build()
    }
}

impl std::fmt::Debug for RouteWorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteWorkUnit")
            .field("route_id", &self.route_id)
            .field("params", &self.params)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use strata_render::{RenderContext, RenderError};

    struct Nop;

    #[async_trait]
    impl Render for Nop {
        async fn render(&self, _ctx: &mut RenderContext) -> Result<(), RenderError> {
            Ok(())
        }
    }

    #[test]
    fn test_same_params_same_key() {
        let policy = CachePolicy::revalidate_after(60);
        let a = RouteWorkUnit::new("/products", Arc::new(Nop), policy.clone())
            .with_param("id", "42")
            .with_param("lang", "en");
        let b = RouteWorkUnit::new("/products", Arc::new(Nop), policy)
            .with_param("lang", "en")
            .with_param("id", "42");
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
