//! Targeted invalidation requests.

/// What an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// A single cache key (and its scoped descendants).
    Key(String),
    /// Every entry carrying a tag.
    Tag(String),
    /// Every entry belonging to a route path, including its params,
    /// scoped fragments, and subpaths.
    Path(String),
}

/// What caused an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationTrigger {
    /// Entry aged past its revalidation window.
    TimeBased,
    /// Explicit invalidation call.
    OnDemand,
}

/// An invalidation request. Consumed immediately by the controller;
/// eviction is eager, regeneration is lazy (the next request performs
/// it).
#[derive(Debug, Clone)]
pub struct RevalidationRequest {
    pub target: InvalidationTarget,
    pub trigger: InvalidationTrigger,
}

impl RevalidationRequest {
    /// On-demand invalidation of a tag.
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            target: InvalidationTarget::Tag(tag.into()),
            trigger: InvalidationTrigger::OnDemand,
        }
    }

    /// On-demand invalidation of a route path.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            target: InvalidationTarget::Path(path.into()),
            trigger: InvalidationTrigger::OnDemand,
        }
    }

    /// On-demand invalidation of one cache key.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            target: InvalidationTarget::Key(key.into()),
            trigger: InvalidationTrigger::OnDemand,
        }
    }
}
