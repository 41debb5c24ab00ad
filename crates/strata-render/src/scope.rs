//! Nested cache scope tracking.
//!
//! Scopes form a tree addressed by id in an arena. Tags accumulate
//! upward on exit regardless of contamination (tags describe what the
//! content depends on, not whether it ended up cacheable). Dynamic
//! reads contaminate the current scope and every ancestor up to the
//! nearest isolated boundary; a contaminated scope's output is never
//! written to the cache store.

use std::collections::BTreeSet;

use crate::signal::DynamicSignal;

/// Arena index of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// One nested cached-computation region within a render.
#[derive(Debug)]
pub struct CacheScope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    /// Tags accumulated by this scope and its exited children.
    pub tags: BTreeSet<String>,
    /// Signals observed directly in this scope.
    pub signals: Vec<DynamicSignal>,
    /// Whether a dynamic read reached this scope.
    pub contaminated: bool,
    /// Isolated boundaries stop contamination from propagating to
    /// their ancestors (hole boundaries are isolated, cached regions
    /// are not).
    pub isolated: bool,
}

/// Immutable snapshot returned when a scope exits.
#[derive(Debug, Clone)]
pub struct ScopeOutcome {
    pub tags: BTreeSet<String>,
    pub contaminated: bool,
}

/// Tracks the scope chain for one render invocation.
#[derive(Debug)]
pub struct ScopeManager {
    arena: Vec<CacheScope>,
    current: usize,
}

impl ScopeManager {
    /// Create a manager with an open root scope.
    pub fn new() -> Self {
        Self {
            arena: vec![CacheScope {
                id: ScopeId(0),
                parent: None,
                tags: BTreeSet::new(),
                signals: Vec::new(),
                contaminated: false,
                isolated: false,
            }],
            current: 0,
        }
    }

    /// Enter a child scope of the current scope.
    pub fn enter(&mut self, isolated: bool) -> ScopeId {
        let id = ScopeId(self.arena.len());
        self.arena.push(CacheScope {
            id,
            parent: Some(ScopeId(self.current)),
            tags: BTreeSet::new(),
            signals: Vec::new(),
            contaminated: false,
            isolated,
        });
        self.current = id.0;
        id
    }

    /// Exit the current scope, merging its tags into the parent and
    /// returning a snapshot. The root scope cannot be exited; calling
    /// exit on it only snapshots.
    pub fn exit(&mut self) -> ScopeOutcome {
        let outcome = ScopeOutcome {
            tags: self.arena[self.current].tags.clone(),
            contaminated: self.arena[self.current].contaminated,
        };
        if let Some(parent) = self.arena[self.current].parent {
            let tags = outcome.tags.clone();
            self.arena[parent.0].tags.extend(tags);
            self.current = parent.0;
        }
        outcome
    }

    /// Record a tag on the current scope.
    pub fn record_tag(&mut self, tag: &str) {
        self.arena[self.current].tags.insert(tag.to_string());
    }

    /// Record a dynamic read: contaminates the current scope and every
    /// ancestor up to (and including) the nearest isolated boundary,
    /// which absorbs the contamination.
    pub fn record_dynamic_read(&mut self, signal: DynamicSignal) {
        self.arena[self.current].signals.push(signal);
        let mut idx = self.current;
        loop {
            self.arena[idx].contaminated = true;
            if self.arena[idx].isolated {
                break;
            }
            match self.arena[idx].parent {
                Some(parent) => idx = parent.0,
                None => break,
            }
        }
    }

    /// Whether an unguarded dynamic read reached the root scope.
    pub fn root_contaminated(&self) -> bool {
        self.arena[0].contaminated
    }

    /// Tags accumulated at the root.
    pub fn root_tags(&self) -> BTreeSet<String> {
        self.arena[0].tags.clone()
    }

    /// Look up a scope by id.
    pub fn scope(&self, id: ScopeId) -> &CacheScope {
        &self.arena[id.0]
    }

    /// Id of the currently open scope.
    pub fn current_id(&self) -> ScopeId {
        ScopeId(self.current)
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}
