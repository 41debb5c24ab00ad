//! The render function contract.
//!
//! A render function never touches request data or the cache directly;
//! everything flows through an explicit context threaded into the call
//! (no ambient state shared between concurrent requests). The context
//! records dynamic signals on the scope chain as they happen, which is
//! what makes classification an observation rather than an annotation.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use strata_core::{hole_placeholder, CacheKey, CachePolicy, RequestContext};
use strata_revalidate::{Lookup, PreparedEntry, RevalidationController};
use strata_store::CacheStatus;

use crate::error::RenderError;
use crate::scope::ScopeManager;
use crate::signal::DynamicSignal;

/// A unit of rendering work. Implementations express their tree through
/// the context: writes, cache scopes, boundaries, and dynamic reads.
#[async_trait]
pub trait Render: Send + Sync {
    async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError>;
}

/// Re-invocable resolver for a dynamic hole.
pub type HoleResolver =
    Arc<dyn Fn(HoleContext) -> BoxFuture<'static, Result<String, RenderError>> + Send + Sync>;

/// A pending dynamic hole: the placeholder is already in the shell and
/// the resolver recomputes the content per request.
#[derive(Clone)]
pub struct Hole {
    /// Stable id within one render (`{ordinal}:{name}`).
    pub id: String,
    /// Fallback shown until the hole resolves.
    pub fallback: String,
    /// Recomputes the hole's content for a request.
    pub resolver: HoleResolver,
}

impl std::fmt::Debug for Hole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hole")
            .field("id", &self.id)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Context handed to hole resolvers. Owned and cheap to clone so the
/// resolver future can be `'static` and run detached from the render
/// walk; the caller inspects the recorders after the future completes.
#[derive(Clone)]
pub struct HoleContext {
    request: Arc<RequestContext>,
    signals: Arc<Mutex<Vec<DynamicSignal>>>,
    tags: Arc<Mutex<BTreeSet<String>>>,
}

impl HoleContext {
    /// Create a context for one hole resolution.
    pub fn new(request: Arc<RequestContext>) -> Self {
        Self {
            request,
            signals: Arc::new(Mutex::new(Vec::new())),
            tags: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Read a request cookie. Recorded as a dynamic signal.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.note_dynamic(DynamicSignal::CookieRead(name.to_string()));
        self.request.cookie(name).map(|s| s.to_string())
    }

    /// Read a request header. Recorded as a dynamic signal.
    pub fn header(&self, name: &str) -> Option<String> {
        self.note_dynamic(DynamicSignal::HeaderRead(name.to_string()));
        self.request.header(name).map(|s| s.to_string())
    }

    /// Record a dynamic signal.
    pub fn note_dynamic(&self, signal: DynamicSignal) {
        self.signals.lock().expect("signal recorder poisoned").push(signal);
    }

    /// Attach a cache tag.
    pub fn tag(&self, tag: impl Into<String>) {
        self.tags.lock().expect("tag recorder poisoned").insert(tag.into());
    }

    /// The request being rendered.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Signals recorded so far.
    pub fn recorded_signals(&self) -> Vec<DynamicSignal> {
        self.signals.lock().expect("signal recorder poisoned").clone()
    }

    /// Tags recorded so far.
    pub fn recorded_tags(&self) -> BTreeSet<String> {
        self.tags.lock().expect("tag recorder poisoned").clone()
    }
}

/// Which walk the context is driving.
#[derive(Debug)]
pub(crate) enum PassMode {
    /// Speculative static pass: writes build the shell, boundaries run
    /// inline for classification.
    Full,
    /// Resume walk over a cached shell: writes are discarded and only
    /// the listed holes collect their resolvers.
    Resume { holes: HashSet<String> },
}

/// Explicit render context threaded through every render call.
pub struct RenderContext {
    request: Arc<RequestContext>,
    policy: CachePolicy,
    base_key: CacheKey,
    controller: Option<Arc<RevalidationController>>,
    mode: PassMode,
    scopes: ScopeManager,
    /// Output buffer stack; cached regions push a buffer so their
    /// content can be captured separately.
    bufs: Vec<String>,
    /// Lineage of open cached regions, extending the fragment key.
    lineage: Vec<String>,
    holes: Vec<Hole>,
    boundary_ordinal: usize,
}

impl RenderContext {
    pub(crate) fn new(
        request: Arc<RequestContext>,
        policy: CachePolicy,
        base_key: CacheKey,
        controller: Option<Arc<RevalidationController>>,
        mode: PassMode,
    ) -> Self {
        Self {
            request,
            policy,
            base_key,
            controller,
            mode,
            scopes: ScopeManager::new(),
            bufs: vec![String::new()],
            lineage: Vec::new(),
            holes: Vec::new(),
            boundary_ordinal: 0,
        }
    }

    /// The request being rendered.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Append static output at the current position.
    pub fn write(&mut self, html: &str) {
        if matches!(self.mode, PassMode::Full) {
            self.bufs
                .last_mut()
                .expect("buffer stack never empty")
                .push_str(html);
        }
    }

    /// Read a request cookie. Recorded as a dynamic signal on the
    /// current scope chain.
    pub fn cookie(&mut self, name: &str) -> Option<String> {
        self.scopes
            .record_dynamic_read(DynamicSignal::CookieRead(name.to_string()));
        self.request.cookie(name).map(|s| s.to_string())
    }

    /// Read a request header. Recorded as a dynamic signal.
    pub fn header(&mut self, name: &str) -> Option<String> {
        self.scopes
            .record_dynamic_read(DynamicSignal::HeaderRead(name.to_string()));
        self.request.header(name).map(|s| s.to_string())
    }

    /// Record a dynamic signal.
    pub fn note_dynamic(&mut self, signal: DynamicSignal) {
        self.scopes.record_dynamic_read(signal);
    }

    /// Attach a cache tag to the current scope.
    pub fn tag(&mut self, tag: &str) {
        self.scopes.record_tag(tag);
    }

    /// Declare an explicit rendering boundary.
    ///
    /// During the static pass the resolver runs inline under an
    /// isolated scope. A resolver that observed no dynamic signal is
    /// folded into the shell; otherwise its speculative output is
    /// discarded (request data never reaches the cached shell), a
    /// placeholder is emitted, and the hole is resolved per request.
    pub async fn hole<F, Fut>(
        &mut self,
        name: &str,
        fallback: &str,
        resolver: F,
    ) -> Result<(), RenderError>
    where
        F: Fn(HoleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, RenderError>> + Send + 'static,
    {
        if !self.lineage.is_empty() {
            return Err(RenderError::failed(format!(
                "boundary '{}' declared inside cached region '{}'; boundaries must wrap cached regions, not the reverse",
                name,
                self.lineage.join("/"),
            )));
        }

        let ordinal = self.boundary_ordinal;
        self.boundary_ordinal += 1;
        let id = format!("{}:{}", ordinal, name);
        let resolver: HoleResolver = Arc::new(move |hctx| resolver(hctx).boxed());

        if let PassMode::Resume { holes } = &self.mode {
            let wanted = holes.contains(&id);
            if wanted {
                self.holes.push(Hole {
                    id,
                    fallback: fallback.to_string(),
                    resolver,
                });
            }
            return Ok(());
        }

        let hctx = HoleContext::new(Arc::clone(&self.request));
        self.scopes.enter(true);
        let result = (resolver.as_ref())(hctx.clone()).await;
        for signal in hctx.recorded_signals() {
            self.scopes.record_dynamic_read(signal);
        }
        for tag in hctx.recorded_tags() {
            self.scopes.record_tag(&tag);
        }
        let outcome = self.scopes.exit();

        match result {
            Ok(content) if !outcome.contaminated => {
                debug!(hole = %id, "boundary observed no dynamic signal, folding into shell");
                self.write(&content);
            }
            Ok(_) => {
                self.write(&hole_placeholder(&id));
                self.holes.push(Hole {
                    id,
                    fallback: fallback.to_string(),
                    resolver,
                });
            }
            Err(err) => {
                // Contained: the fill pass retries and surfaces any
                // repeat failure at the hole's position.
                warn!(hole = %id, error = %err, "boundary failed during static pass");
                self.write(&hole_placeholder(&id));
                self.holes.push(Hole {
                    id,
                    fallback: fallback.to_string(),
                    resolver,
                });
            }
        }
        Ok(())
    }

    /// Declare a nested cached region.
    ///
    /// A fresh fragment replays from the cache and merges its stored
    /// tags; otherwise the body runs under a new scope and the fragment
    /// is persisted only if uncontaminated. A contaminated region is
    /// recomputed every time and its contamination propagates to the
    /// enclosing boundary (or poisons the unit if none exists).
    pub async fn cached(
        &mut self,
        name: &str,
        tags: &[&str],
        body: &dyn Render,
    ) -> Result<(), RenderError> {
        if matches!(self.mode, PassMode::Resume { .. }) {
            // Fragment content is already baked into the cached shell.
            return Ok(());
        }

        let key = self.fragment_key(name);
        let controller = if self.policy.enabled {
            self.controller.clone()
        } else {
            None
        };

        if let Some(controller) = &controller {
            if let Lookup::Hit { entry, status: CacheStatus::Hit } = controller.lookup(&key).await
            {
                match String::from_utf8(entry.payload) {
                    Ok(html) => {
                        debug!(key = %key, "replaying fresh cached fragment");
                        for tag in &entry.tags {
                            self.scopes.record_tag(tag);
                        }
                        self.write(&html);
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(key = %key, error = %err, "cached fragment not utf-8, recomputing");
                    }
                }
            }
        }

        self.scopes.enter(false);
        for tag in tags {
            self.scopes.record_tag(tag);
        }
        self.lineage.push(name.to_string());
        self.bufs.push(String::new());

        let result = body.render(self).await;

        let content = self.bufs.pop().expect("buffer stack never empty");
        self.lineage.pop();
        let outcome = self.scopes.exit();
        result?;

        self.write(&content);

        if let Some(controller) = controller.filter(|_| !outcome.contaminated) {
            controller
                .store_entry(
                    &key,
                    PreparedEntry {
                        payload: content.into_bytes(),
                        tags: outcome.tags,
                        revalidate_after: self.policy.revalidate.after_secs(),
                        expire_at: self.policy.expire_secs,
                    },
                )
                .await;
        }
        Ok(())
    }

    fn fragment_key(&self, name: &str) -> CacheKey {
        let mut key = self.base_key.clone();
        for segment in &self.lineage {
            key = key.child(segment);
        }
        key.child(name)
    }

    pub(crate) fn into_parts(mut self) -> (String, Vec<Hole>, ScopeManager) {
        let html = self.bufs.remove(0);
        (html, self.holes, self.scopes)
    }
}
