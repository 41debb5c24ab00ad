//! The request pipeline: lookup, classify, stream, fill.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use strata_core::{CacheKey, CachePolicy, Classification, RequestContext};
use strata_render::{
    run_resume_walk, run_static_pass, Hole, HoleContext, Render, ShellArtifact, StaticPassOutput,
};
use strata_revalidate::{
    Lookup, PreparedEntry, RegenError, RegenFuture, RegenOutcome, RevalidationController,
    RevalidationRequest,
};
use strata_store::CacheStatus;
use strata_stream::{AssembledDocument, Chunk, StreamAssembler};

use crate::error::EngineError;
use crate::phase::{PhaseTracker, RenderPhase};
use crate::workunit::RouteWorkUnit;

/// Output slot shared between a foreground regeneration and the caller
/// that started it, so a dynamic classification serves the pass it
/// already ran instead of rendering twice.
type OutputSlot = Arc<Mutex<Option<StaticPassOutput>>>;

/// One streamed response: the shell chunk is already queued when this
/// is returned, holes follow in completion order, and `completion`
/// resolves to the fully assembled document.
#[derive(Debug)]
pub struct RenderResponse {
    /// How the unit classified (for a cached artifact, how it
    /// classified when the artifact was computed).
    pub classification: Classification,
    /// Cache disposition of this response.
    pub cache_status: CacheStatus,
    /// The chunk stream, shell first.
    pub chunks: UnboundedReceiver<Chunk>,
    completion: JoinHandle<Result<AssembledDocument, EngineError>>,
}

impl RenderResponse {
    /// Wait for every hole and return the assembled document.
    pub async fn document(self) -> Result<AssembledDocument, EngineError> {
        self.completion
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
    }
}

/// Drives a route work unit through its lifecycle: serve the cached
/// artifact when one exists (refreshing stale ones in the background),
/// otherwise classify through the single-flight controller and either
/// cache the shell or serve a per-request render.
pub struct PrerenderOrchestrator {
    controller: Arc<RevalidationController>,
}

impl PrerenderOrchestrator {
    pub fn new(controller: Arc<RevalidationController>) -> Self {
        Self { controller }
    }

    /// The underlying revalidation controller.
    pub fn controller(&self) -> &Arc<RevalidationController> {
        &self.controller
    }

    /// Apply a targeted invalidation. Entries are evicted, not
    /// recomputed; the next request regenerates lazily.
    pub async fn invalidate(&self, request: RevalidationRequest) -> u64 {
        self.controller.invalidate(request).await
    }

    /// Handle one request for a route work unit.
    pub async fn handle(
        &self,
        unit: &RouteWorkUnit,
        request: RequestContext,
    ) -> Result<RenderResponse, EngineError> {
        let request = Arc::new(request);
        let key = unit.cache_key();
        let mut phase = PhaseTracker::new();
        phase.advance(RenderPhase::ClassifyingStatic)?;

        if !unit.policy.enabled {
            debug!(key = %key, "caching disabled for unit, serving per-request");
            let output = run_static_pass(
                unit.render.as_ref(),
                Arc::clone(&request),
                &unit.policy,
                key,
                None,
            )
            .await
            .map_err(|e| {
                phase.fail();
                EngineError::Classification(e.to_string())
            })?;
            return self.serve_local(request, output, CacheStatus::Bypass, phase);
        }

        match self.controller.lookup(&key).await {
            Lookup::Hit { entry, status } => {
                if status == CacheStatus::Stale {
                    // Serve stale now, refresh in the background. The
                    // refresh renders without request identity so it can
                    // never bake this caller's cookies into the shell.
                    let regen = Self::build_regen(
                        Arc::clone(&unit.render),
                        unit.policy.clone(),
                        key.clone(),
                        Self::revalidation_request(unit),
                        Arc::clone(&self.controller),
                        None,
                    );
                    self.controller.spawn_background_regenerate(&key, regen);
                }

                let artifact = ShellArtifact::from_payload(&entry.payload).map_err(|e| {
                    phase.fail();
                    EngineError::Artifact(e.to_string())
                })?;
                phase.advance(RenderPhase::Cached)?;
                self.serve_artifact(unit, request, key, artifact, entry.tags, status, None, phase)
            }
            Lookup::Miss => {
                let slot: OutputSlot = Arc::new(Mutex::new(None));
                let regen = Self::build_regen(
                    Arc::clone(&unit.render),
                    unit.policy.clone(),
                    key.clone(),
                    Arc::clone(&request),
                    Arc::clone(&self.controller),
                    Some(Arc::clone(&slot)),
                );

                match self.controller.regenerate(&key, regen).await {
                    Ok(RegenOutcome::Cacheable(entry)) => {
                        let artifact = ShellArtifact::from_payload(&entry.payload).map_err(|e| {
                            phase.fail();
                            EngineError::Artifact(e.to_string())
                        })?;
                        phase.advance(RenderPhase::ShellReady)?;
                        // The regeneration this caller owned stashed its
                        // holes; a joined flight leaves the slot empty
                        // and the resume walk recollects them.
                        let local_holes = slot
                            .lock()
                            .expect("output slot poisoned")
                            .take()
                            .map(|output| output.holes);
                        self.serve_artifact(
                            unit,
                            request,
                            key,
                            artifact,
                            entry.tags,
                            CacheStatus::Miss,
                            local_holes,
                            phase,
                        )
                    }
                    Ok(RegenOutcome::Uncacheable) => {
                        info!(key = %key, "unit classified dynamic, serving per-request");
                        let taken = slot.lock().expect("output slot poisoned").take();
                        let output = match taken {
                            Some(output) => output,
                            // A follower joined someone else's flight;
                            // render its own per-request pass.
                            None => run_static_pass(
                                unit.render.as_ref(),
                                Arc::clone(&request),
                                &unit.policy,
                                key,
                                Some(Arc::clone(&self.controller)),
                            )
                            .await
                            .map_err(|e| {
                                phase.fail();
                                EngineError::Classification(e.to_string())
                            })?,
                        };
                        self.serve_local(request, output, CacheStatus::Miss, phase)
                    }
                    Err(err) => {
                        phase.fail();
                        Err(err.into())
                    }
                }
            }
        }
    }

    /// Stream a cached or freshly computed artifact: shell first, then
    /// the holes, resolved concurrently per request.
    #[allow(clippy::too_many_arguments)]
    fn serve_artifact(
        &self,
        unit: &RouteWorkUnit,
        request: Arc<RequestContext>,
        key: CacheKey,
        artifact: ShellArtifact,
        tags: BTreeSet<String>,
        status: CacheStatus,
        local_holes: Option<Vec<Hole>>,
        mut phase: PhaseTracker,
    ) -> Result<RenderResponse, EngineError> {
        let classification = artifact.classification();
        let (mut assembler, chunks) = StreamAssembler::new(artifact.holes.clone());
        assembler.begin_shell(artifact.shell.clone())?;
        phase.advance(RenderPhase::Streaming)?;

        let render = Arc::clone(&unit.render);
        let policy = unit.policy.clone();
        let controller = Arc::clone(&self.controller);
        let completion = tokio::spawn(async move {
            let was_partial = !artifact.is_complete();
            let result = async {
                if artifact.is_complete() {
                    return Ok((assembler.finish()?, false));
                }
                let holes = match local_holes {
                    Some(holes) => holes,
                    None => {
                        let wanted: HashSet<String> =
                            artifact.holes.iter().map(|s| s.id.clone()).collect();
                        run_resume_walk(
                            render.as_ref(),
                            Arc::clone(&request),
                            &policy,
                            key.clone(),
                            wanted,
                        )
                        .await
                        .map_err(|e| EngineError::Classification(e.to_string()))?
                    }
                };
                // An artifact hole the walk did not reproduce (the
                // render function changed under a live cache entry)
                // keeps its fallback; siblings still resolve.
                let mut clean = true;
                for slot in &artifact.holes {
                    if !holes.iter().any(|h| h.id == slot.id) {
                        warn!(hole = %slot.id, "cached hole not reproduced by render, keeping fallback");
                        clean = false;
                        assembler.fail_hole(&slot.id, "hole no longer rendered".to_string())?;
                    }
                }
                let (doc, all_clean) = drive_fill(assembler, holes, request).await?;
                Ok((doc, all_clean && clean))
            }
            .await;

            match result {
                Ok((doc, all_clean)) => {
                    if was_partial && all_clean && policy.retroactive_complete {
                        // Every hole resolved without touching request
                        // data, so this document is valid for everyone.
                        let complete = ShellArtifact::complete(doc.html.clone());
                        match complete.to_payload() {
                            Ok(payload) => {
                                let mut tags = tags;
                                tags.extend(policy.tags.iter().cloned());
                                info!(key = %key, "retroactively caching complete document");
                                controller
                                    .store_entry(
                                        &key,
                                        PreparedEntry {
                                            payload,
                                            tags,
                                            revalidate_after: policy.revalidate.after_secs(),
                                            expire_at: policy.expire_secs,
                                        },
                                    )
                                    .await;
                            }
                            Err(err) => {
                                warn!(key = %key, error = %err, "retroactive artifact encode failed");
                            }
                        }
                    }
                    let _ = phase.advance(RenderPhase::Done);
                    Ok(doc)
                }
                Err(err) => {
                    phase.fail();
                    Err(err)
                }
            }
        });

        Ok(RenderResponse {
            classification,
            cache_status: status,
            chunks,
            completion,
        })
    }

    /// Stream a per-request render that never touches the store.
    fn serve_local(
        &self,
        request: Arc<RequestContext>,
        output: StaticPassOutput,
        status: CacheStatus,
        mut phase: PhaseTracker,
    ) -> Result<RenderResponse, EngineError> {
        phase.advance(RenderPhase::FullyDynamic)?;
        let classification = output.classification;
        let slots = output.slots();
        let (mut assembler, chunks) = StreamAssembler::new(slots);
        assembler.begin_shell(output.html)?;
        phase.advance(RenderPhase::Streaming)?;

        let holes = output.holes;
        let completion = tokio::spawn(async move {
            match drive_fill(assembler, holes, request).await {
                Ok((doc, _)) => {
                    let _ = phase.advance(RenderPhase::Done);
                    Ok(doc)
                }
                Err(err) => {
                    phase.fail();
                    Err(err)
                }
            }
        });

        Ok(RenderResponse {
            classification,
            cache_status: status,
            chunks,
            completion,
        })
    }

    /// Build the regeneration future the controller runs under
    /// single-flight. `Ok(None)` signals a dynamic classification; the
    /// optional slot hands the pass output back to the owning caller.
    fn build_regen(
        render: Arc<dyn Render>,
        policy: CachePolicy,
        key: CacheKey,
        request: Arc<RequestContext>,
        controller: Arc<RevalidationController>,
        slot: Option<OutputSlot>,
    ) -> RegenFuture {
        async move {
            let output = run_static_pass(
                render.as_ref(),
                request,
                &policy,
                key,
                Some(controller),
            )
            .await
            .map_err(|e| RegenError::Render(e.to_string()))?;

            if output.classification == Classification::Dynamic {
                if let Some(slot) = slot {
                    *slot.lock().expect("output slot poisoned") = Some(output);
                }
                return Ok(None);
            }

            let artifact = ShellArtifact::new(output.html.clone(), output.slots());
            let payload = artifact
                .to_payload()
                .map_err(|e| RegenError::Artifact(e.to_string()))?;
            let mut tags = output.tags.clone();
            tags.extend(policy.tags.iter().cloned());
            let prepared = PreparedEntry {
                payload,
                tags,
                revalidate_after: policy.revalidate.after_secs(),
                expire_at: policy.expire_secs,
            };
            if let Some(slot) = slot {
                *slot.lock().expect("output slot poisoned") = Some(output);
            }
            Ok(Some(prepared))
        }
        .boxed()
    }

    /// Identity-free request used for background revalidation, built
    /// from the unit's route and parameters only.
    fn revalidation_request(unit: &RouteWorkUnit) -> Arc<RequestContext> {
        let mut request = RequestContext::new(&unit.route_id);
        for (name, value) in &unit.params {
            request = request.with_param(name, value);
        }
        Arc::new(request)
    }
}

/// Resolve every hole concurrently, streaming each as it lands, and
/// fold the result into the final document. The second value reports
/// whether every resolver succeeded without observing a dynamic signal.
async fn drive_fill(
    mut assembler: StreamAssembler,
    holes: Vec<Hole>,
    request: Arc<RequestContext>,
) -> Result<(AssembledDocument, bool), EngineError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    for hole in holes {
        let tx = tx.clone();
        let request = Arc::clone(&request);
        tokio::spawn(async move {
            let hctx = HoleContext::new(request);
            let result = (hole.resolver.as_ref())(hctx.clone()).await;
            let clean = hctx.recorded_signals().is_empty();
            let _ = tx.send((hole.id, result, clean));
        });
    }
    drop(tx);

    let mut all_clean = true;
    while let Some((id, result, clean)) = rx.recv().await {
        all_clean &= clean;
        match result {
            Ok(html) => assembler.resolve_hole(&id, html)?,
            Err(err) => {
                warn!(hole = %id, error = %err, "hole resolution failed, client keeps fallback");
                all_clean = false;
                assembler.fail_hole(&id, err.to_string())?;
            }
        }
    }

    let doc = assembler.finish()?;
    Ok((doc, all_clean))
}
