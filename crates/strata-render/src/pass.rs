//! The speculative static pass and the resume walk.
//!
//! The static pass runs the render function once with full recording:
//! the output buffer becomes the shell, boundaries either fold in or
//! leave placeholders, and the root scope's contamination decides the
//! classification. The resume walk re-runs the same function over a
//! cached shell purely to recollect hole resolvers; it writes nothing.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::debug;

use strata_core::{CacheKey, CachePolicy, Classification, HoleSlot, RequestContext};
use strata_revalidate::RevalidationController;

use crate::context::{Hole, PassMode, Render, RenderContext};
use crate::error::RenderError;

/// Everything the static pass produced for one render unit.
#[derive(Debug)]
pub struct StaticPassOutput {
    pub classification: Classification,
    /// Shell HTML (placeholders embedded) for static and partially
    /// static units; the full per-request document for dynamic ones.
    pub html: String,
    /// Holes pending per-request resolution, in shell order.
    pub holes: Vec<Hole>,
    /// Tags accumulated across the whole unit.
    pub tags: BTreeSet<String>,
}

impl StaticPassOutput {
    /// Slot descriptors for the pending holes, as persisted in an
    /// artifact.
    pub fn slots(&self) -> Vec<HoleSlot> {
        self.holes
            .iter()
            .map(|h| HoleSlot::new(&h.id, &h.fallback))
            .collect()
    }
}

/// Run the speculative static pass over a render function.
///
/// Classification falls out of what was observed: an unguarded dynamic
/// read anywhere makes the unit dynamic, pending holes make it
/// partially static, and a clean walk makes it fully static.
pub async fn run_static_pass(
    render: &dyn Render,
    request: Arc<RequestContext>,
    policy: &CachePolicy,
    base_key: CacheKey,
    controller: Option<Arc<RevalidationController>>,
) -> Result<StaticPassOutput, RenderError> {
    let mut ctx = RenderContext::new(
        request,
        policy.clone(),
        base_key.clone(),
        controller,
        PassMode::Full,
    );
    render.render(&mut ctx).await?;

    let (html, holes, scopes) = ctx.into_parts();
    let tags = scopes.root_tags();
    let classification = if scopes.root_contaminated() {
        Classification::Dynamic
    } else if holes.is_empty() {
        Classification::Static
    } else {
        Classification::PartiallyStatic
    };
    debug!(key = %base_key, %classification, holes = holes.len(), "static pass complete");

    Ok(StaticPassOutput {
        classification,
        html,
        holes,
        tags,
    })
}

/// Re-walk a render function over a cached shell to recollect the
/// resolvers for the artifact's holes. Writes are discarded and cached
/// regions are skipped; only boundaries whose ids appear in the
/// artifact register.
pub async fn run_resume_walk(
    render: &dyn Render,
    request: Arc<RequestContext>,
    policy: &CachePolicy,
    base_key: CacheKey,
    hole_ids: HashSet<String>,
) -> Result<Vec<Hole>, RenderError> {
    let mut ctx = RenderContext::new(
        request,
        policy.clone(),
        base_key,
        None,
        PassMode::Resume { holes: hole_ids },
    );
    render.render(&mut ctx).await?;
    let (_, holes, _) = ctx.into_parts();
    Ok(holes)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use strata_core::{CacheKeyBuilder, ManualClock};
    use strata_store::MemoryStore;

    use crate::context::HoleContext;

    fn request() -> Arc<RequestContext> {
        Arc::new(RequestContext::new("/p"))
    }

    fn key() -> CacheKey {
        CacheKeyBuilder::new("/p").build()
    }

    struct StaticPage;

    #[async_trait]
    impl Render for StaticPage {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.write("<header>site</header>");
            ctx.tag("home");
            ctx.write("<main>hello</main>");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_signal_free_render_is_static_and_repeatable() {
        let policy = CachePolicy::revalidate_after(60);
        let first = run_static_pass(&StaticPage, request(), &policy, key(), None)
            .await
            .unwrap();
        let second = run_static_pass(&StaticPage, request(), &policy, key(), None)
            .await
            .unwrap();

        assert_eq!(first.classification, Classification::Static);
        assert_eq!(first.html, "<header>site</header><main>hello</main>");
        assert_eq!(first.html, second.html);
        assert!(first.holes.is_empty());
        assert!(first.tags.contains("home"));
    }

    struct PoisonedPage;

    #[async_trait]
    impl Render for PoisonedPage {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            let theme = ctx.cookie("theme").unwrap_or_else(|| "light".into());
            ctx.write(&format!("<body class=\"{}\"></body>", theme));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unguarded_cookie_read_poisons_whole_unit() {
        let policy = CachePolicy::revalidate_after(60);
        let request = Arc::new(RequestContext::new("/p").with_cookie("theme", "dark"));
        let output = run_static_pass(&PoisonedPage, request, &policy, key(), None)
            .await
            .unwrap();

        assert_eq!(output.classification, Classification::Dynamic);
        assert!(output.holes.is_empty());
        // The per-request document still rendered for this caller.
        assert!(output.html.contains("dark"));
    }

    struct GreetingPage;

    #[async_trait]
    impl Render for GreetingPage {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.write("<header>site</header>");
            ctx.hole("greeting", "loading...", |hctx: HoleContext| async move {
                let name = hctx.cookie("name").unwrap_or_else(|| "guest".into());
                Ok(format!("<p>hi {}</p>", name))
            })
            .await?;
            ctx.write("<footer>fin</footer>");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_guarded_cookie_read_leaves_hole_in_shell() {
        let policy = CachePolicy::revalidate_after(60);
        let request = Arc::new(RequestContext::new("/p").with_cookie("name", "ada"));
        let output = run_static_pass(&GreetingPage, request, &policy, key(), None)
            .await
            .unwrap();

        assert_eq!(output.classification, Classification::PartiallyStatic);
        assert_eq!(output.holes.len(), 1);
        assert_eq!(output.holes[0].id, "0:greeting");
        assert!(output.html.contains("<!--hole:0:greeting-->"));
        // Request data never reaches the shell, even though the
        // resolver ran and produced it.
        assert!(!output.html.contains("ada"));
        assert!(output.html.ends_with("<footer>fin</footer>"));
    }

    struct CleanBoundaryPage;

    #[async_trait]
    impl Render for CleanBoundaryPage {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.write("<header/>");
            ctx.hole("promo", "...", |_hctx: HoleContext| async move {
                Ok("<aside>sale</aside>".to_string())
            })
            .await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_boundary_without_signals_folds_into_shell() {
        let policy = CachePolicy::revalidate_after(60);
        let output = run_static_pass(&CleanBoundaryPage, request(), &policy, key(), None)
            .await
            .unwrap();

        assert_eq!(output.classification, Classification::Static);
        assert!(output.holes.is_empty());
        assert_eq!(output.html, "<header/><aside>sale</aside>");
    }

    struct FailingBoundaryPage;

    #[async_trait]
    impl Render for FailingBoundaryPage {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.write("<header/>");
            ctx.hole("flaky", "...", |_hctx: HoleContext| async move {
                Err(RenderError::failed("upstream down"))
            })
            .await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_boundary_failure_contained_to_hole() {
        let policy = CachePolicy::revalidate_after(60);
        let output = run_static_pass(&FailingBoundaryPage, request(), &policy, key(), None)
            .await
            .unwrap();

        assert_eq!(output.classification, Classification::PartiallyStatic);
        assert_eq!(output.holes.len(), 1);
        assert!(output.html.contains("<!--hole:0:flaky-->"));
    }

    struct CountedFooter {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Render for CountedFooter {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.tag("footer-data");
            ctx.write("<footer>v1</footer>");
            Ok(())
        }
    }

    struct PageWithFooter {
        footer: CountedFooter,
    }

    #[async_trait]
    impl Render for PageWithFooter {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.write("<main/>");
            ctx.cached("footer", &["footer"], &self.footer).await
        }
    }

    #[tokio::test]
    async fn test_cached_region_computes_once_then_replays() {
        let clock = Arc::new(ManualClock::at(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let controller = Arc::new(RevalidationController::new(store.clone(), clock));
        let policy = CachePolicy::revalidate_after(60);
        let runs = Arc::new(AtomicUsize::new(0));
        let page = PageWithFooter {
            footer: CountedFooter { runs: runs.clone() },
        };

        let first = run_static_pass(&page, request(), &policy, key(), Some(controller.clone()))
            .await
            .unwrap();
        let second = run_static_pass(&page, request(), &policy, key(), Some(controller))
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(first.html, "<main/><footer>v1</footer>");
        assert_eq!(first.html, second.html);
        // Replay restores the fragment's tags for the enclosing unit.
        assert!(second.tags.contains("footer"));
        assert!(second.tags.contains("footer-data"));
        assert_eq!(store.len().await, 1);
    }

    struct PersonalFooter;

    #[async_trait]
    impl Render for PersonalFooter {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            let sid = ctx.cookie("sid").unwrap_or_default();
            ctx.write(&format!("<footer>{}</footer>", sid));
            Ok(())
        }
    }

    struct PageWithPersonalFooter;

    #[async_trait]
    impl Render for PageWithPersonalFooter {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.write("<main/>");
            ctx.cached("footer", &["footer"], &PersonalFooter).await
        }
    }

    #[tokio::test]
    async fn test_contaminated_region_never_persisted() {
        let clock = Arc::new(ManualClock::at(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let controller = Arc::new(RevalidationController::new(store.clone(), clock));
        let policy = CachePolicy::revalidate_after(60);
        let request = Arc::new(RequestContext::new("/p").with_cookie("sid", "s-1"));

        let output = run_static_pass(
            &PageWithPersonalFooter,
            request,
            &policy,
            key(),
            Some(controller),
        )
        .await
        .unwrap();

        // Cached regions are not isolation boundaries, so the read
        // poisons the whole unit and nothing lands in the store.
        assert_eq!(output.classification, Classification::Dynamic);
        assert!(output.html.contains("s-1"));
        assert_eq!(store.len().await, 0);
    }

    struct HoleInsideCached;

    #[async_trait]
    impl Render for HoleInsideCached {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.hole("inner", "...", |_hctx: HoleContext| async move {
                Ok(String::new())
            })
            .await
        }
    }

    struct PageWithIllegalNesting;

    #[async_trait]
    impl Render for PageWithIllegalNesting {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.cached("region", &[], &HoleInsideCached).await
        }
    }

    #[tokio::test]
    async fn test_boundary_inside_cached_region_rejected() {
        let policy = CachePolicy::revalidate_after(60);
        let result =
            run_static_pass(&PageWithIllegalNesting, request(), &policy, key(), None).await;
        assert!(result.is_err());
    }

    struct TwoHolePage {
        region_runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Render for TwoHolePage {
        async fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
            ctx.write("<header/>");
            ctx.hole("a", "...", |_hctx: HoleContext| async move {
                Ok("<a/>".to_string())
            })
            .await?;
            ctx.cached(
                "region",
                &[],
                &CountedFooter {
                    runs: self.region_runs.clone(),
                },
            )
            .await?;
            ctx.hole("b", "...", |hctx: HoleContext| async move {
                let ua = hctx.header("user-agent").unwrap_or_default();
                Ok(format!("<b>{}</b>", ua))
            })
            .await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_resume_walk_registers_only_artifact_holes() {
        let policy = CachePolicy::revalidate_after(60);
        let region_runs = Arc::new(AtomicUsize::new(0));
        let page = TwoHolePage {
            region_runs: region_runs.clone(),
        };

        let mut wanted = HashSet::new();
        wanted.insert("1:b".to_string());
        let holes = run_resume_walk(&page, request(), &policy, key(), wanted)
            .await
            .unwrap();

        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].id, "1:b");
        // The resume walk skips cached regions entirely.
        assert_eq!(region_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hole_ordinals_stable_across_passes() {
        let policy = CachePolicy::revalidate_after(60);
        let page = TwoHolePage {
            region_runs: Arc::new(AtomicUsize::new(0)),
        };
        let request = Arc::new(RequestContext::new("/p").with_header("user-agent", "bot"));

        let output = run_static_pass(&page, request, &policy, key(), None)
            .await
            .unwrap();

        // Boundary "a" is clean and folds in; "b" reads a header and
        // stays a hole, keeping the ordinal it was declared with.
        assert_eq!(output.classification, Classification::PartiallyStatic);
        assert_eq!(output.holes.len(), 1);
        assert_eq!(output.holes[0].id, "1:b");
        assert!(output.html.contains("<a/>"));
        assert!(output.html.contains("<!--hole:1:b-->"));
    }
}
