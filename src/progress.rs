//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! real-time events as pages are routed, extracted, refined, and merged.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database record,
//! or a terminal progress bar — without the library knowing anything about how
//! the host application communicates. The trait is `Send + Sync` so it works
//! correctly when pages are processed concurrently via `tokio::spawn`.
//!
//! # Example
//!
//! ```rust
//! use docuflow::progress::{PipelineProgressCallback, NoopProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_index: usize, total_pages: usize, successful_steps: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("page {done}/{total_pages} done ({successful_steps} steps succeeded), index {page_index}");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the pipeline as each page moves through routing, extraction,
/// refinement, and merging.
///
/// Implementations must be `Send + Sync` (pages are processed concurrently,
/// bounded by `concurrency_limit`, via `tokio::spawn`). All methods have
/// default no-op implementations so callers only override what they need.
///
/// # Thread safety
///
/// Every method may be called concurrently from different page tasks.
/// Implementations must protect shared mutable state with appropriate
/// synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before any page is processed.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page's extraction plan is requested from the Router.
    fn on_page_routing_start(&self, page_index: usize, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// Called once the Router has produced an extraction plan for a page.
    ///
    /// `strategy_count` is the number of steps in the plan; `is_fallback` is
    /// true when routing itself failed and the page fell back to the default
    /// plan rather than a model-recommended one.
    fn on_page_routed(&self, page_index: usize, strategy_count: usize, is_fallback: bool) {
        let _ = (page_index, strategy_count, is_fallback);
    }

    /// Called before each extraction step (one per strategy in the plan) runs.
    fn on_extraction_step_start(&self, page_index: usize, step_number: u32, strategy: &str) {
        let _ = (page_index, step_number, strategy);
    }

    /// Called after each extraction step completes, successfully or not.
    fn on_extraction_step_complete(&self, page_index: usize, step_number: u32, success: bool) {
        let _ = (page_index, step_number, success);
    }

    /// Called once per refinement cycle a page goes through (never called for
    /// pages with refinement disabled or that needed zero cycles).
    fn on_refinement_cycle(&self, page_index: usize, cycle: u32, new_step_count: usize) {
        let _ = (page_index, cycle, new_step_count);
    }

    /// Called when a page is fully merged and its `PageResult` finalized.
    fn on_page_complete(&self, page_index: usize, total_pages: usize, successful_steps: usize) {
        let _ = (page_index, total_pages, successful_steps);
    }

    /// Called when a page could not be recovered by any routing/retry/fallback
    /// step and was recorded in `DocumentOutput::errors` instead.
    ///
    /// `error` is a human-readable description, passed by value so this
    /// method stays callable from inside `tokio::spawn` (a `&str` parameter
    /// would force a higher-ranked `for<'a> &'a str` bound that is not
    /// generally `Send`).
    fn on_page_error(&self, page_index: usize, total_pages: usize, error: String) {
        let _ = (page_index, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        routed: Arc<AtomicUsize>,
        steps_started: Arc<AtomicUsize>,
        completes: Arc<AtomicUsize>,
        errors: Arc<AtomicUsize>,
        started_total: Arc<AtomicUsize>,
        completed_total: Arc<AtomicUsize>,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_document_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_routed(&self, _page_index: usize, _strategy_count: usize, _is_fallback: bool) {
            self.routed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_step_start(&self, _page_index: usize, _step_number: u32, _strategy: &str) {
            self.steps_started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_index: usize, _total_pages: usize, _successful_steps: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_index: usize, _total_pages: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _total_pages: usize, success_count: usize) {
            self.completed_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start(5);
        cb.on_page_routing_start(0, 5);
        cb.on_page_routed(0, 2, false);
        cb.on_extraction_step_start(0, 1, "basic");
        cb.on_extraction_step_complete(0, 1, true);
        cb.on_refinement_cycle(0, 1, 1);
        cb.on_page_complete(0, 5, 2);
        cb.on_page_error(1, 5, "some error".to_string());
        cb.on_document_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            routed: Arc::new(AtomicUsize::new(0)),
            steps_started: Arc::new(AtomicUsize::new(0)),
            completes: Arc::new(AtomicUsize::new(0)),
            errors: Arc::new(AtomicUsize::new(0)),
            started_total: Arc::new(AtomicUsize::new(0)),
            completed_total: Arc::new(AtomicUsize::new(0)),
        };

        tracker.on_document_start(3);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);

        tracker.on_page_routed(0, 2, false);
        tracker.on_extraction_step_start(0, 1, "basic");
        tracker.on_page_complete(0, 3, 2);

        tracker.on_page_routed(1, 1, true);
        tracker.on_extraction_step_start(1, 1, "comprehensive");
        tracker.on_page_error(1, 3, "fallback exhausted".to_string());

        assert_eq!(tracker.routed.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.steps_started.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_document_complete(3, 2);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn PipelineProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_document_start(10);
        cb.on_page_routing_start(0, 10);
        cb.on_page_complete(0, 10, 3);
    }

    /// Regression guard: `on_page_error` takes `error: String`, not `&str`, to
    /// avoid the HRTB `for<'a> &'a str` that would make the future holding this
    /// callback non-`Send` and break use inside `tokio::spawn`.
    #[tokio::test]
    async fn on_page_error_is_send_when_used_in_spawn() {
        use std::sync::Mutex;

        struct StringCollector {
            errors: Arc<Mutex<Vec<String>>>,
        }

        impl PipelineProgressCallback for StringCollector {
            fn on_page_error(&self, _page_index: usize, _total_pages: usize, error: String) {
                self.errors.lock().unwrap().push(error);
            }
        }

        let collector = Arc::new(StringCollector {
            errors: Arc::new(Mutex::new(Vec::new())),
        });

        let cb: Arc<dyn PipelineProgressCallback> =
            Arc::clone(&collector) as Arc<dyn PipelineProgressCallback>;

        tokio::spawn(async move {
            cb.on_page_error(1, 5, "error from spawn".to_string());
        })
        .await
        .unwrap();

        let errors = collector.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], "error from spawn");
    }
}
