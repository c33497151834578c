//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the run moves through load → analyze → plan → rewrite → render.
//! Events are advisory: the pipeline never waits on, or changes behaviour
//! because of, a callback.
//!
//! # Example
//!
//! ```rust
//! use resume_polish::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct PrintStages;
//!
//! impl PipelineProgressCallback for PrintStages {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("--- {stage} ---");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(PrintStages))
//!     .build()
//!     .unwrap();
//! ```

use crate::record::Stage;
use std::sync::Arc;

/// Called by the orchestrator around each stage.
///
/// All methods default to no-ops so implementors only override what they
/// need. Implementations must be `Send + Sync` because the run is async and
/// may hop threads between stages.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first stage.
    fn on_run_start(&self, total_stages: usize) {
        let _ = total_stages;
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// `output_len` is the byte length of the field the stage produced.
    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let _ = (stage, output_len);
    }

    /// The stage returned its no-op marker without calling the model.
    fn on_stage_skipped(&self, stage: Stage, reason: &str) {
        let _ = (stage, reason);
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once after the render stage, whether or not it succeeded.
    fn on_run_complete(&self, rendered: bool) {
        let _ = rendered;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start:{stage}"));
        }

        fn on_stage_skipped(&self, stage: Stage, _reason: &str) {
            self.events.lock().unwrap().push(format!("skip:{stage}"));
        }

        fn on_run_complete(&self, rendered: bool) {
            self.events.lock().unwrap().push(format!("done:{rendered}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(5);
        cb.on_stage_start(Stage::Load);
        cb.on_stage_complete(Stage::Load, 42);
        cb.on_stage_skipped(Stage::Analyze, "no content");
        cb.on_stage_error(Stage::Plan, "boom");
        cb.on_run_complete(false);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Analyze);
        rec.on_stage_skipped(Stage::Analyze, "empty");
        rec.on_stage_complete(Stage::Analyze, 10); // default no-op
        rec.on_run_complete(true);
        assert_eq!(
            *rec.events.lock().unwrap(),
            ["start:analyze", "skip:analyze", "done:true"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(5);
        cb.on_stage_start(Stage::Render);
    }
}
