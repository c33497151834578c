//! Results of a pipeline run.

use crate::record::{ResumeRecord, Stage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// Final snapshot of the record.
    pub record: ResumeRecord,
    /// `Error: …` message when the input could not be loaded. The run still
    /// completes, with every LLM stage short-circuited.
    pub load_error: Option<String>,
    pub render: RenderOutcome,
    pub stats: RunStats,
}

impl RunOutput {
    /// Path of the rendered PDF, if rendering succeeded.
    pub fn pdf_path(&self) -> Option<&PathBuf> {
        match &self.render {
            RenderOutcome::Rendered(report) => Some(&report.path),
            RenderOutcome::Failed { .. } => None,
        }
    }
}

/// Whether the final stage produced a PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderOutcome {
    Rendered(RenderReport),
    Failed { message: String },
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered(_))
    }

    /// The human-readable line for this outcome.
    pub fn message(&self) -> String {
        match self {
            RenderOutcome::Rendered(report) => report.message(),
            RenderOutcome::Failed { message } => message.clone(),
        }
    }
}

/// What the renderer wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    /// Absolute path of the written PDF.
    pub path: PathBuf,
    pub pages: usize,
    /// Name of the font the chain settled on.
    pub font: String,
    pub bytes: u64,
}

impl RenderReport {
    pub fn message(&self) -> String {
        format!("Successfully generated PDF at: {}", self.path.display())
    }
}

/// Per-stage bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: Option<Stage>,
    /// True when the stage returned its no-op marker without calling the model.
    pub skipped: bool,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl StageStats {
    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage: Some(stage),
            skipped: true,
            ..Default::default()
        }
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub stages: Vec<StageStats>,
    pub llm_calls: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub fn push(&mut self, stats: StageStats) {
        if !stats.skipped && stats.stage.is_some_and(is_llm_stage) {
            self.llm_calls += 1;
        }
        self.total_input_tokens += stats.input_tokens as u64;
        self.total_output_tokens += stats.output_tokens as u64;
        self.stages.push(stats);
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == Some(stage))
    }
}

fn is_llm_stage(stage: Stage) -> bool {
    matches!(stage, Stage::Analyze | Stage::Plan | Stage::Rewrite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_only_real_llm_calls() {
        let mut stats = RunStats::default();
        stats.push(StageStats {
            stage: Some(Stage::Load),
            duration_ms: 3,
            ..Default::default()
        });
        stats.push(StageStats {
            stage: Some(Stage::Analyze),
            input_tokens: 120,
            output_tokens: 80,
            ..Default::default()
        });
        stats.push(StageStats::skipped(Stage::Plan));
        assert_eq!(stats.llm_calls, 1);
        assert_eq!(stats.total_input_tokens, 120);
        assert_eq!(stats.total_output_tokens, 80);
        assert!(stats.stage(Stage::Plan).is_some_and(|s| s.skipped));
    }

    #[test]
    fn render_outcome_serialises_with_status_tag() {
        let outcome = RenderOutcome::Failed {
            message: "Error generating PDF: disk full".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(!outcome.is_rendered());
    }

    #[test]
    fn report_message_contains_path() {
        let report = RenderReport {
            path: PathBuf::from("/tmp/out/cv_optimized.pdf"),
            pages: 1,
            font: "Helvetica".into(),
            bytes: 1024,
        };
        assert_eq!(
            report.message(),
            "Successfully generated PDF at: /tmp/out/cv_optimized.pdf"
        );
    }
}
