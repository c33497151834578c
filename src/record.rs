//! The record threaded through the pipeline.
//!
//! One [`ResumeRecord`] is created per run from a [`ResumeRequest`]. Every
//! stage reads the snapshot it is handed and returns a *new* snapshot with
//! exactly one additional field filled in, so a stage can be unit-tested by
//! constructing the record it expects and checking the one it returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What the caller asks for: an input file plus optional steering.
#[derive(Debug, Clone, Default)]
pub struct ResumeRequest {
    /// Resume to load (`.txt`, `.md` or `.pdf`).
    pub input: PathBuf,
    /// Free-text requirements ("emphasise backend work", "keep it to one page").
    pub requirements: Option<String>,
    /// Markdown template whose section structure the rewrite must follow.
    /// `None` uses [`crate::prompts::DEFAULT_RESUME_TEMPLATE`].
    pub template: Option<String>,
    /// Destination PDF. `None` derives `<output_dir>/<stem>_optimized.pdf`.
    pub output: Option<PathBuf>,
}

impl ResumeRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn requirements(mut self, text: impl Into<String>) -> Self {
        self.requirements = Some(text.into());
        self
    }

    pub fn template(mut self, text: impl Into<String>) -> Self {
        self.template = Some(text.into());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

/// Snapshot of a run. All text fields start empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub source_path: PathBuf,
    pub user_requirements: String,
    /// Empty means "use the built-in default template".
    pub template: String,
    pub original_content: String,
    pub analysis_report: String,
    pub optimization_plan: String,
    pub optimized_content: String,
    pub pdf_output_path: Option<PathBuf>,
}

impl ResumeRecord {
    /// Start a record from a request. Blank requirements/templates collapse
    /// to empty strings.
    pub fn from_request(request: &ResumeRequest) -> Self {
        Self {
            source_path: request.input.clone(),
            user_requirements: request
                .requirements
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            template: request
                .template
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_default()
                .to_string(),
            ..Default::default()
        }
    }

    /// `Some(requirements)` when the user supplied any.
    pub fn requirements(&self) -> Option<&str> {
        let r = self.user_requirements.trim();
        (!r.is_empty()).then_some(r)
    }

    pub fn has_content(&self) -> bool {
        !self.original_content.trim().is_empty()
    }

    pub fn source_stem(&self) -> String {
        file_stem(&self.source_path)
    }

    pub fn with_original_content(&self, content: impl Into<String>) -> Self {
        Self {
            original_content: content.into(),
            ..self.clone()
        }
    }

    pub fn with_analysis(&self, report: impl Into<String>) -> Self {
        Self {
            analysis_report: report.into(),
            ..self.clone()
        }
    }

    pub fn with_plan(&self, plan: impl Into<String>) -> Self {
        Self {
            optimization_plan: plan.into(),
            ..self.clone()
        }
    }

    pub fn with_optimized_content(&self, content: impl Into<String>) -> Self {
        Self {
            optimized_content: content.into(),
            ..self.clone()
        }
    }

    pub fn with_pdf_output_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            pdf_output_path: Some(path.into()),
            ..self.clone()
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "resume".to_string())
}

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Analyze,
    Plan,
    Rewrite,
    Render,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Load,
        Stage::Analyze,
        Stage::Plan,
        Stage::Rewrite,
        Stage::Render,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Analyze => "analyze",
            Stage::Plan => "plan",
            Stage::Rewrite => "rewrite",
            Stage::Render => "render",
        }
    }

    /// 1-based position in [`Stage::ALL`].
    pub fn position(&self) -> usize {
        Stage::ALL.iter().position(|s| s == self).unwrap_or(0) + 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_request_normalises_optional_fields() {
        let req = ResumeRequest::new("cv.pdf")
            .requirements("  be formal  ")
            .template("   \n");
        let rec = ResumeRecord::from_request(&req);
        assert_eq!(rec.user_requirements, "be formal");
        assert_eq!(rec.template, "");
        assert_eq!(rec.requirements(), Some("be formal"));
        assert!(!rec.has_content());
    }

    #[test]
    fn with_methods_leave_the_original_untouched() {
        let rec = ResumeRecord::default().with_original_content("hello");
        let next = rec.with_analysis("critique");
        assert_eq!(rec.analysis_report, "");
        assert_eq!(next.analysis_report, "critique");
        assert_eq!(next.original_content, "hello");
    }

    #[test]
    fn source_stem_falls_back_to_resume() {
        let rec = ResumeRecord::from_request(&ResumeRequest::new("uploads/张三.pdf"));
        assert_eq!(rec.source_stem(), "张三");
        assert_eq!(ResumeRecord::default().source_stem(), "resume");
    }

    #[test]
    fn stage_order_and_display() {
        let names: Vec<String> = Stage::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["load", "analyze", "plan", "rewrite", "render"]);
        assert_eq!(Stage::Load.position(), 1);
        assert_eq!(Stage::Render.position(), 5);
    }
}
