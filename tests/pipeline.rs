//! Integration tests for the full pipeline.
//!
//! A scripted in-memory backend stands in for the LLM, and every render uses
//! the built-in Helvetica chain so results do not depend on installed fonts.

use async_trait::async_trait;
use resume_polish::{
    run, Completion, CompletionBackend, CompletionRequest, ErrorKind, FontChain, PipelineConfig,
    PipelineProgressCallback, RenderOutcome, ResumeError, ResumeRequest, Stage,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers calls from a queue; an `Err` entry makes that call fail.
struct Scripted {
    answers: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl Scripted {
    fn new(answers: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .map(|a| a.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ResumeError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.answers.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(Completion {
                content: text,
                input_tokens: 100,
                output_tokens: 50,
            }),
            Some(Err(message)) => Err(ResumeError::LlmApiError { message }),
            None => Err(ResumeError::LlmApiError {
                message: "script exhausted".into(),
            }),
        }
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl PipelineProgressCallback for Events {
    fn on_stage_start(&self, stage: Stage) {
        self.0.lock().unwrap().push(format!("start {stage}"));
    }
    fn on_stage_skipped(&self, stage: Stage, _reason: &str) {
        self.0.lock().unwrap().push(format!("skip {stage}"));
    }
    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.0.lock().unwrap().push(format!("error {stage}"));
    }
    fn on_run_complete(&self, rendered: bool) {
        self.0.lock().unwrap().push(format!("done {rendered}"));
    }
}

fn config(backend: Arc<Scripted>, out: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .backend(backend)
        .output_dir(out)
        .font_chain(FontChain::builtin_only())
        .build()
        .unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn chinese_resume_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "简历.md", "# 姓名\n电话：123");
    let backend = Scripted::new(vec![
        Ok("缺少工作经历。"),
        Ok("1. 补充工作经历"),
        Ok("```markdown\n# 姓名\n电话：123\n\n## 工作经历\n- 待补充\n```"),
    ]);
    let cfg = config(backend.clone(), &dir.path().join("out"));

    let output = run(&ResumeRequest::new(&input), &cfg).await.unwrap();

    assert!(output.load_error.is_none());
    assert_eq!(output.record.original_content, "# 姓名\n电话：123");
    assert_eq!(output.record.analysis_report, "缺少工作经历。");
    assert_eq!(output.record.optimization_plan, "1. 补充工作经历");
    assert_eq!(
        output.record.optimized_content,
        "# 姓名\n电话：123\n\n## 工作经历\n- 待补充\n"
    );

    let pdf = output.pdf_path().expect("rendered").clone();
    assert!(pdf.is_absolute());
    assert!(pdf.ends_with("out/简历_optimized.pdf"));
    assert!(std::fs::metadata(&pdf).unwrap().len() > 0);
    assert_eq!(output.record.pdf_output_path.as_ref(), Some(&pdf));
    assert_eq!(output.stats.llm_calls, 3);
    assert_eq!(output.stats.total_input_tokens, 300);
    assert_eq!(backend.calls().len(), 3);
}

#[tokio::test]
async fn stages_receive_previous_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "cv.txt", "Jane Doe\nRust engineer");
    let backend = Scripted::new(vec![Ok("ANALYSIS-X"), Ok("PLAN-Y"), Ok("# Jane Doe\n")]);
    let cfg = config(backend.clone(), dir.path());
    let request = ResumeRequest::new(&input)
        .requirements("Target: SRE roles")
        .template("# Name\n## Skills\n");

    run(&request, &cfg).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls[0].stage, Stage::Analyze);
    assert!(calls[0].user.contains("Rust engineer"));
    assert!(calls[0].user.contains("Target: SRE roles"));
    assert!(calls[1].user.contains("ANALYSIS-X"));
    assert!(calls[2].user.contains("PLAN-Y"));
    assert!(calls[2].user.contains("## Skills"));
    assert!(calls[2].system.contains("Target: SRE roles"));
}

#[tokio::test]
async fn explicit_output_path_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "cv.md", "# Jane");
    let target = dir.path().join("nested/final.pdf");
    let backend = Scripted::new(vec![Ok("a"), Ok("p"), Ok("# Jane\n\nSummary")]);
    let cfg = config(backend, dir.path());

    let output = run(&ResumeRequest::new(&input).output(&target), &cfg)
        .await
        .unwrap();

    assert!(target.exists());
    assert!(output.render.message().contains("final.pdf"));
}

// ── Load failures ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_format_short_circuits_llm_stages() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "cv.docx", "binary-ish");
    let backend = Scripted::new(vec![]);
    let events = Arc::new(Events::default());
    let cfg = PipelineConfig::builder()
        .backend(backend.clone())
        .output_dir(dir.path())
        .font_chain(FontChain::builtin_only())
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let output = run(&ResumeRequest::new(&input), &cfg).await.unwrap();

    let err = output.load_error.as_deref().unwrap();
    assert!(err.starts_with("Error:"));
    assert!(err.contains(".docx"));
    assert_eq!(output.record.original_content, "");
    assert_eq!(output.record.analysis_report, "No content to analyze.");
    assert_eq!(output.record.optimization_plan, "No analysis available.");
    assert_eq!(output.record.optimized_content, "Cannot rewrite empty resume.");
    assert!(backend.calls().is_empty());
    assert_eq!(output.stats.llm_calls, 0);

    let events = events.0.lock().unwrap().clone();
    assert!(events.contains(&"error load".to_string()));
    assert!(events.contains(&"skip analyze".to_string()));
    assert!(events.contains(&"skip rewrite".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("done true"));
}

#[tokio::test]
async fn missing_file_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![]);
    let cfg = config(backend.clone(), dir.path());

    let output = run(&ResumeRequest::new(dir.path().join("nope.txt")), &cfg)
        .await
        .unwrap();

    assert!(output.load_error.unwrap().contains("File not found"));
    assert!(backend.calls().is_empty());
    assert!(output.render.is_rendered());
}

// ── Stage failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn plan_failure_returns_partial_record() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "cv.md", "# Jane");
    let backend = Scripted::new(vec![Ok("critique"), Err("HTTP 500: boom")]);
    let cfg = config(backend.clone(), dir.path());

    let err = run(&ResumeRequest::new(&input), &cfg).await.unwrap_err();

    match &err {
        ResumeError::StageFailed { stage, partial, .. } => {
            assert_eq!(*stage, Stage::Plan);
            assert_eq!(partial.original_content, "# Jane");
            assert_eq!(partial.analysis_report, "critique");
            assert_eq!(partial.optimization_plan, "");
            assert!(partial.pdf_output_path.is_none());
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Llm);
    assert!(err.to_string().contains("boom"));
    assert_eq!(backend.calls().len(), 2);
}

// ── Render failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn render_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "cv.md", "# Jane");
    let blocker = write(dir.path(), "blocker", "not a directory");
    let backend = Scripted::new(vec![Ok("a"), Ok("p"), Ok("# Jane")]);
    let cfg = config(backend, &blocker);

    let output = run(&ResumeRequest::new(&input), &cfg).await.unwrap();

    match &output.render {
        RenderOutcome::Failed { message } => assert!(message.contains("blocker")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(output.pdf_path().is_none());
    assert_eq!(output.record.optimized_content, "# Jane\n");
}

#[tokio::test]
async fn run_output_serialises_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "cv.md", "# Jane");
    let backend = Scripted::new(vec![Ok("a"), Ok("p"), Ok("# Jane")]);
    let output = run(&ResumeRequest::new(&input), &config(backend, dir.path()))
        .await
        .unwrap();

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["render"]["status"], "rendered");
    assert_eq!(json["stats"]["stages"].as_array().unwrap().len(), 5);
    assert_eq!(json["record"]["analysis_report"], "a");
}
