//! Orchestrator: load → analyze → plan → rewrite → render.
//!
//! The order is fixed and every stage runs exactly once. Failure handling
//! differs per stage:
//!
//! | Stage   | On error                                                |
//! |---------|---------------------------------------------------------|
//! | load    | continue with empty content; message in `load_error`    |
//! | analyze, plan, rewrite | abort with [`ResumeError::StageFailed`]  |
//! | render  | continue; message in [`RenderOutcome::Failed`]          |

use crate::config::{LlmSettings, PipelineConfig, DEFAULT_MODEL};
use crate::error::ResumeError;
use crate::output::{RenderOutcome, RenderReport, RunOutput, RunStats, StageStats};
use crate::pipeline::llm::{CompletionBackend, OpenAiCompatBackend, ProviderBackend};
use crate::pipeline::load::load_document;
use crate::pipeline::render::{render_markdown_to_pdf, RenderOptions};
use crate::pipeline::stages::{self, StageOutcome};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::{ResumeRecord, ResumeRequest, Stage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Run the whole pipeline for one resume.
///
/// # Errors
/// Only fatal problems come back as `Err`:
/// - no usable LLM backend ([`ResumeError::ProviderNotConfigured`]), raised
///   before any stage runs
/// - an LLM stage failing ([`ResumeError::StageFailed`], carrying the
///   partially filled record)
///
/// A load failure or a render failure still returns `Ok`; check
/// [`RunOutput::load_error`] and [`RunOutput::render`].
pub async fn run(request: &ResumeRequest, config: &PipelineConfig) -> Result<RunOutput, ResumeError> {
    let total_start = Instant::now();
    info!("Starting run: {}", request.input.display());

    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));

    // ── Step 1: Resolve backend ──────────────────────────────────────────
    let backend = resolve_backend(config)?;
    info!("Using LLM backend {}", backend.name());

    progress.on_run_start(Stage::ALL.len());
    let mut stats = RunStats::default();
    let mut record = ResumeRecord::from_request(request);

    // ── Step 2: Load ─────────────────────────────────────────────────────
    progress.on_stage_start(Stage::Load);
    let start = Instant::now();
    let load_error = match load_document(&request.input).await {
        Ok(content) => {
            record = record.with_original_content(content);
            progress.on_stage_complete(Stage::Load, record.original_content.len());
            None
        }
        Err(e) => {
            warn!("Could not load {}: {}; continuing with empty content", request.input.display(), e);
            progress.on_stage_error(Stage::Load, &e.to_string());
            Some(e.report())
        }
    };
    stats.push(StageStats {
        stage: Some(Stage::Load),
        duration_ms: start.elapsed().as_millis() as u64,
        ..Default::default()
    });

    // ── Step 3: LLM stages ───────────────────────────────────────────────
    for stage in [Stage::Analyze, Stage::Plan, Stage::Rewrite] {
        progress.on_stage_start(stage);
        let result = match stage {
            Stage::Analyze => stages::analyze(&record, backend.as_ref(), config).await,
            Stage::Plan => stages::plan(&record, backend.as_ref(), config).await,
            _ => stages::rewrite(&record, backend.as_ref(), config).await,
        };
        let StageOutcome {
            record: next,
            stats: stage_stats,
        } = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                progress.on_stage_error(stage, &e.to_string());
                return Err(ResumeError::StageFailed {
                    stage,
                    source: Box::new(e),
                    partial: Box::new(record),
                });
            }
        };
        record = next;
        let produced = stage_output(&record, stage);
        if stage_stats.skipped {
            progress.on_stage_skipped(stage, produced);
        } else {
            progress.on_stage_complete(stage, produced.len());
        }
        stats.push(stage_stats);
    }

    // ── Step 4: Render ───────────────────────────────────────────────────
    progress.on_stage_start(Stage::Render);
    let start = Instant::now();
    let pdf_path = request
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&config.output_dir, &record));
    record = record.with_pdf_output_path(&pdf_path);

    let options = RenderOptions {
        font_path: config.font_path.clone(),
        font_chain: config.font_chain.clone(),
        title: None,
    };
    let render = match render_markdown_to_pdf(&record.optimized_content, &pdf_path, &options).await {
        Ok(report) => {
            record = record.with_pdf_output_path(&report.path);
            progress.on_stage_complete(Stage::Render, report.bytes as usize);
            RenderOutcome::Rendered(report)
        }
        Err(e) => {
            warn!("Rendering failed: {}", e);
            progress.on_stage_error(Stage::Render, &e.to_string());
            RenderOutcome::Failed {
                message: e.to_string(),
            }
        }
    };
    stats.push(StageStats {
        stage: Some(Stage::Render),
        duration_ms: start.elapsed().as_millis() as u64,
        ..Default::default()
    });

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    progress.on_run_complete(render.is_rendered());
    info!(
        "Run complete: {} LLM call(s), {} in / {} out tokens, {}ms",
        stats.llm_calls, stats.total_input_tokens, stats.total_output_tokens, stats.total_duration_ms
    );

    Ok(RunOutput {
        record,
        load_error,
        render,
        stats,
    })
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(request: &ResumeRequest, config: &PipelineConfig) -> Result<RunOutput, ResumeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ResumeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(request, config))
}

/// Load a document and render it as-is, without any LLM stage.
///
/// No credentials are needed. `output` defaults to
/// `<output_dir>/<stem>_optimized.pdf` like a full run.
pub async fn render_file(
    input: impl AsRef<Path>,
    output: Option<PathBuf>,
    config: &PipelineConfig,
) -> Result<RenderReport, ResumeError> {
    let input = input.as_ref();
    info!("Rendering {} without LLM stages", input.display());
    let content = load_document(input).await?;
    let record = ResumeRecord::from_request(&ResumeRequest::new(input)).with_optimized_content(content);
    let path = output.unwrap_or_else(|| default_output_path(&config.output_dir, &record));
    let options = RenderOptions {
        font_path: config.font_path.clone(),
        font_chain: config.font_chain.clone(),
        title: None,
    };
    render_markdown_to_pdf(&record.optimized_content, &path, &options).await
}

/// `<output_dir>/<input stem>_optimized.pdf`
pub fn default_output_path(output_dir: &Path, record: &ResumeRecord) -> PathBuf {
    output_dir.join(format!("{}_optimized.pdf", record.source_stem()))
}

fn stage_output(record: &ResumeRecord, stage: Stage) -> &str {
    match stage {
        Stage::Load => &record.original_content,
        Stage::Analyze => &record.analysis_report,
        Stage::Plan => &record.optimization_plan,
        Stage::Rewrite => &record.optimized_content,
        Stage::Render => "",
    }
}

/// Resolve the completion backend, from most-specific to least-specific:
///
/// 1. **Pre-built backend** (`config.backend`), used as-is. Tests inject a
///    scripted backend here.
/// 2. **Named provider** (`config.provider_name`) through
///    `edgequake_llm::ProviderFactory`, which reads that provider's own key.
///    Model: `config.model`, then `$EDGEQUAKE_MODEL`, then [`DEFAULT_MODEL`].
/// 3. **OpenAI-compatible settings** (`config.llm`, else
///    [`LlmSettings::from_env`]), with `config.model` overriding the model.
fn resolve_backend(config: &PipelineConfig) -> Result<Arc<dyn CompletionBackend>, ResumeError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .clone()
            .or_else(|| std::env::var("EDGEQUAKE_MODEL").ok().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        return Ok(Arc::new(ProviderBackend::from_factory(name, &model)?));
    }

    let mut settings = match config.llm {
        Some(ref settings) => settings.clone(),
        None => LlmSettings::from_env()?,
    };
    if let Some(ref model) = config.model {
        settings.model = model.clone();
    }
    let backend = OpenAiCompatBackend::new(settings, Duration::from_secs(config.api_timeout_secs))?;
    Ok(Arc::new(backend))
}
