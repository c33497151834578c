//! The three LLM stages: analyze, plan, rewrite.
//!
//! Each stage takes the current snapshot and returns a new one with exactly
//! one field filled in. A stage whose input is blank returns its marker
//! string from [`crate::prompts`] and makes no call at all.

use crate::config::PipelineConfig;
use crate::error::ResumeError;
use crate::output::StageStats;
use crate::pipeline::llm::{Completion, CompletionBackend, CompletionRequest};
use crate::prompts;
use crate::record::{ResumeRecord, Stage};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A stage's new snapshot plus what it cost.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub record: ResumeRecord,
    pub stats: StageStats,
}

impl StageOutcome {
    fn skipped(stage: Stage, record: ResumeRecord) -> Self {
        Self {
            record,
            stats: StageStats::skipped(stage),
        }
    }
}

/// Critique the original resume.
pub async fn analyze(
    record: &ResumeRecord,
    backend: &dyn CompletionBackend,
    config: &PipelineConfig,
) -> Result<StageOutcome, ResumeError> {
    if !record.has_content() {
        warn!("analyze: original content is empty, skipping model call");
        return Ok(StageOutcome::skipped(
            Stage::Analyze,
            record.with_analysis(prompts::NO_CONTENT_TO_ANALYZE),
        ));
    }

    let request = build_request(
        Stage::Analyze,
        prompts::ANALYSIS_SYSTEM_PROMPT.to_string(),
        prompts::analysis_user_message(&record.original_content, record.requirements()),
        config,
    );
    let (completion, stats) = call_model(backend, &request, config).await?;
    Ok(StageOutcome {
        record: record.with_analysis(completion.content),
        stats,
    })
}

/// Turn the critique into an ordered revision plan.
pub async fn plan(
    record: &ResumeRecord,
    backend: &dyn CompletionBackend,
    config: &PipelineConfig,
) -> Result<StageOutcome, ResumeError> {
    if !record.has_content() || record.analysis_report.trim().is_empty() {
        warn!("plan: no analysis to work from, skipping model call");
        return Ok(StageOutcome::skipped(
            Stage::Plan,
            record.with_plan(prompts::NO_ANALYSIS_AVAILABLE),
        ));
    }

    let request = build_request(
        Stage::Plan,
        prompts::PLANNING_SYSTEM_PROMPT.to_string(),
        prompts::planning_user_message(&record.analysis_report, record.requirements()),
        config,
    );
    let (completion, stats) = call_model(backend, &request, config).await?;
    Ok(StageOutcome {
        record: record.with_plan(completion.content),
        stats,
    })
}

/// Rewrite the resume against the template and plan.
///
/// The template is the caller's if one was given, otherwise
/// [`prompts::DEFAULT_RESUME_TEMPLATE`]. When `config.clean_output` is set the
/// answer goes through [`crate::pipeline::postprocess::clean_markdown`].
pub async fn rewrite(
    record: &ResumeRecord,
    backend: &dyn CompletionBackend,
    config: &PipelineConfig,
) -> Result<StageOutcome, ResumeError> {
    if !record.has_content() {
        warn!("rewrite: original content is empty, skipping model call");
        return Ok(StageOutcome::skipped(
            Stage::Rewrite,
            record.with_optimized_content(prompts::CANNOT_REWRITE_EMPTY),
        ));
    }

    let template = if record.template.trim().is_empty() {
        prompts::DEFAULT_RESUME_TEMPLATE
    } else {
        record.template.as_str()
    };

    let request = build_request(
        Stage::Rewrite,
        prompts::rewrite_system_prompt(record.requirements()),
        prompts::rewrite_user_message(
            template,
            &record.original_content,
            &record.optimization_plan,
        ),
        config,
    );
    let (completion, stats) = call_model(backend, &request, config).await?;

    let content = if config.clean_output {
        crate::pipeline::postprocess::clean_markdown(&completion.content)
    } else {
        completion.content
    };
    Ok(StageOutcome {
        record: record.with_optimized_content(content),
        stats,
    })
}

fn build_request(
    stage: Stage,
    system: String,
    user: String,
    config: &PipelineConfig,
) -> CompletionRequest {
    CompletionRequest {
        stage,
        system,
        user,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        model: config.model.clone(),
    }
}

/// One call, bounded by `api_timeout_secs`.
async fn call_model(
    backend: &dyn CompletionBackend,
    request: &CompletionRequest,
    config: &PipelineConfig,
) -> Result<(Completion, StageStats), ResumeError> {
    let started = Instant::now();
    info!("{}: calling {}", request.stage, backend.name());

    let completion = tokio::time::timeout(
        Duration::from_secs(config.api_timeout_secs),
        backend.complete(request),
    )
    .await
    .map_err(|_| ResumeError::ApiTimeout {
        stage: request.stage,
        secs: config.api_timeout_secs,
    })??;

    let duration_ms = started.elapsed().as_millis() as u64;
    debug!(
        stage = %request.stage,
        input_tokens = completion.input_tokens,
        output_tokens = completion.output_tokens,
        duration_ms,
        "completion received"
    );

    let stats = StageStats {
        stage: Some(request.stage),
        skipped: false,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        duration_ms,
    };
    Ok((completion, stats))
}
