//! CLI binary for resume-polish.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use resume_polish::{
    render_file, run, LlmSettings, PipelineConfig, PipelineProgressCallback, ProgressCallback,
    RenderOutcome, ResumeError, ResumeRequest, RunOutput, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over the five stages plus a log line per stage.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<Stage, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(Stage::ALL.len() as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len}  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, stage: Stage) -> String {
        let secs = self
            .start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&stage)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_stages: usize) {
        self.bar.set_length(total_stages as u64);
        self.bar.set_prefix("Polishing");
    }

    fn on_stage_start(&self, stage: Stage) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(stage, Instant::now());
        self.bar.set_message(stage_label(stage).to_string());
    }

    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let size = match stage {
            Stage::Render => format!("{output_len:>6} bytes"),
            _ => format!("{output_len:>6} chars"),
        };
        self.bar.println(format!(
            "  {} {:<9} {}  {}",
            green("✓"),
            stage.as_str(),
            dim(&size),
            self.elapsed(stage)
        ));
        self.bar.inc(1);
    }

    fn on_stage_skipped(&self, stage: Stage, reason: &str) {
        self.bar.println(format!(
            "  {} {:<9} {}  {}",
            yellow("–"),
            stage.as_str(),
            dim(reason),
            self.elapsed(stage)
        ));
        self.bar.inc(1);
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<9} {}  {}",
            red("✗"),
            stage.as_str(),
            red(&msg),
            self.elapsed(stage)
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _rendered: bool) {
        self.bar.finish_and_clear();
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Load => "Reading resume…",
        Stage::Analyze => "Analyzing…",
        Stage::Plan => "Planning revisions…",
        Stage::Rewrite => "Rewriting…",
        Stage::Render => "Typesetting PDF…",
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Polish a resume (writes output/cv_optimized.pdf)
  resume-polish cv.pdf

  # Choose the output file and state what you are applying for
  resume-polish cv.md -o polished.pdf --requirements "Senior backend roles, keep it to one page"

  # Use your own section layout
  resume-polish cv.txt --template my-template.md

  # Keep the rewritten markdown and print the critique and plan
  resume-polish cv.pdf --save-markdown --show-report

  # Typeset an existing markdown resume, no LLM (no API key needed)
  resume-polish --render-only cv.md -o cv.pdf

  # Another provider via edgequake-llm
  resume-polish --provider anthropic --model claude-sonnet-4-20250514 cv.pdf

ENVIRONMENT VARIABLES:
  DEEPSEEK_API_KEY     API key for the default OpenAI-compatible endpoint
  OPENAI_API_KEY       Used when DEEPSEEK_API_KEY is not set
  DEEPSEEK_BASE_URL    Endpoint base URL (default https://api.deepseek.com/v1)
  OPENAI_BASE_URL      Used when DEEPSEEK_BASE_URL is not set
  DEEPSEEK_MODEL       Model ID (default deepseek-chat)
  RESUME_POLISH_FONT   TrueType font to embed (CJK resumes need a CJK font)
  RUST_LOG             Log filter, e.g. resume_polish=debug

  A .env file in the working directory is loaded first.

FONTS:
  The PDF embeds the first usable TrueType font from: --font,
  $RESUME_POLISH_FONT, ./fonts/*.ttf, common CJK system fonts, common Latin
  system fonts. Without one, the built-in Helvetica is used and non-Latin
  characters print as '?'. Font collections (.ttc) are not supported.
"#;

/// Rewrite resumes with an LLM and typeset them as PDF.
#[derive(Parser, Debug)]
#[command(
    name = "resume-polish",
    version,
    about = "Rewrite a resume with an LLM and typeset it as PDF",
    long_about = "Reads a resume (.txt, .md or .pdf), asks an OpenAI-compatible LLM to analyse it \
and plan improvements, rewrites it against a markdown template, and renders the result to an A4 PDF \
with an embedded font.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Resume file: .txt, .md or .pdf.
    input: PathBuf,

    /// Write the PDF here instead of <output-dir>/<name>_optimized.pdf.
    #[arg(short, long, env = "RESUME_POLISH_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for the derived output path.
    #[arg(long, env = "RESUME_POLISH_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Markdown template whose section structure the rewrite follows.
    #[arg(long, env = "RESUME_POLISH_TEMPLATE")]
    template: Option<PathBuf>,

    /// Extra requirements for the rewrite (target role, tone, length…).
    #[arg(long, env = "RESUME_POLISH_REQUIREMENTS", conflicts_with = "requirements_file")]
    requirements: Option<String>,

    /// Read the requirements from a file.
    #[arg(long)]
    requirements_file: Option<PathBuf>,

    /// LLM model ID (default: $DEEPSEEK_MODEL or deepseek-chat).
    #[arg(long, env = "RESUME_POLISH_MODEL")]
    model: Option<String>,

    /// Named edgequake-llm provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "RESUME_POLISH_PROVIDER",
        long_help = "Use an edgequake-llm provider instead of the OpenAI-compatible endpoint.\n\
          The provider reads its own key (OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, …)."
    )]
    provider: Option<String>,

    /// OpenAI-compatible base URL (overrides DEEPSEEK_BASE_URL / OPENAI_BASE_URL).
    #[arg(long, env = "RESUME_POLISH_BASE_URL")]
    base_url: Option<String>,

    /// TrueType font to embed in the PDF.
    #[arg(long, env = "RESUME_POLISH_FONT")]
    font: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RESUME_POLISH_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Max LLM output tokens per stage.
    #[arg(long, env = "RESUME_POLISH_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "RESUME_POLISH_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Also write the rewritten markdown next to the PDF (.md).
    #[arg(long)]
    save_markdown: bool,

    /// Print the analysis report and the revision plan.
    #[arg(long)]
    show_report: bool,

    /// Print the full RunOutput as JSON on stdout.
    #[arg(long, env = "RESUME_POLISH_JSON")]
    json: bool,

    /// Skip the LLM stages and render the input as markdown.
    #[arg(long)]
    render_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "RESUME_POLISH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RESUME_POLISH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RESUME_POLISH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    // Missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        eprintln!("{} {:#}", red("Error:"), e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose brings them back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.render_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Render-only mode ─────────────────────────────────────────────────
    if cli.render_only {
        let config = base_builder(&cli).build().context("Invalid configuration")?;
        let report = render_file(&cli.input, cli.output.clone(), &config)
            .await
            .with_context(|| format!("Failed to render {}", cli.input.display()))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !cli.quiet {
            println!("{}", report.message());
            eprintln!(
                "   {} page(s), font {}",
                dim(&report.pages.to_string()),
                dim(&report.font)
            );
        }
        return Ok(());
    }

    // ── Build request and config ─────────────────────────────────────────
    let request = build_request(&cli).await?;
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run pipeline ─────────────────────────────────────────────────────
    let output = match run(&request, &config).await {
        Ok(output) => output,
        Err(ResumeError::StageFailed {
            stage,
            source,
            partial,
        }) => {
            if cli.json {
                let json = serde_json::to_string_pretty(&partial)
                    .context("Failed to serialise partial record")?;
                println!("{json}");
            }
            anyhow::bail!("{stage} stage failed: {source}");
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Pipeline failed")),
    };

    if cli.save_markdown {
        save_markdown(&output, cli.quiet).await?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_summary(&cli, &output);
    }
    ensure_rendered(&output)
}

/// A run that wrote no PDF exits non-zero, after its summary is printed.
fn ensure_rendered(output: &RunOutput) -> Result<()> {
    match &output.render {
        RenderOutcome::Rendered(_) => Ok(()),
        RenderOutcome::Failed { message } => anyhow::bail!("PDF rendering failed: {message}"),
    }
}

fn base_builder(cli: &Cli) -> resume_polish::PipelineConfigBuilder {
    let mut builder = PipelineConfig::builder()
        .output_dir(&cli.output_dir)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout);
    if let Some(ref font) = cli.font {
        builder = builder.font_path(font);
    }
    builder
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = base_builder(cli);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    } else if let Some(ref url) = cli.base_url {
        // Only the URL comes from the flag; key and model still come from the environment.
        let settings = LlmSettings::from_env()
            .context("--base-url needs DEEPSEEK_API_KEY or OPENAI_API_KEY")?
            .base_url(url);
        builder = builder.llm(settings);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

async fn build_request(cli: &Cli) -> Result<ResumeRequest> {
    let mut request = ResumeRequest::new(&cli.input);

    let requirements = match (&cli.requirements, &cli.requirements_file) {
        (Some(text), _) => Some(text.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read requirements from {}", path.display()))?,
        ),
        (None, None) => None,
    };
    if let Some(text) = requirements {
        request = request.requirements(text);
    }

    if let Some(ref path) = cli.template {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template from {}", path.display()))?;
        request = request.template(template);
    }

    if let Some(ref output) = cli.output {
        request = request.output(output);
    }
    Ok(request)
}

async fn save_markdown(output: &RunOutput, quiet: bool) -> Result<()> {
    let Some(ref pdf) = output.record.pdf_output_path else {
        return Ok(());
    };
    let md_path = pdf.with_extension("md");
    if let Some(parent) = md_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&md_path, &output.record.optimized_content)
        .await
        .with_context(|| format!("Failed to write {}", md_path.display()))?;
    if !quiet {
        eprintln!("{} markdown saved to {}", dim("·"), display(&md_path));
    }
    Ok(())
}

fn display(path: &Path) -> String {
    bold(&path.display().to_string())
}

fn print_summary(cli: &Cli, output: &RunOutput) {
    if let Some(ref err) = output.load_error {
        eprintln!("{} {}", yellow("⚠"), err);
    }

    if cli.show_report {
        println!("{}\n", cyan(&bold("── Analysis ──")));
        println!("{}\n", output.record.analysis_report.trim_end());
        println!("{}\n", cyan(&bold("── Revision plan ──")));
        println!("{}\n", output.record.optimization_plan.trim_end());
    }

    if let RenderOutcome::Rendered(report) = &output.render {
        if !cli.quiet {
            println!("{}", report.message());
            eprintln!(
                "{}  {} page(s)  font {}  {}ms",
                green("✔"),
                report.pages,
                report.font,
                output.stats.total_duration_ms
            );
            eprintln!(
                "   {} tokens in  /  {} tokens out  ({} LLM calls)",
                dim(&output.stats.total_input_tokens.to_string()),
                dim(&output.stats.total_output_tokens.to_string()),
                output.stats.llm_calls,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_polish::{ResumeRecord, RunStats};

    fn output(render: RenderOutcome) -> RunOutput {
        RunOutput {
            record: ResumeRecord::from_request(&ResumeRequest::new("cv.md")),
            load_error: None,
            render,
            stats: RunStats::default(),
        }
    }

    #[test]
    fn render_failure_is_a_cli_error() {
        let failed = output(RenderOutcome::Failed {
            message: "Failed to write output file 'out/cv.pdf'".into(),
        });
        let err = ensure_rendered(&failed).unwrap_err();
        assert!(format!("{err:#}").contains("out/cv.pdf"));
    }

    #[test]
    fn cli_parses_render_only_flags() {
        let cli = Cli::try_parse_from(["resume-polish", "--render-only", "cv.md", "-o", "cv.pdf"]).unwrap();
        assert!(cli.render_only);
        assert_eq!(cli.output, Some(PathBuf::from("cv.pdf")));
    }
}
