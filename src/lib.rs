//! # resume-polish
//!
//! Critique a resume with an LLM, plan the fixes, rewrite it against a
//! template, and typeset the result as a PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .txt / .md / .pdf
//!  │
//!  ├─ 1. Load     read text, or extract it page by page from a PDF
//!  ├─ 2. Analyze  LLM critique of the original
//!  ├─ 3. Plan     LLM turns the critique into an ordered revision plan
//!  ├─ 4. Rewrite  LLM writes the new resume in markdown, then cleanup rules
//!  └─ 5. Render   markdown → A4 PDF with an embedded CJK-capable font
//! ```
//!
//! A stage whose input is empty returns a short marker string instead of
//! calling the model, so a failed load costs nothing. Rendering failures are
//! reported in the output rather than raised.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resume_polish::{run, PipelineConfig, ResumeRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials from DEEPSEEK_API_KEY or OPENAI_API_KEY
//!     let config = PipelineConfig::default();
//!     let request = ResumeRequest::new("cv.pdf").requirements("Target: backend roles");
//!     let output = run(&request, &config).await?;
//!     println!("{}", output.render.message());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resume-polish` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Fonts
//!
//! Output is only as good as the font it embeds. The renderer tries, in
//! order: `--font` / [`PipelineConfig::font_path`], `$RESUME_POLISH_FONT`,
//! `*.ttf` in `./fonts/`, common CJK system fonts, common Latin system fonts,
//! and finally the PDF built-in Helvetica (Latin-1 only).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LlmSettings, PipelineConfig, PipelineConfigBuilder};
pub use error::{ErrorKind, ResumeError};
pub use output::{RenderOutcome, RenderReport, RunOutput, RunStats, StageStats};
pub use pipeline::llm::{Completion, CompletionBackend, CompletionRequest, OpenAiCompatBackend, ProviderBackend};
pub use pipeline::load::load_document;
pub use pipeline::render::fonts::{FontChain, FontSource};
pub use pipeline::render::{render_markdown_to_pdf, RenderOptions};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use record::{ResumeRecord, ResumeRequest, Stage};
pub use run::{render_file, run, run_sync};
