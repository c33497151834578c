//! Error types for the resume-polish library.
//!
//! A single enum, [`ResumeError`], covers every failure the pipeline can
//! report. Callers that only care about the *category* of a failure use
//! [`ResumeError::kind`] instead of matching on message text:
//!
//! * **Config** errors (no credentials, bad builder values) are fatal and
//!   surface before any stage runs.
//! * **Input** errors (missing file, unsupported extension) are absorbed by
//!   the orchestrator: the run continues with empty content and every
//!   downstream LLM stage short-circuits.
//! * **LLM** errors abort the run and come back wrapped in
//!   [`ResumeError::StageFailed`] together with the partially filled record.
//! * **Render** errors never abort the run; they are reported through
//!   [`crate::output::RenderOutcome`].

use crate::record::{ResumeRecord, Stage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the resume-polish library.
#[derive(Debug, Error)]
pub enum ResumeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found at {path}")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one of `.txt`, `.md`, `.pdf`.
    #[error("Unsupported file format {extension}. Please provide .pdf, .txt, or .md.")]
    UnsupportedFormat { extension: String },

    /// The file exists but could not be read as UTF-8 text.
    #[error("Error reading file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// lopdf could not parse the PDF or extract its text.
    #[error("Could not extract text from PDF '{path}': {detail}")]
    PdfExtractFailed { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No credential or provider is available; raised before any stage runs.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The completion endpoint returned an error or an unusable response.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The completion endpoint rejected the credential (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The completion call exceeded `api_timeout_secs`.
    #[error("LLM call for the {stage} stage timed out after {secs}s")]
    ApiTimeout { stage: Stage, secs: u64 },

    /// A pipeline stage failed. `partial` holds every field populated before
    /// the failure; nothing is rolled back.
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<ResumeError>,
        partial: Box<ResumeRecord>,
    },

    // ── Render errors ─────────────────────────────────────────────────────
    /// Layout or PDF serialisation failed.
    #[error("Error generating PDF: {detail}")]
    RenderFailed { detail: String },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ResumeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnsupportedFormat,
    Io,
    Render,
    Config,
    Llm,
    Internal,
}

impl ResumeError {
    /// The category of this error. `StageFailed` reports the kind of the
    /// underlying cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResumeError::FileNotFound { .. } => ErrorKind::NotFound,
            ResumeError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ResumeError::PermissionDenied { .. }
            | ResumeError::ReadFailed { .. }
            | ResumeError::PdfExtractFailed { .. } => ErrorKind::Io,
            ResumeError::ProviderNotConfigured { .. } | ResumeError::InvalidConfig(_) => {
                ErrorKind::Config
            }
            ResumeError::LlmApiError { .. }
            | ResumeError::AuthError { .. }
            | ResumeError::ApiTimeout { .. } => ErrorKind::Llm,
            ResumeError::StageFailed { source, .. } => source.kind(),
            ResumeError::RenderFailed { .. } | ResumeError::OutputWriteFailed { .. } => {
                ErrorKind::Render
            }
            ResumeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The partially populated record carried by a [`ResumeError::StageFailed`].
    pub fn partial_record(&self) -> Option<&ResumeRecord> {
        match self {
            ResumeError::StageFailed { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// `Error: <message>`, the form shown to users and stored in
    /// [`crate::output::RunOutput::load_error`].
    pub fn report(&self) -> String {
        format!("Error: {self}")
    }
}
