//! Pipeline stages for resume rewriting.
//!
//! Each submodule implements one step; [`crate::run`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! load ──▶ stages (analyze → plan → rewrite) ──▶ postprocess ──▶ render
//! (txt/md/pdf)          (llm)                      (cleanup)     (lopdf)
//! ```
//!
//! 1. [`load`]: read the input file; PDF text extraction ([`pdf_text`])
//!    runs in `spawn_blocking`
//! 2. [`stages`]: the three prompt stages, each one model call at most
//! 3. [`llm`]: the completion backend seam and its two implementations;
//!    the only module with network I/O
//! 4. [`postprocess`]: deterministic cleanup of the rewritten markdown
//! 5. [`render`]: markdown → laid-out pages → PDF file

pub mod llm;
pub mod load;
pub mod pdf_text;
pub mod postprocess;
pub mod render;
pub mod stages;
