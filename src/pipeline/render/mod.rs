//! Document Renderer: markdown → PDF.
//!
//! ```text
//! markdown ──▶ blocks ──▶ pages of draw ops ──▶ PDF bytes ──▶ file
//!   (pulldown-cmark)  (layout)          (lopdf)         (atomic write)
//! ```
//!
//! Everything here is CPU-bound and synchronous, so
//! [`render_markdown_to_pdf`] runs it on the blocking pool.

pub mod fonts;
pub mod layout;
pub mod markdown;
pub mod pdf;

use crate::error::ResumeError;
use crate::output::RenderReport;
use fonts::{cjk_font_hint, unsupported_cjk_fonts, Font, FontChain};
use layout::is_cjk;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Renderer settings.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Preferred TrueType font; tried before the environment and system fonts.
    pub font_path: Option<PathBuf>,
    /// Replaces the system font chain entirely. Tests use
    /// [`FontChain::builtin_only`] for reproducible output.
    pub font_chain: Option<FontChain>,
    /// Document title for the PDF metadata. Defaults to the first heading.
    pub title: Option<String>,
}

impl RenderOptions {
    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn font_chain(mut self, chain: FontChain) -> Self {
        self.font_chain = Some(chain);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn chain(&self) -> FontChain {
        match &self.font_chain {
            Some(chain) => chain.clone(),
            None => FontChain::system_default(self.font_path.as_deref()),
        }
    }
}

/// Render `markdown` to a PDF at `path`.
///
/// The parent directory is created if needed and the file is written
/// atomically, so a failed render never leaves a truncated PDF behind.
/// Empty input produces a single blank page.
pub async fn render_markdown_to_pdf(
    markdown: &str,
    path: impl AsRef<Path>,
    options: &RenderOptions,
) -> Result<RenderReport, ResumeError> {
    let markdown = markdown.to_string();
    let path = path.as_ref().to_path_buf();
    let options = options.clone();

    tokio::task::spawn_blocking(move || render_blocking(&markdown, &path, &options))
        .await
        .map_err(|e| ResumeError::RenderFailed {
            detail: format!("render task failed: {e}"),
        })?
}

/// Synchronous body of [`render_markdown_to_pdf`].
pub fn render_blocking(
    markdown: &str,
    path: &Path,
    options: &RenderOptions,
) -> Result<RenderReport, ResumeError> {
    let start = Instant::now();
    let font = options.chain().resolve();

    let blocks = markdown::parse_blocks(markdown);
    warn_uncovered(&font, markdown);

    let pages = layout::layout_document(&blocks, &font);
    let title = options.title.clone().or_else(|| {
        blocks
            .iter()
            .find(|b| b.kind == markdown::BlockKind::Title)
            .map(|b| b.plain_text().replace('\n', " "))
    });
    let bytes = pdf::write_pdf(&pages, &font, title.as_deref())?;

    let abs = std::path::absolute(path).map_err(|e| ResumeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_atomic(&abs, &bytes)?;

    info!(
        "Rendered {} page(s) with {} to {} in {}ms",
        pages.len(),
        font.name(),
        abs.display(),
        start.elapsed().as_millis()
    );
    Ok(RenderReport {
        path: abs,
        pages: pages.len(),
        font: font.name().to_string(),
        bytes: bytes.len() as u64,
    })
}

fn warn_uncovered(font: &Font, text: &str) {
    if let Some(message) = uncovered_warning(font, text, &unsupported_cjk_fonts()) {
        warn!("{}", message);
    }
}

/// Warning for characters `font` cannot draw; names the missing-CJK-font
/// cause when any of them is CJK.
fn uncovered_warning(font: &Font, text: &str, unsupported: &[PathBuf]) -> Option<String> {
    let missing: BTreeSet<char> = text
        .chars()
        .filter(|c| !c.is_control() && !c.is_whitespace() && !font.covers(*c))
        .collect();
    if missing.is_empty() {
        return None;
    }
    let sample: String = missing.iter().take(10).collect();
    let mut message = format!(
        "{} has no glyph for {} character(s), e.g. {:?}; they will not display correctly",
        font.name(),
        missing.len(),
        sample
    );
    if missing.iter().any(|c| is_cjk(*c)) {
        message.push_str(". ");
        message.push_str(&cjk_font_hint(unsupported));
    }
    Some(message)
}

/// Write to a temp file in the destination directory, then rename over the
/// target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ResumeError> {
    let write_err = |source: std::io::Error| ResumeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> RenderOptions {
        RenderOptions::default().font_chain(FontChain::builtin_only())
    }

    #[test]
    fn uncovered_cjk_names_the_missing_font_cause() {
        let unusable = [PathBuf::from("/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc")];
        let message = uncovered_warning(&Font::Builtin, "# 张三\nRust", &unusable).unwrap();
        assert!(message.starts_with("Helvetica has no glyph for 2 character(s)"));
        assert!(message.contains("NotoSansCJK-Regular.ttc"));
        assert!(message.contains("--font"));

        let latin_only = uncovered_warning(&Font::Builtin, "a → b", &unusable).unwrap();
        assert!(!latin_only.contains("--font"));
        assert!(uncovered_warning(&Font::Builtin, "Plain résumé", &unusable).is_none());
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/cv.pdf");
        let report = render_blocking("# Jane\n\nHello", &target, &builtin()).unwrap();
        assert!(target.exists());
        assert_eq!(report.pages, 1);
        assert_eq!(report.font, "Helvetica");
        assert!(report.path.is_absolute());
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cv.pdf");
        std::fs::write(&target, b"old").unwrap();
        render_blocking("text", &target, &builtin()).unwrap();
        assert!(std::fs::read(&target).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn unwritable_parent_is_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = render_blocking("text", &blocker.join("cv.pdf"), &builtin()).unwrap_err();
        assert!(matches!(err, ResumeError::OutputWriteFailed { .. }));
    }

    #[tokio::test]
    async fn async_entry_point_reports_message() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cv.pdf");
        let report = render_markdown_to_pdf("## Skills\n- Rust", &target, &builtin())
            .await
            .unwrap();
        assert!(report
            .message()
            .starts_with("Successfully generated PDF at: "));
        assert!(report.bytes > 0);
    }
}
