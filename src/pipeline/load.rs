//! Document loading: turn a `.txt`, `.md` or `.pdf` path into plain text.
//!
//! Text files are returned byte-for-byte. PDFs are parsed with lopdf on the
//! blocking pool; each page's text is followed by a newline and pages are
//! joined in page order. Only the file extension decides the format, so a
//! PDF renamed to `.txt` is read (and rejected) as text. A missing path is
//! always `FileNotFound`, whatever its extension.

use crate::error::ResumeError;
use crate::pipeline::pdf_text::page_text;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Text,
    Markdown,
    Pdf,
}

impl InputFormat {
    /// Detect the format from the extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, ResumeError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" => Ok(InputFormat::Text),
            "md" => Ok(InputFormat::Markdown),
            "pdf" => Ok(InputFormat::Pdf),
            "" => Err(ResumeError::UnsupportedFormat {
                extension: "(none)".to_string(),
            }),
            other => Err(ResumeError::UnsupportedFormat {
                extension: format!(".{other}"),
            }),
        }
    }
}

/// Load a resume into a string.
pub async fn load_document(path: impl AsRef<Path>) -> Result<String, ResumeError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(ResumeError::FileNotFound { path });
    }
    let format = InputFormat::from_path(&path)?;

    let content = match format {
        InputFormat::Text | InputFormat::Markdown => read_text(&path).await?,
        InputFormat::Pdf => {
            let p = path.clone();
            tokio::task::spawn_blocking(move || extract_pdf_text(&p))
                .await
                .map_err(|e| ResumeError::Internal(format!("PDF extraction task failed: {e}")))??
        }
    };

    info!(
        "Loaded {} ({} bytes, {:?})",
        path.display(),
        content.len(),
        format
    );
    Ok(content)
}

async fn read_text(path: &Path) -> Result<String, ResumeError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path.to_path_buf(), e))
}

fn io_error(path: PathBuf, e: std::io::Error) -> ResumeError {
    match e.kind() {
        std::io::ErrorKind::NotFound => ResumeError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => ResumeError::PermissionDenied { path },
        _ => ResumeError::ReadFailed { path, source: e },
    }
}

/// Extract the text layer of every page. Blocking.
///
/// Fails with [`ResumeError::PdfExtractFailed`] when the file has no
/// decodable text at all: a scanned resume, or one whose fonts carry no
/// `ToUnicode` map.
pub fn extract_pdf_text(path: &Path) -> Result<String, ResumeError> {
    let extract_failed = |detail: String| ResumeError::PdfExtractFailed {
        path: path.to_path_buf(),
        detail,
    };
    let doc = lopdf::Document::load(path).map_err(|e| match e {
        lopdf::Error::IO(io) => io_error(path.to_path_buf(), io),
        other => extract_failed(other.to_string()),
    })?;

    let pages = doc.get_pages();
    debug!("PDF {} has {} page(s)", path.display(), pages.len());

    let mut out = String::new();
    let mut undecodable = BTreeSet::new();
    // get_pages is a BTreeMap keyed by page number, so iteration is in order.
    for (page_number, page_id) in &pages {
        let page = page_text(&doc, *page_id)
            .map_err(|e| extract_failed(format!("page {page_number}: {e}")))?;
        out.push_str(&page.text);
        out.push('\n');
        undecodable.extend(page.undecodable);
    }

    if !undecodable.is_empty() {
        let fonts = undecodable.into_iter().collect::<Vec<_>>().join(", ");
        if out.trim().is_empty() {
            return Err(extract_failed(format!(
                "text uses fonts without a ToUnicode map ({fonts})"
            )));
        }
        warn!("Skipped text in fonts without a ToUnicode map: {}", fonts);
    }
    if out.trim().is_empty() {
        return Err(extract_failed(
            "no text layer found (scanned or image-only PDF?)".to_string(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn format_detection_ignores_case() {
        assert_eq!(
            InputFormat::from_path(Path::new("cv.PDF")).unwrap(),
            InputFormat::Pdf
        );
        assert_eq!(
            InputFormat::from_path(Path::new("cv.Md")).unwrap(),
            InputFormat::Markdown
        );
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = InputFormat::from_path(Path::new("cv.docx")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported file format .docx. Please provide .pdf, .txt, or .md."
        );
        assert!(InputFormat::from_path(Path::new("README")).is_err());
    }

    #[tokio::test]
    async fn text_is_returned_byte_exact() {
        let mut f = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let body = "  张三\r\n\n  trailing  \n\n";
        f.write_all(body.as_bytes()).unwrap();
        assert_eq!(load_document(f.path()).await.unwrap(), body);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = load_document("/definitely/not/here.md").await.unwrap_err();
        assert!(matches!(err, ResumeError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_file_wins_over_unknown_extension() {
        let err = load_document("/definitely/not/here.docx").await.unwrap_err();
        assert!(matches!(err, ResumeError::FileNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_read_error() {
        let mut f = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        f.write_all(&[0xff, 0xfe, 0x00, 0x41]).unwrap();
        let err = load_document(f.path()).await.unwrap_err();
        assert!(matches!(err, ResumeError::ReadFailed { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn garbage_pdf_is_an_extract_error() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"not a pdf at all").unwrap();
        let err = load_document(f.path()).await.unwrap_err();
        assert!(
            matches!(err, ResumeError::PdfExtractFailed { .. }),
            "got {err:?}"
        );
    }
}
