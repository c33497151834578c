//! Integration tests for the markdown → PDF renderer.

use lopdf::Document;
use resume_polish::{render_markdown_to_pdf, FontChain, RenderOptions};

fn builtin() -> RenderOptions {
    RenderOptions::default().font_chain(FontChain::builtin_only())
}

fn load(path: &std::path::Path) -> Document {
    Document::load(path).expect("rendered PDF must parse")
}

#[tokio::test]
async fn renders_loadable_pdf_with_absolute_path() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("cv.pdf");
    let md = "# Jane Doe\n\nRust engineer.\n\n## Skills\n\n- Rust\n- **Tokio**\n";

    let report = render_markdown_to_pdf(md, &target, &builtin()).await.unwrap();

    let bytes = std::fs::read(&target).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(report.bytes, bytes.len() as u64);
    assert!(report.path.is_absolute());
    assert!(report
        .message()
        .contains(&report.path.display().to_string()));
    assert_eq!(load(&target).get_pages().len(), report.pages);
}

#[tokio::test]
async fn ascii_only_text_with_builtin_font() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("ascii.pdf");
    let report = render_markdown_to_pdf("Plain ASCII resume text.", &target, &builtin())
        .await
        .unwrap();
    assert_eq!(report.font, "Helvetica");

    let doc = load(&target);
    let text = doc.extract_text(&[1]).unwrap();
    assert!(text.contains("Plain"), "extracted: {text:?}");
}

#[tokio::test]
async fn cjk_only_text_with_builtin_font_still_renders() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("cjk.pdf");
    let report = render_markdown_to_pdf("# 张三\n\n电话：123", &target, &builtin())
        .await
        .unwrap();
    assert_eq!(report.pages, 1);
    assert!(std::fs::metadata(&target).unwrap().len() > 0);
}

#[tokio::test]
async fn empty_text_is_one_blank_page() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("empty.pdf");
    let report = render_markdown_to_pdf("", &target, &builtin()).await.unwrap();
    assert_eq!(report.pages, 1);
    assert_eq!(load(&target).get_pages().len(), 1);
}

#[tokio::test]
async fn long_document_paginates() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("long.pdf");
    let md: String = (1..=120)
        .map(|i| format!("- Delivered project number {i} on time and under budget\n"))
        .collect();
    let report = render_markdown_to_pdf(&md, &target, &builtin()).await.unwrap();
    assert!(report.pages >= 2, "pages = {}", report.pages);
    assert_eq!(load(&target).get_pages().len(), report.pages);
}

#[tokio::test]
async fn missing_font_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("fallback.pdf");
    let chain = FontChain::new(vec![
        resume_polish::FontSource::File(dir.path().join("missing.ttf")),
        resume_polish::FontSource::Builtin,
    ]);
    let report = render_markdown_to_pdf("Hello", &target, &RenderOptions::default().font_chain(chain))
        .await
        .unwrap();
    assert_eq!(report.font, "Helvetica");
}

#[tokio::test]
async fn garbage_font_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.ttf");
    std::fs::write(&bogus, b"definitely not a font").unwrap();
    let target = dir.path().join("fallback.pdf");
    let chain = FontChain::new(vec![
        resume_polish::FontSource::File(bogus),
        resume_polish::FontSource::Builtin,
    ]);
    let report = render_markdown_to_pdf("Hello", &target, &RenderOptions::default().font_chain(chain))
        .await
        .unwrap();
    assert_eq!(report.font, "Helvetica");
}
