//! PDF serialisation with lopdf.
//!
//! A TrueType font is embedded whole as a `Type0` / `CIDFontType2` pair with
//! `Identity-H` encoding: every string is a sequence of 2-byte glyph ids,
//! the `W` array carries widths for the glyphs actually used, and a
//! `ToUnicode` CMap maps them back to text so the PDF stays searchable and
//! copyable. TrueType fonts have no bold or italic face here, so bold is
//! drawn with fill+stroke (render mode 2) and italic with a skewed text
//! matrix.
//!
//! The Helvetica fallback uses the four base-14 faces with WinAnsiEncoding.

use super::fonts::{encode_winansi, Font, TrueTypeFont};
use super::layout::{DrawOp, PageLayout, Rgb, PAGE_HEIGHT, PAGE_WIDTH};
use crate::error::ResumeError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;

/// Horizontal shear for synthetic italics (about 12°).
const ITALIC_SKEW: f32 = 0.21;
/// Stroke width for synthetic bold, as a fraction of the font size.
const BOLD_STROKE: f32 = 0.03;

fn render_err(e: impl std::fmt::Display) -> ResumeError {
    ResumeError::RenderFailed {
        detail: e.to_string(),
    }
}

fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

/// Serialise laid-out pages into PDF bytes.
pub fn write_pdf(
    pages: &[PageLayout],
    font: &Font,
    title: Option<&str>,
) -> Result<Vec<u8>, ResumeError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    // Encoding the pages first tells us which glyphs the font dictionary
    // needs widths and ToUnicode entries for.
    let mut used_glyphs: BTreeMap<u16, char> = BTreeMap::new();
    let mut streams = Vec::with_capacity(pages.len());
    for page in pages {
        let content = page_content(page, font, &mut used_glyphs);
        streams.push(content.encode().map_err(render_err)?);
    }

    let mut font_dict = Dictionary::new();
    match font {
        Font::TrueType(tt) => {
            let id = add_truetype_font(&mut doc, tt, &used_glyphs);
            font_dict.set("F1", Object::Reference(id));
        }
        Font::Builtin => {
            for (key, base) in [
                ("F1", "Helvetica"),
                ("F2", "Helvetica-Bold"),
                ("F3", "Helvetica-Oblique"),
                ("F4", "Helvetica-BoldOblique"),
            ] {
                let mut d = Dictionary::new();
                d.set("Type", name("Font"));
                d.set("Subtype", name("Type1"));
                d.set("BaseFont", name(base));
                d.set("Encoding", name("WinAnsiEncoding"));
                let id = doc.add_object(Object::Dictionary(d));
                font_dict.set(key, Object::Reference(id));
            }
        }
    }
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(font_dict));
    let resources_id = doc.add_object(Object::Dictionary(resources));

    let mut kids = Vec::with_capacity(streams.len());
    for bytes in streams {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), bytes));
        let mut page = Dictionary::new();
        page.set("Type", name("Page"));
        page.set("Parent", Object::Reference(pages_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ]),
        );
        page.set("Resources", Object::Reference(resources_id));
        page.set("Contents", Object::Reference(content_id));
        kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", name("Pages"));
    pages_dict.set("Count", Object::Integer(kids.len() as i64));
    pages_dict.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));

    let mut info = Dictionary::new();
    info.set(
        "Producer",
        Object::string_literal(concat!("resume-polish ", env!("CARGO_PKG_VERSION"))),
    );
    if let Some(t) = title.filter(|t| !t.trim().is_empty()) {
        info.set("Title", text_string(t));
    }
    let info_id = doc.add_object(Object::Dictionary(info));

    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(render_err)?;
    Ok(out)
}

/// PDF text string: plain literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xfe, 0xff];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn rgb_operands(c: Rgb) -> Vec<Object> {
    vec![Object::Real(c.0), Object::Real(c.1), Object::Real(c.2)]
}

fn page_content(page: &PageLayout, font: &Font, used: &mut BTreeMap<u16, char>) -> Content {
    let mut ops = Vec::new();
    for op in &page.ops {
        match op {
            DrawOp::Text {
                x,
                y,
                size,
                bold,
                italic,
                color,
                text,
            } => {
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("rg", rgb_operands(*color)));

                let (resource, encoded, skew) = match font {
                    Font::TrueType(tt) => {
                        if *bold {
                            ops.push(Operation::new("RG", rgb_operands(*color)));
                            ops.push(Operation::new("w", vec![Object::Real(size * BOLD_STROKE)]));
                            ops.push(Operation::new("Tr", vec![Object::Integer(2)]));
                        }
                        let skew = if *italic { ITALIC_SKEW } else { 0.0 };
                        let s = Object::String(encode_glyphs(tt, text, used), StringFormat::Hexadecimal);
                        ("F1", s, skew)
                    }
                    Font::Builtin => {
                        let resource = match (*bold, *italic) {
                            (false, false) => "F1",
                            (true, false) => "F2",
                            (false, true) => "F3",
                            (true, true) => "F4",
                        };
                        let s = Object::String(encode_winansi(text), StringFormat::Literal);
                        (resource, s, 0.0)
                    }
                };

                ops.push(Operation::new("Tf", vec![name(resource), Object::Real(*size)]));
                ops.push(Operation::new(
                    "Tm",
                    vec![
                        Object::Integer(1),
                        Object::Integer(0),
                        Object::Real(skew),
                        Object::Integer(1),
                        Object::Real(*x),
                        Object::Real(*y),
                    ],
                ));
                ops.push(Operation::new("Tj", vec![encoded]));
                ops.push(Operation::new("ET", vec![]));
                ops.push(Operation::new("Q", vec![]));
            }
            DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                width,
                color,
            } => {
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new("w", vec![Object::Real(*width)]));
                ops.push(Operation::new("RG", rgb_operands(*color)));
                ops.push(Operation::new("m", vec![Object::Real(*x1), Object::Real(*y1)]));
                ops.push(Operation::new("l", vec![Object::Real(*x2), Object::Real(*y2)]));
                ops.push(Operation::new("S", vec![]));
                ops.push(Operation::new("Q", vec![]));
            }
        }
    }
    Content { operations: ops }
}

/// 2-byte big-endian glyph ids for `text`, recording which glyphs were used.
fn encode_glyphs(font: &TrueTypeFont, text: &str, used: &mut BTreeMap<u16, char>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() * 2);
    for ch in text.chars() {
        let gid = font.glyph_or_notdef(ch);
        if gid != 0 {
            used.entry(gid).or_insert(ch);
        }
        bytes.extend_from_slice(&gid.to_be_bytes());
    }
    bytes
}

fn add_truetype_font(doc: &mut Document, font: &TrueTypeFont, used: &BTreeMap<u16, char>) -> ObjectId {
    let scale = |v: i16| Object::Integer(font.scale(v as i32).round() as i64);

    let mut file_dict = Dictionary::new();
    file_dict.set("Length1", Object::Integer(font.data.len() as i64));
    let file_id = doc.add_object(Stream::new(file_dict, font.data.clone()));

    let mut descriptor = Dictionary::new();
    descriptor.set("Type", name("FontDescriptor"));
    descriptor.set("FontName", name(&font.name));
    descriptor.set("Flags", Object::Integer(4));
    descriptor.set(
        "FontBBox",
        Object::Array(font.bbox.iter().map(|v| scale(*v)).collect()),
    );
    descriptor.set("ItalicAngle", Object::Integer(0));
    descriptor.set("Ascent", scale(font.ascender));
    descriptor.set("Descent", scale(font.descender));
    descriptor.set("CapHeight", scale(font.cap_height));
    descriptor.set("StemV", Object::Integer(80));
    descriptor.set("FontFile2", Object::Reference(file_id));
    let descriptor_id = doc.add_object(Object::Dictionary(descriptor));

    let mut widths = Vec::with_capacity(used.len() * 2 + 2);
    let notdef = font.glyph_width(0).round() as i64;
    widths.push(Object::Integer(0));
    widths.push(Object::Array(vec![Object::Integer(notdef)]));
    for gid in used.keys() {
        widths.push(Object::Integer(*gid as i64));
        widths.push(Object::Array(vec![Object::Integer(
            font.glyph_width(*gid).round() as i64,
        )]));
    }

    let mut system_info = Dictionary::new();
    system_info.set("Registry", Object::string_literal("Adobe"));
    system_info.set("Ordering", Object::string_literal("Identity"));
    system_info.set("Supplement", Object::Integer(0));

    let mut cid_font = Dictionary::new();
    cid_font.set("Type", name("Font"));
    cid_font.set("Subtype", name("CIDFontType2"));
    cid_font.set("BaseFont", name(&font.name));
    cid_font.set("CIDSystemInfo", Object::Dictionary(system_info));
    cid_font.set("FontDescriptor", Object::Reference(descriptor_id));
    cid_font.set("DW", Object::Integer(1000));
    cid_font.set("W", Object::Array(widths));
    cid_font.set("CIDToGIDMap", name("Identity"));
    let cid_font_id = doc.add_object(Object::Dictionary(cid_font));

    let to_unicode_id = doc.add_object(Stream::new(Dictionary::new(), to_unicode_cmap(used)));

    let mut type0 = Dictionary::new();
    type0.set("Type", name("Font"));
    type0.set("Subtype", name("Type0"));
    type0.set("BaseFont", name(&font.name));
    type0.set("Encoding", name("Identity-H"));
    type0.set("DescendantFonts", Object::Array(vec![Object::Reference(cid_font_id)]));
    type0.set("ToUnicode", Object::Reference(to_unicode_id));
    doc.add_object(Object::Dictionary(type0))
}

/// ToUnicode CMap with one `bfchar` entry per used glyph.
fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> Vec<u8> {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = used.iter().collect();
    // bfchar sections are limited to 100 entries each.
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            cmap.push_str(&format!("<{gid:04X}> <{hex}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_line(text: &str, bold: bool) -> PageLayout {
        PageLayout {
            ops: vec![
                DrawOp::Text {
                    x: 72.0,
                    y: 700.0,
                    size: 11.0,
                    bold,
                    italic: false,
                    color: Rgb(0.0, 0.0, 0.0),
                    text: text.to_string(),
                },
                DrawOp::Line {
                    x1: 72.0,
                    y1: 690.0,
                    x2: 523.0,
                    y2: 690.0,
                    width: 0.5,
                    color: Rgb(0.6, 0.6, 0.6),
                },
            ],
        }
    }

    #[test]
    fn builtin_pdf_loads_back() {
        let bytes = write_pdf(&[one_line("Hello", true)], &Font::Builtin, Some("CV")).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn page_count_matches_layout() {
        let pages = vec![one_line("a", false), PageLayout::default(), one_line("c", false)];
        let bytes = write_pdf(&pages, &Font::Builtin, None).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn builtin_bold_selects_bold_face() {
        let mut used = BTreeMap::new();
        let content = page_content(&one_line("x", true), &Font::Builtin, &mut used);
        let tf = content
            .operations
            .iter()
            .find(|op| op.operator == "Tf")
            .unwrap();
        assert_eq!(tf.operands[0].as_name().unwrap(), b"F2");
        assert!(used.is_empty());
    }

    #[test]
    fn cmap_has_one_entry_per_glyph() {
        let mut used = BTreeMap::new();
        used.insert(3u16, 'A');
        used.insert(0x1234u16, '张');
        let cmap = String::from_utf8(to_unicode_cmap(&used)).unwrap();
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<1234> <5F20>"));
    }

    #[test]
    fn non_ascii_title_is_utf16() {
        match text_string("简历") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xfe, 0xff]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
