//! Page text extraction for input PDFs.
//!
//! Walks each page's content stream with lopdf and decodes every shown
//! string through its font:
//!
//! - a `ToUnicode` CMap when the font has one (2-byte codes for `Type0`
//!   fonts, 1-byte codes for simple fonts)
//! - otherwise the simple-font encoding lopdf knows (`WinAnsiEncoding`,
//!   `StandardEncoding`, …)
//!
//! A composite font without `ToUnicode` only carries glyph ids, which cannot
//! be turned back into text; its strings are skipped and the font is
//! reported in [`PageText::undecodable`].
//!
//! Strings are grouped into lines by baseline. A new baseline starts a new
//! line; separate strings on the same baseline are joined with a space
//! unless either side is CJK or the next one starts with closing
//! punctuation.

use crate::pipeline::render::layout::{is_cjk, is_closing_punct};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Baselines closer than this (in text space units) share a line.
const SAME_LINE: f32 = 1.0;
/// A `TJ` adjustment below this (thousandths of an em) is a word gap.
const TJ_WORD_GAP: f32 = -100.0;

/// Decoded text of one page.
#[derive(Debug, Default)]
pub struct PageText {
    pub text: String,
    /// Base names of fonts whose strings could not be decoded.
    pub undecodable: BTreeSet<String>,
}

enum Decoder {
    Mapped {
        map: HashMap<u32, String>,
        code_len: usize,
        /// Encoding for 1-byte codes missing from the map.
        fallback: Option<String>,
    },
    Simple(String),
    Opaque(String),
}

impl Decoder {
    fn for_font(doc: &Document, font: &Dictionary) -> Decoder {
        let composite = font.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type0".as_slice());
        let encoding = font.get_font_encoding().to_string();

        if let Some(map) = to_unicode_map(doc, font) {
            return Decoder::Mapped {
                map,
                code_len: if composite { 2 } else { 1 },
                fallback: (!composite).then_some(encoding),
            };
        }
        if !composite || encoding == "UniGB-UCS2-H" {
            return Decoder::Simple(encoding);
        }
        let base = font
            .get(b"BaseFont")
            .and_then(Object::as_name)
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_else(|_| "(unnamed)".to_string());
        Decoder::Opaque(base)
    }

    /// `None` when the font cannot be decoded.
    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Decoder::Simple(encoding) => Some(Document::decode_text(Some(encoding.as_str()), bytes)),
            Decoder::Opaque(_) => None,
            Decoder::Mapped {
                map,
                code_len,
                fallback,
            } => {
                let mut out = String::new();
                for code in bytes.chunks(*code_len) {
                    let key = code.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                    match (map.get(&key), fallback) {
                        (Some(text), _) => out.push_str(text),
                        (None, Some(encoding)) => out.push_str(&Document::decode_text(Some(encoding.as_str()), code)),
                        (None, None) => {}
                    }
                }
                Some(out)
            }
        }
    }
}

/// Parse the font's `ToUnicode` stream into code → text.
fn to_unicode_map(doc: &Document, font: &Dictionary) -> Option<HashMap<u32, String>> {
    let stream = font
        .get_deref(b"ToUnicode", doc)
        .and_then(Object::as_stream)
        .ok()?;
    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    // The CMap parser panics on some malformed input.
    let parsed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        adobe_cmap_parser::get_unicode_map(&data)
    }));
    let raw = match parsed {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            warn!("Ignoring unreadable ToUnicode CMap: {:?}", e);
            return None;
        }
        Err(_) => {
            warn!("Ignoring ToUnicode CMap that could not be parsed");
            return None;
        }
    };

    let mut map = HashMap::with_capacity(raw.len());
    for (code, utf16be) in raw {
        if utf16be.len() % 2 != 0 {
            continue;
        }
        let units: Vec<u16> = utf16be
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(text) = String::from_utf16(&units) {
            map.insert(code, text);
        }
    }
    Some(map)
}

/// Accumulates shown strings into lines.
#[derive(Default)]
struct Lines {
    out: String,
    baseline: Option<f32>,
}

impl Lines {
    /// Append `text` drawn at baseline `y`. `repositioned` is true when the
    /// text position was set since the previous string.
    fn show(&mut self, y: f32, text: &str, repositioned: bool) {
        if text.is_empty() {
            return;
        }
        match self.baseline {
            Some(prev) if (prev - y).abs() <= SAME_LINE => {
                if repositioned {
                    self.word_gap(text);
                }
            }
            Some(_) => self.break_line(),
            None => {}
        }
        self.baseline = Some(y);
        self.out.push_str(text);
    }

    fn word_gap(&mut self, next: &str) {
        let (Some(prev), Some(first)) = (self.out.chars().last(), next.chars().next()) else {
            return;
        };
        let joined = prev.is_whitespace()
            || first.is_whitespace()
            || is_cjk(prev)
            || is_cjk(first)
            || is_closing_punct(first);
        if !joined {
            self.out.push(' ');
        }
    }

    fn break_line(&mut self) {
        let trimmed = self.out.trim_end_matches([' ', '\t']).len();
        self.out.truncate(trimmed);
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.baseline = None;
    }

    fn finish(mut self) -> String {
        self.break_line();
        self.out
    }
}

/// Decode through `decoder`, noting fonts that cannot be decoded. Text
/// shown before any `Tf` uses lopdf's default encoding.
fn decode_with(decoder: Option<&Decoder>, bytes: &[u8], page: &mut PageText) -> String {
    match decoder {
        Some(d) => d.decode(bytes).unwrap_or_else(|| {
            if let Decoder::Opaque(base) = d {
                page.undecodable.insert(base.clone());
            }
            String::new()
        }),
        None => Document::decode_text(None, bytes),
    }
}

fn number(op: &[Object], i: usize) -> Option<f32> {
    op.get(i).and_then(|o| o.as_float().ok())
}

/// Extract the text of one page, one output line per baseline.
pub fn page_text(doc: &Document, page_id: ObjectId) -> Result<PageText, lopdf::Error> {
    let decoders: BTreeMap<Vec<u8>, Decoder> = doc
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, Decoder::for_font(doc, font)))
        .collect();
    let content = Content::decode(&doc.get_page_content(page_id)?)?;

    let mut page = PageText::default();
    let mut lines = Lines::default();
    let mut current: Option<&Decoder> = None;
    let mut y = 0.0f32;
    let mut leading = 0.0f32;
    let mut repositioned = true;

    for op in &content.operations {
        let args = &op.operands;
        match op.operator.as_str() {
            "BT" => {
                y = 0.0;
                repositioned = true;
            }
            "Tf" => {
                current = args
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .and_then(|name| decoders.get(name));
            }
            "TL" => leading = number(args, 0).unwrap_or(leading),
            "Tm" => {
                y = number(args, 5).unwrap_or(y);
                repositioned = true;
            }
            "Td" | "TD" => {
                let ty = number(args, 1).unwrap_or(0.0);
                if op.operator == "TD" {
                    leading = -ty;
                }
                y += ty;
                repositioned = true;
            }
            "T*" => {
                y -= leading;
                lines.break_line();
                repositioned = true;
            }
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    y -= leading;
                    lines.break_line();
                }
                if let Some(Ok(bytes)) = args.last().map(Object::as_str) {
                    let text = decode_with(current, bytes, &mut page);
                    lines.show(y, &text, repositioned);
                    repositioned = false;
                }
            }
            "TJ" => {
                let Some(Ok(items)) = args.first().map(Object::as_array) else {
                    continue;
                };
                let mut text = String::new();
                for item in items {
                    match item {
                        Object::String(bytes, _) => text.push_str(&decode_with(current, bytes, &mut page)),
                        other => {
                            let gap = other.as_float().is_ok_and(|n| n < TJ_WORD_GAP);
                            if gap && !text.is_empty() && !text.ends_with(' ') {
                                text.push(' ');
                            }
                        }
                    }
                }
                lines.show(y, &text, repositioned);
                repositioned = false;
            }
            _ => {}
        }
    }

    page.text = lines.finish();
    if !page.undecodable.is_empty() {
        debug!("Page {:?}: no ToUnicode for {:?}", page_id, page.undecodable);
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{Stream, StringFormat};

    fn font_dict(subtype: &str, encoding: &str, to_unicode: Option<ObjectId>) -> Dictionary {
        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(subtype.as_bytes().to_vec()));
        font.set("BaseFont", Object::Name(b"TestFont".to_vec()));
        font.set("Encoding", Object::Name(encoding.as_bytes().to_vec()));
        if let Some(id) = to_unicode {
            font.set("ToUnicode", Object::Reference(id));
        }
        font
    }

    /// A one-page document whose only font is `font`, drawing `ops`.
    fn one_page(font: impl FnOnce(&mut Document) -> Dictionary, ops: Vec<Operation>) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font = font(&mut doc);
        let font_id = doc.add_object(Object::Dictionary(font));
        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Reference(font_id));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));

        let data = Content { operations: ops }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), data));
        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Reference(content_id));
        let page_id = doc.add_object(Object::Dictionary(page));

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        pages.set("Count", Object::Integer(1));
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        (doc, page_id)
    }

    fn at(y: i64) -> Operation {
        Operation::new(
            "Tm",
            [1, 0, 0, 1, 72, y].into_iter().map(Object::Integer).collect(),
        )
    }

    fn hex(bytes: &[u8]) -> Object {
        Object::String(bytes.to_vec(), StringFormat::Hexadecimal)
    }

    const CMAP: &str = "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
        /CMapName /Test-UCS def\n/CMapType 2 def\n\
        1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
        3 beginbfchar\n<0001> <004A>\n<0002> <0061>\n<0003> <59D3>\nendbfchar\n\
        1 beginbfrange\n<0010> <0012> <0078>\nendbfrange\n\
        endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n";

    #[test]
    fn identity_h_is_decoded_through_to_unicode() {
        let (doc, page) = one_page(
            |doc| {
                let cmap = doc.add_object(Stream::new(Dictionary::new(), CMAP.as_bytes().to_vec()));
                font_dict("Type0", "Identity-H", Some(cmap))
            },
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                at(700),
                Operation::new("Tj", vec![hex(&[0, 1, 0, 2, 0, 3])]),
                at(680),
                Operation::new("Tj", vec![hex(&[0, 0x10, 0, 0x12])]),
                Operation::new("ET", vec![]),
            ],
        );
        let text = page_text(&doc, page).unwrap();
        assert_eq!(text.text, "Ja姓\nxz\n");
        assert!(text.undecodable.is_empty());
    }

    #[test]
    fn identity_h_without_to_unicode_is_reported() {
        let (doc, page) = one_page(
            |_| font_dict("Type0", "Identity-H", None),
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                at(700),
                Operation::new("Tj", vec![hex(&[0, 1, 0, 2])]),
                Operation::new("ET", vec![]),
            ],
        );
        let text = page_text(&doc, page).unwrap();
        assert_eq!(text.text, "");
        assert!(text.undecodable.contains("TestFont"));
    }

    #[test]
    fn runs_on_one_baseline_share_a_line() {
        let (doc, page) = one_page(
            |_| font_dict("Type1", "WinAnsiEncoding", None),
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(11)]),
                at(700),
                Operation::new("Tj", vec![Object::string_literal("Senior")]),
                Operation::new("Td", vec![Object::Integer(60), Object::Integer(0)]),
                Operation::new("Tj", vec![Object::string_literal("engineer")]),
                Operation::new("Td", vec![Object::Integer(50), Object::Integer(0)]),
                Operation::new("Tj", vec![Object::string_literal(",")]),
                Operation::new("Td", vec![Object::Integer(-110), Object::Integer(-14)]),
                Operation::new(
                    "TJ",
                    vec![Object::Array(vec![
                        Object::string_literal("Rust"),
                        Object::Integer(-250),
                        Object::string_literal("Go"),
                    ])],
                ),
                Operation::new("ET", vec![]),
            ],
        );
        assert_eq!(page_text(&doc, page).unwrap().text, "Senior engineer,\nRust Go\n");
    }

    #[test]
    fn cjk_runs_are_joined_without_spaces() {
        let mut lines = Lines::default();
        lines.show(700.0, "工", true);
        lines.show(700.0, "作", true);
        lines.show(700.0, "经历", true);
        assert_eq!(lines.finish(), "工作经历\n");
    }
}
