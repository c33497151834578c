//! Font resolution for the PDF renderer.
//!
//! A [`FontChain`] is an ordered list of [`FontSource`]s; the first one that
//! loads wins. Only single-face TrueType files with `glyf` outlines are
//! accepted, because they are the only thing that can be embedded as
//! `FontFile2` without a subsetter. The chain always ends in the PDF
//! base-14 Helvetica family, which needs no file and therefore never fails;
//! characters outside WinAnsi are drawn as `?` in that case.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ttf_parser::{Face, GlyphId};

/// Environment variable naming a font file to try first.
pub const FONT_ENV_VAR: &str = "RESUME_POLISH_FONT";

/// One place a font may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    /// A TrueType file on disk.
    File(PathBuf),
    /// The PDF base-14 Helvetica family.
    Builtin,
}

impl FontSource {
    pub fn load(&self) -> Result<Font, String> {
        match self {
            FontSource::File(path) => TrueTypeFont::from_file(path).map(|f| Font::TrueType(Arc::new(f))),
            FontSource::Builtin => Ok(Font::Builtin),
        }
    }
}

/// Ordered font candidates.
#[derive(Debug, Clone)]
pub struct FontChain {
    sources: Vec<FontSource>,
}

impl FontChain {
    pub fn new(sources: Vec<FontSource>) -> Self {
        Self { sources }
    }

    /// A chain that goes straight to Helvetica.
    pub fn builtin_only() -> Self {
        Self::new(vec![FontSource::Builtin])
    }

    /// The default search order:
    ///
    /// 1. `configured` (e.g. `--font`), then `$RESUME_POLISH_FONT`
    /// 2. `*.ttf` files in `./fonts/`, alphabetically
    /// 3. CJK system fonts for the current OS
    /// 4. Latin system fonts for the current OS
    /// 5. built-in Helvetica
    pub fn system_default(configured: Option<&Path>) -> Self {
        let mut sources = Vec::new();
        if let Some(p) = configured {
            sources.push(FontSource::File(p.to_path_buf()));
        }
        if let Some(p) = std::env::var_os(FONT_ENV_VAR).filter(|v| !v.is_empty()) {
            sources.push(FontSource::File(PathBuf::from(p)));
        }
        sources.extend(bundled_fonts(Path::new("fonts")).into_iter().map(FontSource::File));
        sources.extend(cjk_system_fonts().into_iter().map(FontSource::File));
        sources.extend(latin_system_fonts().into_iter().map(FontSource::File));
        sources.push(FontSource::Builtin);
        Self::new(sources)
    }

    pub fn sources(&self) -> &[FontSource] {
        &self.sources
    }

    /// First loadable font; Helvetica when nothing else loads.
    pub fn resolve(&self) -> Font {
        for source in &self.sources {
            if let FontSource::File(path) = source {
                if !path.exists() {
                    continue;
                }
            }
            match source.load() {
                Ok(font) => {
                    if matches!(font, Font::Builtin) {
                        warn!(
                            "No usable TrueType font found; using Helvetica. \
                             Characters outside Latin-1 will print as '?'. {}",
                            cjk_font_hint(&unsupported_cjk_fonts())
                        );
                    } else {
                        info!("Using font {}", font.name());
                    }
                    return font;
                }
                Err(reason) => {
                    debug!("Skipping font candidate {:?}: {}", source, reason);
                }
            }
        }
        Font::Builtin
    }
}

fn bundled_fonts(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("ttf"))
        })
        .collect();
    found.sort();
    found
}

fn cjk_system_fonts() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = if cfg!(target_os = "windows") {
        [
            r"C:\Windows\Fonts\simhei.ttf",
            r"C:\Windows\Fonts\simkai.ttf",
            r"C:\Windows\Fonts\simfang.ttf",
            r"C:\Windows\Fonts\Deng.ttf",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    } else if cfg!(target_os = "macos") {
        [
            "/Library/Fonts/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/Library/Fonts/Songti.ttf",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    } else {
        [
            "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
            "/usr/share/fonts/google-droid/DroidSansFallbackFull.ttf",
            "/usr/share/fonts/droid/DroidSansFallbackFull.ttf",
            "/usr/share/fonts/truetype/arphic-gkai00mp/gkai00mp.ttf",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttf",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    };
    if let Some(user_dir) = dirs::font_dir() {
        paths.push(user_dir.join("DroidSansFallbackFull.ttf"));
        paths.push(user_dir.join("simhei.ttf"));
    }
    paths
}

/// Installed CJK fonts in formats that cannot be embedded: collections
/// (`.ttc`) and CFF-outline `.otf`.
pub fn unsupported_cjk_fonts() -> Vec<PathBuf> {
    let paths: &[&str] = if cfg!(target_os = "windows") {
        &[r"C:\Windows\Fonts\msyh.ttc", r"C:\Windows\Fonts\simsun.ttc"]
    } else if cfg!(target_os = "macos") {
        &[
            "/System/Library/Fonts/PingFang.ttc",
            "/System/Library/Fonts/STHeiti Medium.ttc",
            "/System/Library/Fonts/Hiragino Sans GB.ttc",
        ]
    } else {
        &[
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/opentype/noto/NotoSerifCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/opentype/noto/NotoSansCJKsc-Regular.otf",
            "/usr/share/fonts/truetype/wqy/wqy-zenhei.ttc",
            "/usr/share/fonts/wenquanyi/wqy-zenhei/wqy-zenhei.ttc",
        ]
    };
    paths.iter().map(PathBuf::from).filter(|p| p.exists()).collect()
}

/// What to tell the user when no font with CJK glyphs was found.
pub fn cjk_font_hint(unsupported: &[PathBuf]) -> String {
    let mut hint = String::from(
        "No CJK TrueType font with glyf outlines was found; font collections (.ttc) \
         and CFF-based .otf fonts cannot be embedded.",
    );
    if !unsupported.is_empty() {
        let list: Vec<String> = unsupported.iter().map(|p| p.display().to_string()).collect();
        hint.push_str(&format!(" Installed but unusable: {}.", list.join(", ")));
    }
    hint.push_str(&format!(
        " Put a CJK .ttf in ./fonts, set {FONT_ENV_VAR} or pass --font."
    ));
    hint
}

fn latin_system_fonts() -> Vec<PathBuf> {
    let paths: &[&str] = if cfg!(target_os = "windows") {
        &[r"C:\Windows\Fonts\arial.ttf", r"C:\Windows\Fonts\calibri.ttf"]
    } else if cfg!(target_os = "macos") {
        &[
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/Library/Fonts/Arial.ttf",
        ]
    } else {
        &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
        ]
    };
    paths.iter().map(PathBuf::from).collect()
}

// ── Loaded fonts ─────────────────────────────────────────────────────────

/// A font the layout can measure and the PDF writer can reference.
#[derive(Debug, Clone)]
pub enum Font {
    TrueType(Arc<TrueTypeFont>),
    Builtin,
}

impl Font {
    pub fn name(&self) -> &str {
        match self {
            Font::TrueType(f) => &f.name,
            Font::Builtin => "Helvetica",
        }
    }

    /// Advance width of `ch` in thousandths of an em.
    pub fn char_width(&self, ch: char, bold: bool) -> f32 {
        match self {
            Font::TrueType(f) => f.char_width(ch),
            Font::Builtin => helvetica_width(ch, bold),
        }
    }

    /// Width of `text` in points at `size`.
    pub fn text_width(&self, text: &str, size: f32, bold: bool) -> f32 {
        text.chars().map(|c| self.char_width(c, bold)).sum::<f32>() * size / 1000.0
    }

    /// Whether `ch` can be drawn with a real glyph.
    pub fn covers(&self, ch: char) -> bool {
        match self {
            Font::TrueType(f) => f.glyph_id(ch).is_some(),
            Font::Builtin => winansi_byte(ch).is_some(),
        }
    }
}

/// A parsed single-face TrueType font plus its raw bytes for embedding.
pub struct TrueTypeFont {
    /// PostScript name, sanitised for use as a PDF name.
    pub name: String,
    pub path: PathBuf,
    pub data: Vec<u8>,
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub cap_height: i16,
    pub bbox: [i16; 4],
    glyph_ids: HashMap<char, u16>,
    advances: Vec<u16>,
}

impl std::fmt::Debug for TrueTypeFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrueTypeFont")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("bytes", &self.data.len())
            .field("glyphs", &self.advances.len())
            .finish()
    }
}

impl TrueTypeFont {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let data = std::fs::read(path).map_err(|e| e.to_string())?;
        Self::from_bytes(data, path)
    }

    pub fn from_bytes(data: Vec<u8>, path: &Path) -> Result<Self, String> {
        if ttf_parser::fonts_in_collection(&data).is_some() {
            return Err("font collections cannot be embedded".to_string());
        }
        let face = Face::parse(&data, 0).map_err(|e| e.to_string())?;
        if face.tables().glyf.is_none() {
            return Err("no TrueType outlines (glyf table)".to_string());
        }

        let mut glyph_ids = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    if let (Some(ch), Some(gid)) = (char::from_u32(cp), subtable.glyph_index(cp)) {
                        glyph_ids.entry(ch).or_insert(gid.0);
                    }
                });
            }
        }
        if glyph_ids.is_empty() {
            return Err("no Unicode cmap".to_string());
        }

        let advances = (0..face.number_of_glyphs())
            .map(|i| face.glyph_hor_advance(GlyphId(i)).unwrap_or(0))
            .collect();

        let raw_name = face
            .names()
            .into_iter()
            .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .and_then(|n| n.to_string())
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default();

        let bbox = face.global_bounding_box();
        let units_per_em = face.units_per_em();
        let ascender = face.ascender();
        let descender = face.descender();
        let cap_height = face.capital_height().unwrap_or(ascender);

        Ok(Self {
            name: sanitize_pdf_name(&raw_name),
            path: path.to_path_buf(),
            units_per_em,
            ascender,
            descender,
            cap_height,
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            glyph_ids,
            advances,
            data,
        })
    }

    pub fn glyph_id(&self, ch: char) -> Option<u16> {
        self.glyph_ids.get(&ch).copied()
    }

    /// Glyph id to draw for `ch`; `.notdef` (0) when the font lacks it.
    pub fn glyph_or_notdef(&self, ch: char) -> u16 {
        self.glyph_id(ch).unwrap_or(0)
    }

    /// Advance of a glyph in thousandths of an em.
    pub fn glyph_width(&self, gid: u16) -> f32 {
        let units = self.advances.get(gid as usize).copied().unwrap_or(0);
        self.scale(units as i32)
    }

    pub fn char_width(&self, ch: char) -> f32 {
        self.glyph_width(self.glyph_or_notdef(ch))
    }

    /// Font units → thousandths of an em.
    pub fn scale(&self, units: i32) -> f32 {
        units as f32 * 1000.0 / self.units_per_em.max(1) as f32
    }
}

fn sanitize_pdf_name(raw: &str) -> String {
    let out: String = raw
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect();
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}

// ── Helvetica (base-14) ──────────────────────────────────────────────────

/// Helvetica advance widths for ASCII 32..=126 (Adobe AFM).
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :;<=>?@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [\]^_`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {|}~
];

/// Helvetica-Bold advance widths for ASCII 32..=126 (Adobe AFM).
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    333, 333, 584, 584, 584, 611, 975, // :;<=>?@
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    333, 278, 333, 584, 556, 333, // [\]^_`
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // a-m
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // n-z
    389, 280, 389, 584, // {|}~
];

fn helvetica_width(ch: char, bold: bool) -> f32 {
    let table = if bold {
        &HELVETICA_BOLD_WIDTHS
    } else {
        &HELVETICA_WIDTHS
    };
    let code = ch as u32;
    let w = if (32..=126).contains(&code) {
        table[(code - 32) as usize]
    } else {
        match ch {
            '\u{a0}' => 278,
            '•' => 350,
            '…' | '—' | '‰' | '™' => 1000,
            '‘' | '’' | '‚' => {
                if bold {
                    278
                } else {
                    222
                }
            }
            '“' | '”' | '„' => {
                if bold {
                    500
                } else {
                    333
                }
            }
            _ if winansi_byte(ch).is_some() => 556,
            // Drawn as '?'.
            _ => table[('?' as u32 - 32) as usize],
        }
    };
    w as f32
}

/// WinAnsiEncoding byte for `ch`, if it has one.
pub fn winansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7e | 0xa0..=0xff => Some(code as u8),
        _ => match ch {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8a),
            '‹' => Some(0x8b),
            'Œ' => Some(0x8c),
            'Ž' => Some(0x8e),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9a),
            '›' => Some(0x9b),
            'œ' => Some(0x9c),
            'ž' => Some(0x9e),
            'Ÿ' => Some(0x9f),
            _ => None,
        },
    }
}

/// Encode `text` as WinAnsi bytes, replacing anything unmappable with `?`.
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| winansi_byte(c).unwrap_or(b'?'))
        .collect()
}
