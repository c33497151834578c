//! Line breaking, justification and pagination.
//!
//! Input is the block list from [`super::markdown`]; output is a list of
//! pages, each a flat list of positioned [`DrawOp`]s in PDF user space
//! (origin bottom-left, points). The PDF writer only has to serialise them.

use super::fonts::Font;
use super::markdown::{Block, BlockKind, Run, RunStyle};

/// A4 portrait.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 72.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
const DARK_BLUE: Rgb = Rgb(0.0, 0.0, 0.545);
const LINK_BLUE: Rgb = Rgb(0.0, 0.2, 0.8);
const GRAY: Rgb = Rgb(0.3, 0.3, 0.3);
const RULE_GRAY: Rgb = Rgb(0.6, 0.6, 0.6);

/// Indent per list level.
const LIST_INDENT: f32 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Justify,
}

/// Paragraph style for one block kind.
#[derive(Debug, Clone, Copy)]
pub struct BlockStyle {
    pub size: f32,
    pub leading: f32,
    pub color: Rgb,
    pub bold: bool,
    pub italic: bool,
    pub align: Align,
    pub space_before: f32,
    pub space_after: f32,
    pub indent: f32,
    /// Draw a rule under the block (section headings).
    pub underline: bool,
    /// Keep spaces as typed (code).
    pub preserve_spaces: bool,
}

impl BlockStyle {
    const BODY: BlockStyle = BlockStyle {
        size: 11.0,
        leading: 16.0,
        color: BLACK,
        bold: false,
        italic: false,
        align: Align::Justify,
        space_before: 0.0,
        space_after: 6.0,
        indent: 0.0,
        underline: false,
        preserve_spaces: false,
    };

    pub fn for_kind(kind: &BlockKind) -> BlockStyle {
        match kind {
            BlockKind::Title => BlockStyle {
                size: 18.0,
                leading: 22.0,
                bold: true,
                align: Align::Center,
                space_after: 20.0,
                ..Self::BODY
            },
            BlockKind::Section => BlockStyle {
                size: 14.0,
                leading: 18.0,
                color: DARK_BLUE,
                bold: true,
                align: Align::Left,
                space_before: 10.0,
                space_after: 12.0,
                underline: true,
                ..Self::BODY
            },
            BlockKind::Subsection => BlockStyle {
                size: 12.5,
                leading: 17.0,
                bold: true,
                align: Align::Left,
                space_before: 6.0,
                space_after: 4.0,
                ..Self::BODY
            },
            BlockKind::Paragraph => Self::BODY,
            BlockKind::ListItem { depth, .. } => BlockStyle {
                align: Align::Left,
                space_after: 3.0,
                indent: LIST_INDENT * (*depth).max(1) as f32,
                ..Self::BODY
            },
            BlockKind::Quote => BlockStyle {
                italic: true,
                color: GRAY,
                align: Align::Left,
                indent: LIST_INDENT,
                ..Self::BODY
            },
            BlockKind::Code => BlockStyle {
                size: 9.5,
                leading: 12.5,
                color: GRAY,
                align: Align::Left,
                indent: 8.0,
                preserve_spaces: true,
                ..Self::BODY
            },
            BlockKind::Rule => BlockStyle {
                leading: 0.0,
                space_before: 6.0,
                space_after: 6.0,
                align: Align::Left,
                ..Self::BODY
            },
            BlockKind::TableRow { header } => BlockStyle {
                size: 10.5,
                leading: 14.0,
                bold: *header,
                align: Align::Left,
                space_after: 2.0,
                ..Self::BODY
            },
        }
    }
}

/// Something to draw on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        italic: bool,
        color: Rgb,
        text: String,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        color: Rgb,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub ops: Vec<DrawOp>,
}

impl PageLayout {
    /// All text on the page, in drawing order.
    pub fn text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                DrawOp::Line { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Tokenising ───────────────────────────────────────────────────────────

/// Smallest unbreakable piece of a line.
#[derive(Debug, Clone)]
struct Atom {
    text: String,
    style: RunStyle,
    width: f32,
    /// A collapsible space precedes this atom.
    space_before: bool,
    /// No line break allowed before this atom.
    glue: bool,
    /// Forced line break; carries no text.
    hard_break: bool,
}

pub(crate) fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x11FF
        | 0x2E80..=0x9FFF
        | 0xA960..=0xA97F
        | 0xAC00..=0xD7FF
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFFEF
        | 0x20000..=0x3FFFF)
}

/// Punctuation that must not start a line.
pub(crate) fn is_closing_punct(ch: char) -> bool {
    matches!(
        ch,
        '，' | '。' | '、' | '；' | '：' | '！' | '？' | '）' | '」' | '』' | '》' | '〉' | '】'
            | ',' | '.' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '%'
    )
}

struct Tokenizer<'a> {
    font: &'a Font,
    style: BlockStyle,
    atoms: Vec<Atom>,
    word: String,
    word_style: RunStyle,
    word_glue: bool,
    pending_space: bool,
}

impl<'a> Tokenizer<'a> {
    fn new(font: &'a Font, style: BlockStyle) -> Self {
        Self {
            font,
            style,
            atoms: Vec::new(),
            word: String::new(),
            word_style: RunStyle::default(),
            word_glue: false,
            pending_space: false,
        }
    }

    fn tokenize(font: &'a Font, style: BlockStyle, runs: &[Run]) -> Vec<Atom> {
        let mut t = Self::new(font, style);
        for run in runs {
            t.run(run);
        }
        t.end_word();
        t.atoms
    }

    /// Whether a closing punctuation mark at this point attaches to the
    /// previous atom.
    fn attaches(&self, ch: char) -> bool {
        !self.pending_space
            && is_closing_punct(ch)
            && self.atoms.last().is_some_and(|a| !a.hard_break)
    }

    fn push_atom(&mut self, text: String, style: RunStyle, glue: bool) {
        let width = self
            .font
            .text_width(&text, self.style.size, style.bold || self.style.bold);
        let space_before = std::mem::take(&mut self.pending_space);
        self.atoms.push(Atom {
            text,
            style,
            width,
            space_before,
            glue: glue && !space_before,
            hard_break: false,
        });
    }

    fn end_word(&mut self) {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            let glue = std::mem::take(&mut self.word_glue);
            self.push_atom(word, self.word_style, glue);
        }
    }

    fn run(&mut self, run: &Run) {
        if run.is_break() {
            self.end_word();
            self.pending_space = false;
            self.atoms.push(Atom {
                text: String::new(),
                style: run.style,
                width: 0.0,
                space_before: false,
                glue: false,
                hard_break: true,
            });
            return;
        }

        for ch in run.text.chars() {
            if ch.is_whitespace() {
                self.end_word();
                if self.style.preserve_spaces {
                    self.push_atom(" ".to_string(), run.style, false);
                } else if !self.atoms.is_empty() {
                    self.pending_space = true;
                }
            } else if is_cjk(ch) {
                self.end_word();
                let glue = self.attaches(ch);
                self.push_atom(ch.to_string(), run.style, glue);
            } else if self.word.is_empty() {
                self.word_glue = self.attaches(ch);
                self.word_style = run.style;
                self.word.push(ch);
            } else if self.word_style != run.style {
                // Style changes mid-word: split, but keep the halves together.
                self.end_word();
                self.word_glue = true;
                self.word_style = run.style;
                self.word.push(ch);
            } else {
                self.word.push(ch);
            }
        }
    }
}

/// Split an atom wider than `avail` into pieces that fit.
fn split_wide(atom: Atom, avail: f32, font: &Font, style: &BlockStyle) -> Vec<Atom> {
    let bold = atom.style.bold || style.bold;
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut width = 0.0;
    for ch in atom.text.chars() {
        let w = font.char_width(ch, bold) * style.size / 1000.0;
        if !text.is_empty() && width + w > avail {
            pieces.push(std::mem::take(&mut text));
            width = 0.0;
        }
        text.push(ch);
        width += w;
    }
    if !text.is_empty() {
        pieces.push(text);
    }
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Atom {
            width: font.text_width(&text, style.size, bold),
            text,
            style: atom.style,
            space_before: i == 0 && atom.space_before,
            glue: i == 0 && atom.glue,
            hard_break: false,
        })
        .collect()
}

// ── Line breaking ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Line {
    atoms: Vec<Atom>,
    /// Last line of the block, or ended by a forced break.
    last: bool,
}

fn natural_width(atoms: &[Atom], space: f32) -> f32 {
    atoms
        .iter()
        .enumerate()
        .map(|(i, a)| a.width + if i > 0 && a.space_before { space } else { 0.0 })
        .sum()
}

/// Greedy first-fit line breaking.
fn break_lines(atoms: Vec<Atom>, avail: f32, space: f32) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current: Vec<Atom> = Vec::new();

    for atom in atoms {
        if atom.hard_break {
            lines.push(Line {
                atoms: std::mem::take(&mut current),
                last: true,
            });
            continue;
        }

        let gap = if current.is_empty() || !atom.space_before {
            0.0
        } else {
            space
        };
        let overflows = natural_width(&current, space) + gap + atom.width > avail;

        if overflows && !current.is_empty() {
            if !atom.glue {
                lines.push(Line {
                    atoms: std::mem::take(&mut current),
                    last: false,
                });
            } else if current.len() > 1 {
                // Carry the previous atom down with its punctuation.
                let carried = current.pop();
                lines.push(Line {
                    atoms: std::mem::take(&mut current),
                    last: false,
                });
                current.extend(carried);
            }
        }
        current.push(atom);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(Line {
            atoms: current,
            last: true,
        });
    } else if let Some(last) = lines.last_mut() {
        last.last = true;
    }
    lines
}

// ── Placement ────────────────────────────────────────────────────────────

struct Prepared {
    kind: BlockKind,
    style: BlockStyle,
    lines: Vec<Line>,
    space: f32,
}

impl Prepared {
    fn height(&self) -> f32 {
        self.lines.len() as f32 * self.style.leading
    }

    fn is_heading(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::Title | BlockKind::Section | BlockKind::Subsection
        )
    }
}

fn prepare(block: &Block, font: &Font) -> Prepared {
    let style = BlockStyle::for_kind(&block.kind);
    let avail = CONTENT_WIDTH - style.indent;
    let space = font.text_width(" ", style.size, style.bold);

    let lines = if block.kind == BlockKind::Rule {
        Vec::new()
    } else {
        let atoms = Tokenizer::tokenize(font, style, &block.runs)
            .into_iter()
            .flat_map(|a| {
                if a.width > avail {
                    split_wide(a, avail, font, &style)
                } else {
                    vec![a]
                }
            })
            .collect();
        break_lines(atoms, avail, space)
    };

    Prepared {
        kind: block.kind.clone(),
        style,
        lines,
        space,
    }
}

struct Placer<'a> {
    font: &'a Font,
    pages: Vec<PageLayout>,
    cursor: f32,
}

impl<'a> Placer<'a> {
    const TOP: f32 = PAGE_HEIGHT - MARGIN;
    const BOTTOM: f32 = MARGIN;

    fn new(font: &'a Font) -> Self {
        Self {
            font,
            pages: vec![PageLayout::default()],
            cursor: Self::TOP,
        }
    }

    fn page_is_empty(&self) -> bool {
        self.pages.last().is_none_or(|p| p.ops.is_empty())
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.cursor = Self::TOP;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.cursor - height < Self::BOTTOM && !self.page_is_empty() {
            self.new_page();
        }
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn place(&mut self, block: &Prepared, next: Option<&Prepared>) {
        let style = &block.style;
        let space_before = if self.page_is_empty() {
            0.0
        } else {
            style.space_before
        };

        if block.is_heading() {
            let with_next = next.map_or(0.0, |n| n.style.space_before + n.style.leading);
            self.ensure_room(space_before + block.height() + style.space_after + with_next);
        }
        if !self.page_is_empty() {
            self.cursor -= space_before;
        }

        if block.kind == BlockKind::Rule {
            self.ensure_room(1.0);
            self.push(DrawOp::Line {
                x1: MARGIN,
                y1: self.cursor,
                x2: PAGE_WIDTH - MARGIN,
                y2: self.cursor,
                width: 0.5,
                color: RULE_GRAY,
            });
            self.cursor -= style.space_after;
            return;
        }

        let x0 = MARGIN + style.indent;
        let avail = CONTENT_WIDTH - style.indent;
        let mut baseline = self.cursor;

        for (i, line) in block.lines.iter().enumerate() {
            self.ensure_room(style.leading);
            baseline = self.cursor - style.leading + (style.leading - style.size) / 2.0
                + style.size * 0.22;

            if i == 0 {
                if let BlockKind::ListItem { marker, .. } = &block.kind {
                    if !marker.is_empty() {
                        let w = self.font.text_width(marker, style.size, false);
                        self.push(DrawOp::Text {
                            x: x0 - 5.0 - w,
                            y: baseline,
                            size: style.size,
                            bold: false,
                            italic: false,
                            color: BLACK,
                            text: marker.clone(),
                        });
                    }
                }
            }

            self.emit_line(line, block, x0, avail, baseline);
            self.cursor -= style.leading;
        }

        if style.underline {
            let y = baseline - style.size * 0.35;
            self.push(DrawOp::Line {
                x1: MARGIN,
                y1: y,
                x2: PAGE_WIDTH - MARGIN,
                y2: y,
                width: 0.75,
                color: style.color,
            });
        }
        self.cursor -= style.space_after;
    }

    fn emit_line(&mut self, line: &Line, block: &Prepared, x0: f32, avail: f32, baseline: f32) {
        let style = &block.style;
        if line.atoms.is_empty() {
            return;
        }
        let natural = natural_width(&line.atoms, block.space);

        let gaps = line.atoms.iter().skip(1).filter(|a| !a.glue).count();
        let extra = if style.align == Align::Justify && !line.last && gaps > 0 {
            ((avail - natural) / gaps as f32).max(0.0)
        } else {
            0.0
        };
        let mut x = match style.align {
            Align::Center => x0 + ((avail - natural) / 2.0).max(0.0),
            Align::Left | Align::Justify => x0,
        };

        // Consecutive atoms drawn as one string: (x, style, text).
        let mut pending: Option<(f32, RunStyle, String)> = None;
        for (i, atom) in line.atoms.iter().enumerate() {
            let mut spaced = false;
            if i > 0 {
                if atom.space_before {
                    x += block.space;
                    spaced = true;
                }
                if !atom.glue {
                    x += extra;
                }
            }

            let mergeable = extra == 0.0
                && pending
                    .as_ref()
                    .is_some_and(|(_, s, _)| *s == atom.style);
            if mergeable {
                if let Some((_, _, text)) = pending.as_mut() {
                    if spaced {
                        text.push(' ');
                    }
                    text.push_str(&atom.text);
                }
            } else {
                if let Some(run) = pending.take() {
                    self.push_text(run, style, baseline);
                }
                pending = Some((x, atom.style, atom.text.clone()));
            }
            x += atom.width;
        }
        if let Some(run) = pending.take() {
            self.push_text(run, style, baseline);
        }
    }

    fn push_text(&mut self, (x, run, text): (f32, RunStyle, String), style: &BlockStyle, y: f32) {
        let color = if run.link {
            LINK_BLUE
        } else if run.code {
            GRAY
        } else {
            style.color
        };
        self.push(DrawOp::Text {
            x,
            y,
            size: style.size,
            bold: style.bold || run.bold,
            italic: style.italic || run.italic,
            color,
            text,
        });
    }
}

/// Lay out blocks onto A4 pages. Always returns at least one page.
pub fn layout_document(blocks: &[Block], font: &Font) -> Vec<PageLayout> {
    let prepared: Vec<Prepared> = blocks.iter().map(|b| prepare(b, font)).collect();
    let mut placer = Placer::new(font);
    for (i, block) in prepared.iter().enumerate() {
        placer.place(block, prepared.get(i + 1));
    }
    placer.pages
}
