//! Markdown → styled blocks.
//!
//! pulldown-cmark does the parsing; this module flattens its event stream
//! into the handful of block kinds a resume actually uses. Each block
//! carries a list of [`Run`]s (text plus inline style), and a `"\n"` run
//! marks a forced line break.
//!
//! Soft breaks are kept as line breaks: resumes put contact details on
//! consecutive lines and expect them to stay there.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};

/// Inline style flags for a run of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: RunStyle,
}

impl Run {
    pub fn is_break(&self) -> bool {
        self.text == "\n"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// Level-1 heading.
    Title,
    /// Level-2 heading.
    Section,
    /// Level 3 and deeper.
    Subsection,
    Paragraph,
    /// `marker` is `•`, `–` or `3.`; empty for a continuation paragraph
    /// inside an item. `depth` starts at 1.
    ListItem { marker: String, depth: usize },
    Quote,
    Code,
    Rule,
    TableRow { header: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub runs: Vec<Run>,
}

impl Block {
    /// Text of all runs, breaks included.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Parse markdown into blocks.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(markdown, options) {
        builder.event(event);
    }
    builder.finish()
}

/// What an `Event::Start` opened, so the matching `Event::End` knows what
/// to close without inspecting the end tag.
#[derive(Debug)]
enum Open {
    Paragraph,
    Heading,
    Quote,
    CodeBlock,
    List,
    Item,
    TableHead,
    TableRow,
    TableCell,
    Strong,
    Emphasis,
    Link,
    Other,
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    stack: Vec<Open>,
    current: Option<Block>,
    /// Next number for each open list; `None` for bullet lists.
    lists: Vec<Option<u64>>,
    /// Marker of an item whose text has not started yet.
    pending_item: Option<(String, usize)>,
    quote_depth: usize,
    bold: usize,
    italic: usize,
    link: usize,
    in_table_head: bool,
    row: Vec<Vec<Run>>,
    cell: Option<Vec<Run>>,
}

impl BlockBuilder {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => {
                let open = self.stack.pop().unwrap_or(Open::Other);
                self.end(open);
            }
            Event::Text(text) => self.text(&text, false),
            Event::Code(code) => self.text(&code, true),
            Event::SoftBreak | Event::HardBreak => self.line_break(),
            Event::InlineHtml(html) if is_br(&html) => self.line_break(),
            Event::Rule => {
                self.flush();
                self.blocks.push(Block {
                    kind: BlockKind::Rule,
                    runs: Vec::new(),
                });
            }
            Event::TaskListMarker(checked) => {
                self.text(if checked { "[x] " } else { "[ ] " }, false);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let open = match tag {
            Tag::Paragraph => {
                self.flush();
                let kind = self.block_kind_for_text();
                self.current = Some(Block {
                    kind,
                    runs: Vec::new(),
                });
                Open::Paragraph
            }
            Tag::Heading { level, .. } => {
                self.flush();
                let kind = match level_to_u8(level) {
                    1 => BlockKind::Title,
                    2 => BlockKind::Section,
                    _ => BlockKind::Subsection,
                };
                self.current = Some(Block {
                    kind,
                    runs: Vec::new(),
                });
                Open::Heading
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
                Open::Quote
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.current = Some(Block {
                    kind: BlockKind::Code,
                    runs: Vec::new(),
                });
                Open::CodeBlock
            }
            Tag::List(first) => {
                self.flush();
                self.lists.push(first);
                Open::List
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().max(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}.");
                        *n += 1;
                        marker
                    }
                    _ if depth == 1 => "•".to_string(),
                    _ => "–".to_string(),
                };
                self.pending_item = Some((marker, depth));
                Open::Item
            }
            Tag::TableHead => {
                self.flush();
                self.in_table_head = true;
                self.row.clear();
                Open::TableHead
            }
            Tag::TableRow => {
                self.row.clear();
                Open::TableRow
            }
            Tag::TableCell => {
                self.cell = Some(Vec::new());
                Open::TableCell
            }
            Tag::Strong => {
                self.bold += 1;
                Open::Strong
            }
            Tag::Emphasis => {
                self.italic += 1;
                Open::Emphasis
            }
            Tag::Link { .. } => {
                self.link += 1;
                Open::Link
            }
            Tag::Table(_) => {
                self.flush();
                Open::Other
            }
            _ => Open::Other,
        };
        self.stack.push(open);
    }

    fn end(&mut self, open: Open) {
        match open {
            Open::Paragraph | Open::Heading | Open::CodeBlock => self.flush(),
            Open::Quote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Open::List => {
                self.flush();
                self.lists.pop();
            }
            Open::Item => {
                self.flush();
                // An item with no text still shows its marker.
                if let Some((marker, depth)) = self.pending_item.take() {
                    self.blocks.push(Block {
                        kind: BlockKind::ListItem { marker, depth },
                        runs: Vec::new(),
                    });
                }
            }
            Open::TableCell => {
                if let Some(cell) = self.cell.take() {
                    self.row.push(cell);
                }
            }
            Open::TableHead | Open::TableRow => {
                let header = self.in_table_head;
                self.in_table_head = false;
                self.push_table_row(header);
            }
            Open::Strong => self.bold = self.bold.saturating_sub(1),
            Open::Emphasis => self.italic = self.italic.saturating_sub(1),
            Open::Link => self.link = self.link.saturating_sub(1),
            Open::Other => {}
        }
    }

    fn style(&self, code: bool) -> RunStyle {
        RunStyle {
            bold: self.bold > 0 || self.in_table_head,
            italic: self.italic > 0,
            code,
            link: self.link > 0,
        }
    }

    fn text(&mut self, text: &str, code: bool) {
        if text.is_empty() {
            return;
        }
        let style = self.style(code);

        if let Some(cell) = self.cell.as_mut() {
            push_run(cell, text, style);
            return;
        }

        if self.current.is_none() {
            let kind = self.block_kind_for_text();
            self.current = Some(Block {
                kind,
                runs: Vec::new(),
            });
        }
        let Some(block) = self.current.as_mut() else {
            return;
        };

        if block.kind == BlockKind::Code {
            // Code text arrives line by line, each ending in a newline.
            let body = text.strip_suffix('\n').unwrap_or(text);
            for (i, line) in body.split('\n').enumerate() {
                if i > 0 || !block.runs.is_empty() {
                    push_run(&mut block.runs, "\n", style);
                }
                push_run(&mut block.runs, line, style);
            }
        } else {
            push_run(&mut block.runs, text, style);
        }
    }

    fn line_break(&mut self) {
        if let Some(cell) = self.cell.as_mut() {
            push_run(cell, " ", RunStyle::default());
            return;
        }
        if let Some(block) = self.current.as_mut() {
            block.runs.push(Run {
                text: "\n".to_string(),
                style: RunStyle::default(),
            });
        }
    }

    /// Kind for a text block that is about to open.
    fn block_kind_for_text(&mut self) -> BlockKind {
        if let Some((marker, depth)) = self.pending_item.take() {
            BlockKind::ListItem { marker, depth }
        } else if !self.lists.is_empty() {
            BlockKind::ListItem {
                marker: String::new(),
                depth: self.lists.len(),
            }
        } else if self.quote_depth > 0 {
            BlockKind::Quote
        } else {
            BlockKind::Paragraph
        }
    }

    fn push_table_row(&mut self, header: bool) {
        let cells = std::mem::take(&mut self.row);
        if cells.is_empty() {
            return;
        }
        let mut runs = Vec::new();
        for (i, cell) in cells.into_iter().enumerate() {
            if i > 0 {
                push_run(&mut runs, " | ", RunStyle { bold: header, ..Default::default() });
            }
            for run in cell {
                push_run(&mut runs, &run.text, run.style);
            }
        }
        self.blocks.push(Block {
            kind: BlockKind::TableRow { header },
            runs,
        });
    }

    fn flush(&mut self) {
        if let Some(mut block) = self.current.take() {
            while block.runs.last().is_some_and(Run::is_break) {
                block.runs.pop();
            }
            let empty = block.runs.iter().all(|r| r.text.trim().is_empty());
            if !empty || block.kind == BlockKind::Code {
                self.blocks.push(block);
            }
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

/// Append text, merging with the previous run when the style matches.
fn push_run(runs: &mut Vec<Run>, text: &str, style: RunStyle) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = runs.last_mut() {
        if last.style == style && !last.is_break() && text != "\n" {
            last.text.push_str(text);
            return;
        }
    }
    runs.push(Run {
        text: text.to_string(),
        style,
    });
}

fn is_br(html: &str) -> bool {
    let t = html.trim().to_ascii_lowercase();
    t == "<br>" || t == "<br/>" || t == "<br />"
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(md: &str) -> Vec<BlockKind> {
        parse_blocks(md).into_iter().map(|b| b.kind).collect()
    }

    #[test]
    fn headings_map_to_title_section_subsection() {
        assert_eq!(
            kinds("# Name\n## Skills\n### Rust\n#### Deep"),
            [
                BlockKind::Title,
                BlockKind::Section,
                BlockKind::Subsection,
                BlockKind::Subsection
            ]
        );
    }

    #[test]
    fn soft_breaks_become_line_breaks() {
        let blocks = parse_blocks("# 姓名\n电话：123\n邮箱：a@b.c");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].plain_text(), "电话：123\n邮箱：a@b.c");
    }

    #[test]
    fn inline_styles_are_tracked() {
        let blocks = parse_blocks("Built **fast** *tools* with `cargo` at [ACME](https://x.y)");
        let runs = &blocks[0].runs;
        let bold = runs.iter().find(|r| r.text == "fast").unwrap();
        assert!(bold.style.bold && !bold.style.italic);
        assert!(runs.iter().any(|r| r.text == "tools" && r.style.italic));
        assert!(runs.iter().any(|r| r.text == "cargo" && r.style.code));
        assert!(runs.iter().any(|r| r.text == "ACME" && r.style.link));
    }

    #[test]
    fn nested_and_ordered_lists() {
        let blocks = parse_blocks("- a\n  - b\n1. one\n2. two\n");
        let items: Vec<(String, usize)> = blocks
            .iter()
            .filter_map(|b| match &b.kind {
                BlockKind::ListItem { marker, depth } => Some((marker.clone(), *depth)),
                _ => None,
            })
            .collect();
        assert_eq!(
            items,
            [
                ("•".to_string(), 1),
                ("–".to_string(), 2),
                ("1.".to_string(), 1),
                ("2.".to_string(), 1)
            ]
        );
    }

    #[test]
    fn loose_item_keeps_marker_on_first_paragraph() {
        let blocks = parse_blocks("- first para\n\n  second para\n");
        assert_eq!(
            blocks[0].kind,
            BlockKind::ListItem {
                marker: "•".into(),
                depth: 1
            }
        );
        assert_eq!(
            blocks[1].kind,
            BlockKind::ListItem {
                marker: String::new(),
                depth: 1
            }
        );
    }

    #[test]
    fn table_rows_join_cells() {
        let blocks = parse_blocks("| School | Degree |\n|---|---|\n| MIT | BSc |\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::TableRow { header: true });
        assert_eq!(blocks[0].plain_text(), "School | Degree");
        assert!(blocks[0].runs.iter().all(|r| r.style.bold));
        assert_eq!(blocks[1].plain_text(), "MIT | BSc");
    }

    #[test]
    fn code_block_lines_are_breaks() {
        let blocks = parse_blocks("```\nfn main() {}\nlet x = 1;\n```\n");
        assert_eq!(blocks[0].kind, BlockKind::Code);
        assert_eq!(blocks[0].plain_text(), "fn main() {}\nlet x = 1;");

        let blocks = parse_blocks("```\na\n\nb\n```\n");
        assert_eq!(blocks[0].plain_text(), "a\n\nb");
    }

    #[test]
    fn quote_and_rule() {
        assert_eq!(
            kinds("> quoted\n\n---\n\ntext"),
            [BlockKind::Quote, BlockKind::Rule, BlockKind::Paragraph]
        );
    }

    #[test]
    fn empty_input_has_no_blocks() {
        assert!(parse_blocks("").is_empty());
        assert!(parse_blocks("   \n\n").is_empty());
    }
}
