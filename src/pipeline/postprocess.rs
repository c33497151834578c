//! Post-processing: deterministic cleanup of the rewritten resume.
//!
//! Models asked for "a resume in Markdown" tend to add the same few artefacts:
//! an outer ` ```markdown ` fence, a chatty first line ("Here is your
//! optimised resume:"), Windows line endings, Unicode bullet characters that
//! Markdown does not treat as list markers, and zero-width characters pasted
//! from PDFs. None of these change the content, and all of them confuse the
//! renderer.
//!
//! ## Rule Order
//!
//! Fences come off before line endings are normalised so the fence regex
//! sees the raw answer; bullets are normalised before heading spacing so a
//! converted list directly under a heading is still recognised as a block.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw model output.
///
/// Rules (applied in order):
/// 1. Strip an outer markdown fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Drop a one-line preamble ending in `:` that precedes the first heading
/// 4. Trim trailing whitespace per line
/// 5. Turn `•`, `●`, `▪`, `·` line prefixes into `- ` list items
/// 6. Collapse runs of blank lines to a single blank line
/// 7. Ensure a blank line before every heading
/// 8. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 9. Drop leading blank lines and end with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = drop_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = normalise_bullets(&s);
    let s = collapse_blank_lines(&s);
    let s = space_headings(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer fence ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").expect("valid regex")
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Line endings ─────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Preamble ─────────────────────────────────────────────────────────

fn drop_preamble(input: &str) -> String {
    let mut lines = input.lines().skip_while(|l| l.trim().is_empty());
    let Some(first) = lines.next() else {
        return input.to_string();
    };
    let first = first.trim();
    if first.starts_with('#') || !first.ends_with(':') {
        return input.to_string();
    }
    let rest: Vec<&str> = lines.collect();
    let next_heading = rest
        .iter()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim_start().starts_with('#'));
    if next_heading {
        rest.join("\n")
    } else {
        input.to_string()
    }
}

// ── Rule 4: Trailing whitespace ──────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Unicode bullets ──────────────────────────────────────────────────

static RE_UNICODE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*)[•●▪·][ \t]*").expect("valid regex"));

fn normalise_bullets(input: &str) -> String {
    RE_UNICODE_BULLET.replace_all(input, "${1}- ").into_owned()
}

// ── Rule 6: Blank lines ──────────────────────────────────────────────────────

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

// ── Rule 7: Heading spacing ──────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} ").expect("valid regex"));

fn space_headings(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 32);
    let mut in_code = false;
    for line in input.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        if !in_code && RE_HEADING.is_match(line) && !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

// ── Rule 8: Invisible characters ─────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 9: Leading blank lines, final newline ──────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_start_matches('\n').trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}
