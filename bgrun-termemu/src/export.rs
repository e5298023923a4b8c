//! Terminal content export: plain text, Markdown and HTML
//!
//! All formats render the same cells; they differ only in envelope and
//! formatting.

use crate::cell::{Attributes, Cell, Color, PALETTE};
use crate::terminal::TerminalState;

/// Output format for export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Markdown,
    Html,
}

/// Export behavior options
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Prepend the scrollback buffer to the screen before slicing
    pub include_scrollback: bool,
    /// First line of the inclusive selection; negative clamps to 0
    pub start_line: i32,
    /// Last line of the inclusive selection; negative or past-the-end
    /// clamps to the last line
    pub end_line: i32,
    pub preserve_trailing_spaces: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Text,
            include_scrollback: false,
            start_line: 0,
            end_line: -1,
            preserve_trailing_spaces: false,
        }
    }
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }
}

pub(crate) fn render(state: &TerminalState, opts: &ExportOptions) -> String {
    let lines = select_lines(state, opts);
    match opts.format {
        ExportFormat::Text => export_text(&lines, opts),
        ExportFormat::Markdown => export_markdown(&lines, opts),
        ExportFormat::Html => export_html(&lines, opts),
    }
}

fn select_lines<'a>(state: &'a TerminalState, opts: &ExportOptions) -> Vec<&'a [Cell]> {
    let mut all: Vec<&[Cell]> = Vec::with_capacity(state.scrollback.len() + state.screen.len());
    if opts.include_scrollback {
        for row in &state.scrollback {
            all.push(row);
        }
    }
    for row in &state.screen {
        all.push(row);
    }

    if all.is_empty() {
        return Vec::new();
    }

    let start = opts.start_line.max(0) as usize;
    let end = if opts.end_line < 0 || opts.end_line as usize >= all.len() {
        all.len() - 1
    } else {
        opts.end_line as usize
    };

    if start > end || start >= all.len() {
        return Vec::new();
    }

    all[start..=end].to_vec()
}

fn finish_line(out: &mut String, mut line: String, preserve_trailing: bool) {
    if !preserve_trailing {
        line.truncate(line.trim_end_matches(' ').len());
    }
    out.push_str(&line);
    out.push('\n');
}

// === Plain text ===

fn export_text(lines: &[&[Cell]], opts: &ExportOptions) -> String {
    let mut out = String::new();
    for row in lines {
        let line: String = row.iter().map(Cell::display_char).collect();
        finish_line(&mut out, line, opts.preserve_trailing_spaces);
    }
    out
}

// === Markdown ===

fn export_markdown(lines: &[&[Cell]], opts: &ExportOptions) -> String {
    let mut out = String::new();
    for row in lines {
        let line = row_to_markdown(row);
        finish_line(&mut out, line, opts.preserve_trailing_spaces);
    }
    out
}

fn markdown_span_key(cell: &Cell) -> (bool, bool, &str) {
    (cell.attr.bold, cell.attr.italic, cell.link_url())
}

fn row_to_markdown(row: &[Cell]) -> String {
    let mut out = String::new();
    let mut i = 0;

    while i < row.len() {
        let (bold, italic, url) = markdown_span_key(&row[i]);
        let start = i;
        while i < row.len() && markdown_span_key(&row[i]) == (bold, italic, url) {
            i += 1;
        }

        let mut text = String::new();
        for cell in &row[start..i] {
            let ch = cell.display_char();
            if bold || italic {
                // Inside emphasis only the backslash needs escaping
                if ch == '\\' {
                    text.push('\\');
                }
            } else if matches!(ch, '*' | '_' | '`' | '#' | '\\') {
                text.push('\\');
            }
            text.push(ch);
        }

        let span = match (bold, italic) {
            (true, true) => format!("***{}***", text),
            (true, false) => format!("**{}**", text),
            (false, true) => format!("*{}*", text),
            (false, false) => text,
        };

        if url.is_empty() {
            out.push_str(&span);
        } else {
            let span = span.replace('[', "\\[").replace(']', "\\]");
            out.push('[');
            out.push_str(&span);
            out.push_str("](");
            out.push_str(url);
            out.push(')');
        }
    }

    out
}

// === HTML ===

fn export_html(lines: &[&[Cell]], opts: &ExportOptions) -> String {
    let mut out = String::new();

    out.push_str("<!DOCTYPE html>\n");
    out.push_str("<html>\n<head>\n");
    out.push_str("  <meta charset=\"UTF-8\">\n");
    out.push_str("  <style>\n");
    out.push_str(
        "    body { font-family: monospace; background-color: #000; color: #fff; padding: 20px; }\n",
    );
    out.push_str("    pre { margin: 0; line-height: 1.2; }\n");
    out.push_str("    a { color: #4af; text-decoration: underline; }\n");
    out.push_str("    a:hover { background-color: #333; }\n");
    out.push_str("  </style>\n");
    out.push_str("</head>\n<body>\n<pre>");

    for row in lines {
        let line = row_to_html(row);
        finish_line(&mut out, line, opts.preserve_trailing_spaces);
    }

    out.push_str("</pre>\n</body>\n</html>");
    out
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn html_span_key<'a>(cell: &'a Cell) -> (&'a Attributes, &'a str, &'a str) {
    (&cell.attr, cell.link_url(), cell.link_id())
}

fn attr_style(attr: &Attributes) -> String {
    let mut parts: Vec<String> = Vec::new();

    if attr.bold {
        parts.push("font-weight: bold".into());
    }
    if attr.dim {
        parts.push("opacity: 0.5".into());
    }
    if attr.italic {
        parts.push("font-style: italic".into());
    }
    match (attr.underline, attr.strike) {
        (true, true) => parts.push("text-decoration: underline line-through".into()),
        (true, false) => parts.push("text-decoration: underline".into()),
        (false, true) => parts.push("text-decoration: line-through".into()),
        (false, false) => {}
    }
    if attr.blink {
        parts.push("animation: blink 1s step-start infinite".into());
    }
    if attr.hidden {
        parts.push("visibility: hidden".into());
    }

    let (fg, bg) = if attr.reverse {
        (attr.bg, attr.fg)
    } else {
        (attr.fg, attr.bg)
    };
    if let Color::Indexed(n) = fg {
        parts.push(format!("color: {}", PALETTE[n as usize % 16]));
    }
    if let Color::Indexed(n) = bg {
        parts.push(format!("background-color: {}", PALETTE[n as usize % 16]));
    }

    parts.join("; ")
}

fn row_to_html(row: &[Cell]) -> String {
    let mut out = String::new();
    let mut i = 0;

    while i < row.len() {
        let key = html_span_key(&row[i]);
        let (attr, url, id) = key;
        let start = i;
        while i < row.len() && html_span_key(&row[i]) == key {
            i += 1;
        }

        let text: String = row[start..i].iter().map(Cell::display_char).collect();
        let text = html_escape(&text);
        let style = attr_style(attr);

        if !url.is_empty() {
            out.push_str("<a href=\"");
            out.push_str(&html_escape(url));
            out.push('"');
            if !id.is_empty() {
                out.push_str(" data-link-id=\"");
                out.push_str(&html_escape(id));
                out.push('"');
            }
            if !style.is_empty() {
                out.push_str(" style=\"");
                out.push_str(&style);
                out.push('"');
            }
            out.push('>');
            out.push_str(&text);
            out.push_str("</a>");
        } else if !style.is_empty() {
            out.push_str("<span style=\"");
            out.push_str(&style);
            out.push_str("\">");
            out.push_str(&text);
            out.push_str("</span>");
        } else {
            out.push_str(&text);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::Terminal;

    fn text_opts() -> ExportOptions {
        ExportOptions::new(ExportFormat::Text)
    }

    #[test]
    fn test_plain_text_trims_trailing_spaces() {
        let term = Terminal::new(2, 10);
        term.feed(b"hi");
        let out = term.export(&text_opts());
        assert_eq!(out, "hi\n\n");
    }

    #[test]
    fn test_plain_text_preserves_trailing_spaces() {
        let term = Terminal::new(1, 6);
        term.feed(b"hi");
        let out = term.export(&ExportOptions {
            preserve_trailing_spaces: true,
            ..text_opts()
        });
        assert_eq!(out, "hi    \n");
    }

    #[test]
    fn test_plain_text_matches_screen_without_attrs() {
        let term = Terminal::new(1, 20);
        term.feed(b"plain row here");
        let out = term.export(&text_opts());
        assert_eq!(out, "plain row here\n");
    }

    #[test]
    fn test_selection_with_scrollback() {
        let term = Terminal::with_scrollback(2, 8, 10);
        term.feed(b"one\r\ntwo\r\nthree\r\nfour");

        // Scrollback holds [one, two], screen holds [three, four]
        let with = term.export(&ExportOptions {
            include_scrollback: true,
            ..text_opts()
        });
        assert_eq!(with, "one\ntwo\nthree\nfour\n");

        let without = term.export(&text_opts());
        assert_eq!(without, "three\nfour\n");
    }

    #[test]
    fn test_selection_range_clamping() {
        let term = Terminal::with_scrollback(2, 8, 10);
        term.feed(b"one\r\ntwo\r\nthree\r\nfour");

        let sliced = term.export(&ExportOptions {
            include_scrollback: true,
            start_line: 1,
            end_line: 2,
            ..text_opts()
        });
        assert_eq!(sliced, "two\nthree\n");

        // Negative start clamps to 0, huge end clamps to the last line
        let clamped = term.export(&ExportOptions {
            include_scrollback: true,
            start_line: -5,
            end_line: 99,
            ..text_opts()
        });
        assert_eq!(clamped, "one\ntwo\nthree\nfour\n");
    }

    #[test]
    fn test_selection_empty_when_inverted_or_past_end() {
        let term = Terminal::new(2, 8);
        term.feed(b"x");

        let inverted = term.export(&ExportOptions {
            start_line: 1,
            end_line: 0,
            ..text_opts()
        });
        assert_eq!(inverted, "");

        let past = term.export(&ExportOptions {
            start_line: 10,
            end_line: 20,
            ..text_opts()
        });
        assert_eq!(past, "");
    }

    #[test]
    fn test_markdown_plain_escaping() {
        let term = Terminal::new(1, 10);
        term.feed(b"a*b_c#d");
        let out = term.export(&ExportOptions::new(ExportFormat::Markdown));
        assert_eq!(out, "a\\*b\\_c\\#d\n");
    }

    #[test]
    fn test_markdown_bold_italic_spans() {
        let term = Terminal::new(1, 20);
        term.feed(b"\x1b[1mbold\x1b[0m \x1b[3mit\x1b[0m \x1b[1;3mbi\x1b[0m");
        let out = term.export(&ExportOptions::new(ExportFormat::Markdown));
        assert_eq!(out, "**bold** *it* ***bi***\n");
    }

    #[test]
    fn test_markdown_emphasis_escapes_only_backslash() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b[1m*a\\\x1b[0m");
        let out = term.export(&ExportOptions::new(ExportFormat::Markdown));
        assert_eq!(out, "***a\\\\**\n");
    }

    #[test]
    fn test_markdown_hyperlink() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b]8;;https://g.io\x1b\\Hi\x1b]8;;\x1b\\");
        let out = term.export(&ExportOptions::new(ExportFormat::Markdown));
        assert_eq!(out, "[Hi](https://g.io)\n");
    }

    #[test]
    fn test_markdown_hyperlink_escapes_brackets() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b]8;;https://x\x1b\\[a]\x1b]8;;\x1b\\");
        let out = term.export(&ExportOptions::new(ExportFormat::Markdown));
        assert_eq!(out, "[\\[a\\]](https://x)\n");
    }

    #[test]
    fn test_html_envelope_and_escaping() {
        let term = Terminal::new(1, 12);
        term.feed(b"<a> & \"q\"");
        let out = term.export(&ExportOptions::new(ExportFormat::Html));
        assert!(out.starts_with("<!DOCTYPE html>"));
        assert!(out.contains("<pre>"));
        assert!(out.ends_with("</pre>\n</body>\n</html>"));
        assert!(out.contains("&lt;a&gt; &amp; &quot;q&quot;"));
    }

    #[test]
    fn test_html_styles_and_colors() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b[1;31;44mX\x1b[0m");
        let out = term.export(&ExportOptions::new(ExportFormat::Html));
        assert!(out.contains("font-weight: bold"));
        assert!(out.contains("color: #aa0000"));
        assert!(out.contains("background-color: #0000aa"));
    }

    #[test]
    fn test_html_reverse_swaps_colors() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b[7;31;44mX\x1b[0m");
        let out = term.export(&ExportOptions::new(ExportFormat::Html));
        assert!(out.contains("color: #0000aa"));
        assert!(out.contains("background-color: #aa0000"));
    }

    #[test]
    fn test_html_default_colors_emit_no_property() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b[1mX\x1b[0m");
        let out = term.export(&ExportOptions::new(ExportFormat::Html));
        assert!(out.contains("<span style=\"font-weight: bold\">X</span>"));
    }

    #[test]
    fn test_html_hyperlink_with_id_and_style() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b]8;id=n7;https://x?a=1&b=2\x07\x1b[3mQ\x1b[0m\x1b]8;;\x07");
        let out = term.export(&ExportOptions::new(ExportFormat::Html));
        assert!(out.contains("<a href=\"https://x?a=1&amp;b=2\""));
        assert!(out.contains("data-link-id=\"n7\""));
        assert!(out.contains("style=\"font-style: italic\""));
        assert!(out.contains(">Q</a>"));
    }

    #[test]
    fn test_html_decoration_variants() {
        let term = Terminal::new(1, 10);
        term.feed(b"\x1b[4mU\x1b[0m\x1b[9mS\x1b[0m");
        let out = term.export(&ExportOptions::new(ExportFormat::Html));
        assert!(out.contains("text-decoration: underline\""));
        assert!(out.contains("text-decoration: line-through\""));
    }

    #[test]
    fn test_all_formats_render_same_cells() {
        let term = Terminal::new(1, 10);
        term.feed(b"same text");

        let text = term.export(&ExportOptions::new(ExportFormat::Text));
        let md = term.export(&ExportOptions::new(ExportFormat::Markdown));
        let html = term.export(&ExportOptions::new(ExportFormat::Html));

        assert!(text.contains("same text"));
        assert!(md.contains("same text"));
        assert!(html.contains("same text"));
    }
}
