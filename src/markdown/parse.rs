//! pulldown-cmark events to `Line`s.
//!
//! The renderer runs over text that can stop anywhere. CommonMark already
//! gives the right answers for most partial input: an unclosed fence runs to
//! the end of the document, a table whose delimiter row has not arrived is a
//! paragraph, and unmatched emphasis markers stay literal. The one thing the
//! event stream hides is whether a fence was closed, so that is read back
//! from the source range.

use std::mem;
use std::ops::Range;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

use super::highlight::highlight_code;

pub(super) fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

fn code_style() -> Style {
    Style::default().fg(Color::Green)
}

fn block_code_style() -> Style {
    Style::default().fg(Color::Gray)
}

fn border_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn heading_style(level: HeadingLevel) -> Style {
    match level {
        HeadingLevel::H1 => Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        HeadingLevel::H2 => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        _ => Style::default().add_modifier(Modifier::BOLD),
    }
}

/// Render a complete or partial markdown document.
pub fn render_markdown(text: &str) -> Vec<Line<'static>> {
    let mut lines = render_blocks(text);
    while lines.last().is_some_and(is_blank) {
        lines.pop();
    }
    lines
}

/// Like [`render_markdown`] but keeps the blank line after the last block,
/// so the output can be followed by the rendering of the next blocks.
pub(super) fn render_blocks(text: &str) -> Vec<Line<'static>> {
    let mut renderer = Renderer::new(text);
    for (event, range) in Parser::new_ext(text, options()).into_offset_iter() {
        renderer.event(event, range);
    }
    renderer.finish()
}

fn is_blank(line: &Line<'_>) -> bool {
    line.spans.is_empty()
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(Span::width).sum()
}

/// `rest` starts at an opening fence; true when no closing fence line
/// follows it. Container markers (`>`) are ignored when looking for it.
fn is_open_fence(rest: &str) -> bool {
    let opening = rest.trim_start_matches(|c: char| c == '>' || c.is_whitespace());
    let fence_char = match opening.chars().next() {
        Some(c @ ('`' | '~')) => c,
        _ => return false,
    };
    let fence_len = opening.chars().take_while(|&c| c == fence_char).count();

    !opening.lines().skip(1).any(|line| {
        let line = line
            .trim_start_matches(|c: char| c == '>' || c.is_whitespace())
            .trim_end();
        line.chars().count() >= fence_len && line.chars().all(|c| c == fence_char)
    })
}

struct CodeBlock {
    /// Byte offset of the opening fence
    start: usize,
    lang: String,
    text: String,
}

struct Table {
    aligns: Vec<Alignment>,
    in_head: bool,
    header: Vec<Vec<Span<'static>>>,
    rows: Vec<Vec<Vec<Span<'static>>>>,
    row: Vec<Vec<Span<'static>>>,
}

struct Renderer<'a> {
    source: &'a str,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    /// Next number for ordered lists, `None` for bullets
    lists: Vec<Option<u64>>,
    marker: Option<String>,
    quote_depth: usize,
    code: Option<CodeBlock>,
    table: Option<Table>,
    cell: Option<Vec<Span<'static>>>,
    /// Destination and index of the first label span
    links: Vec<(String, usize)>,
}

impl<'a> Renderer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            lines: Vec::new(),
            current: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            marker: None,
            quote_depth: 0,
            code: None,
            table: None,
            cell: None,
            links: Vec::new(),
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, f: impl FnOnce(Style) -> Style) {
        let style = f(self.style());
        self.styles.push(style);
    }

    /// Spans go into the open table cell, if any, else the current line.
    fn target(&mut self) -> &mut Vec<Span<'static>> {
        match &mut self.cell {
            Some(cell) => cell,
            None => &mut self.current,
        }
    }

    fn push_span(&mut self, span: Span<'static>) {
        self.target().push(span);
    }

    fn prefix(&mut self) -> Vec<Span<'static>> {
        let mut spans = Vec::new();
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                "▎ ".repeat(self.quote_depth),
                Style::default().fg(Color::Magenta),
            ));
        }
        let depth = self.lists.len();
        if depth > 0 {
            match self.marker.take() {
                Some(marker) => {
                    if depth > 1 {
                        spans.push(Span::raw("  ".repeat(depth - 1)));
                    }
                    spans.push(Span::styled(marker, Style::default().fg(Color::Cyan)));
                }
                None => spans.push(Span::raw("  ".repeat(depth))),
            }
        }
        spans
    }

    fn push_line(&mut self, spans: Vec<Span<'static>>) {
        let mut line = self.prefix();
        line.extend(spans);
        self.lines.push(Line::from(line));
    }

    fn flush_line(&mut self) {
        if self.current.is_empty() && self.marker.is_none() {
            return;
        }
        let spans = mem::take(&mut self.current);
        self.push_line(spans);
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|line| !is_blank(line)) {
            self.lines.push(Line::default());
        }
    }

    /// Top-level blocks are separated by one blank line; list items are not.
    fn end_block(&mut self) {
        if self.lists.is_empty() {
            self.blank();
        }
    }

    fn event(&mut self, event: Event<'a>, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match self.code.as_mut() {
                Some(code) => code.text.push_str(&text),
                None => {
                    let style = self.style();
                    self.push_span(Span::styled(text.into_string(), style));
                }
            },
            Event::Code(text) => {
                let style = self.style().patch(code_style());
                self.push_span(Span::styled(text.into_string(), style));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let style = self.style().fg(Color::DarkGray);
                for (i, part) in html.split('\n').enumerate() {
                    if i > 0 {
                        self.flush_line();
                    }
                    if !part.is_empty() {
                        self.push_span(Span::styled(part.to_string(), style));
                    }
                }
            }
            Event::SoftBreak => {
                let style = self.style();
                self.push_span(Span::styled(" ", style));
            }
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                self.push_line(vec![Span::styled("─".repeat(40), border_style())]);
                self.end_block();
            }
            Event::TaskListMarker(checked) => {
                self.marker = Some(if checked { "☑ " } else { "☐ " }.to_string());
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'a>, range: Range<usize>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_line();
                self.styles.push(heading_style(level));
            }
            Tag::BlockQuote { .. } => {
                self.flush_line();
                self.quote_depth += 1;
                self.push_style(|s| s.fg(Color::Gray).add_modifier(Modifier::ITALIC));
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .next()
                        .unwrap_or("")
                        .trim_start_matches("language-")
                        .to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some(CodeBlock {
                    start: range.start,
                    lang,
                    text: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.marker = Some(marker);
            }
            Tag::Emphasis => self.push_style(|s| s.add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(|s| s.add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(|s| s.add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.push_style(|s| s.fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
                let start = self.target().len();
                self.links.push((dest_url.into_string(), start));
            }
            Tag::Table(aligns) => {
                self.flush_line();
                self.table = Some(Table {
                    aligns,
                    in_head: false,
                    header: Vec::new(),
                    rows: Vec::new(),
                    row: Vec::new(),
                });
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = true;
                    table.row.clear();
                }
            }
            Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                self.cell = Some(Vec::new());
                if self.table.as_ref().is_some_and(|t| t.in_head) {
                    self.push_style(|s| s.add_modifier(Modifier::BOLD));
                }
            }
            Tag::HtmlBlock => self.flush_line(),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_line();
                self.end_block();
            }
            TagEnd::Heading { .. } => {
                self.flush_line();
                self.styles.pop();
                self.end_block();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.styles.pop();
                self.end_block();
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    // An unclosed fence runs to the end of the document
                    let closed = !self
                        .source
                        .get(code.start..)
                        .is_some_and(is_open_fence);
                    self.emit_code(code, closed);
                    self.end_block();
                }
            }
            TagEnd::List { .. } => {
                self.flush_line();
                self.lists.pop();
                self.end_block();
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link | TagEnd::Image => {
                self.styles.pop();
                if let Some((url, start)) = self.links.pop() {
                    let label: String = self
                        .target()
                        .get(start..)
                        .unwrap_or_default()
                        .iter()
                        .map(|s| s.content.as_ref())
                        .collect();
                    if !url.is_empty() && label != url {
                        self.push_span(Span::styled(format!(" ({})", url), border_style()));
                    }
                }
            }
            TagEnd::TableCell => {
                let cell = self.cell.take().unwrap_or_default();
                if let Some(table) = self.table.as_mut() {
                    if table.in_head {
                        self.styles.pop();
                    }
                    table.row.push(cell);
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header = mem::take(&mut table.row);
                    table.in_head = false;
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.emit_table(table);
                    self.end_block();
                }
            }
            TagEnd::HtmlBlock => {
                self.flush_line();
                self.end_block();
            }
            _ => {}
        }
    }

    fn emit_code(&mut self, code: CodeBlock, closed: bool) {
        let mut header = vec![Span::styled("┌─", border_style())];
        if !code.lang.is_empty() {
            header.push(Span::styled(
                format!(" {} ", code.lang),
                Style::default().fg(Color::Magenta),
            ));
        }
        self.push_line(header);

        let body = highlight_code(&code.text, &code.lang).unwrap_or_else(|| {
            code.text
                .lines()
                .map(|line| vec![Span::styled(line.replace('\t', "    "), block_code_style())])
                .collect()
        });
        for spans in body {
            let mut line = vec![Span::styled("│ ", border_style())];
            line.extend(spans);
            self.push_line(line);
        }

        // Still streaming: no closing fence yet
        if closed {
            self.push_line(vec![Span::styled("└─", border_style())]);
        }
    }

    fn emit_table(&mut self, table: Table) {
        let Table {
            aligns,
            header,
            rows,
            ..
        } = table;
        let columns = header.len();

        let mut widths: Vec<usize> = header.iter().map(|c| spans_width(c).max(1)).collect();
        for row in &rows {
            for (col, cell) in row.iter().take(columns).enumerate() {
                widths[col] = widths[col].max(spans_width(cell));
            }
        }

        let rule = |left: &str, mid: &str, right: &str| -> Vec<Span<'static>> {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            vec![Span::styled(
                format!("{}{}{}", left, segments.join(mid), right),
                border_style(),
            )]
        };

        let row_spans = |mut cells: Vec<Vec<Span<'static>>>| -> Vec<Span<'static>> {
            cells.resize_with(columns, Vec::new);
            let mut spans = vec![Span::styled("│", border_style())];
            for (col, cell) in cells.into_iter().enumerate() {
                let pad = widths[col].saturating_sub(spans_width(&cell));
                let (before, after) = match aligns.get(col).copied().unwrap_or(Alignment::None) {
                    Alignment::None | Alignment::Left => (0, pad),
                    Alignment::Right => (pad, 0),
                    Alignment::Center => (pad / 2, pad - pad / 2),
                };
                spans.push(Span::raw(" ".repeat(before + 1)));
                spans.extend(cell);
                spans.push(Span::raw(" ".repeat(after + 1)));
                spans.push(Span::styled("│", border_style()));
            }
            spans
        };

        let mut out = vec![rule("┌", "┬", "┐"), row_spans(header)];
        out.push(rule("├", "┼", "┤"));
        for row in rows {
            out.push(row_spans(row));
        }
        out.push(rule("└", "┴", "┘"));

        for spans in out {
            self.push_line(spans);
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush_line();
        self.lines
    }
}
