use pulldown_cmark::{Event, Parser};
use ratatui::text::Line;

use super::parse::{options, render_blocks, render_markdown};

/// Renderer for a reply that only ever grows.
///
/// Top-level blocks that are followed by the start of another block can no
/// longer change, so their lines are kept and only the tail is re-rendered
/// on each frame. Highlighting a long code block is then paid once.
#[derive(Debug, Default)]
pub struct StreamingMarkdown {
    committed: String,
    lines: Vec<Line<'static>>,
}

impl StreamingMarkdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.committed.clear();
        self.lines.clear();
    }

    pub fn render(&mut self, text: &str) -> Vec<Line<'static>> {
        if !text.starts_with(self.committed.as_str()) {
            self.reset();
        }

        let tail = &text[self.committed.len()..];
        let split = last_block_start(tail);
        if split > 0 {
            let done = &tail[..split];
            self.lines.extend(render_blocks(done));
            self.committed.push_str(done);
        }

        let mut lines = self.lines.clone();
        lines.extend(render_markdown(&text[self.committed.len()..]));
        while lines.last().is_some_and(|line| line.spans.is_empty()) {
            lines.pop();
        }
        lines
    }
}

/// Byte offset where the last top-level block of `text` begins, looking
/// only at complete lines. A line still being typed can change how it
/// parses (indentation, a list marker), so it never decides a split.
fn last_block_start(text: &str) -> usize {
    let complete = match text.rfind('\n') {
        Some(end) => &text[..=end],
        None => return 0,
    };

    let mut depth = 0usize;
    let mut last = 0;
    for (event, range) in Parser::new_ext(complete, options()).into_offset_iter() {
        match event {
            Event::Start(_) => {
                if depth == 0 {
                    last = range.start;
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            _ if depth == 0 => last = range.start,
            _ => {}
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    const DOC: &str = "# Title\n\nSome *intro* text\nover two lines.\n\n\
| a | b |\n|---|--:|\n| 1 | 22 |\n\n\
```rust\nfn main() {\n    println!(\"漢字\");\n}\n```\n\n\
- one\n  - nested\n- two\n\n> quoted\n\n---\n\nDone.";

    #[test]
    fn matches_full_render_at_every_prefix() {
        let mut stream = StreamingMarkdown::new();
        for (i, _) in DOC.char_indices().skip(1) {
            let prefix = &DOC[..i];
            assert_eq!(
                texts(&stream.render(prefix)),
                texts(&render_markdown(prefix)),
                "prefix: {:?}",
                prefix
            );
        }
        assert_eq!(texts(&stream.render(DOC)), texts(&render_markdown(DOC)));
    }

    #[test]
    fn finished_blocks_are_committed() {
        let mut stream = StreamingMarkdown::new();
        stream.render("# Title\n\nfirst paragraph\n\nsecond\n");
        assert_eq!(stream.committed, "# Title\n\nfirst paragraph\n\n");
        assert_eq!(texts(&stream.lines), vec!["Title", "", "first paragraph", ""]);
    }

    #[test]
    fn open_code_block_is_not_committed() {
        let mut stream = StreamingMarkdown::new();
        stream.render("```\ncode\n\nmore code\n");
        assert!(stream.committed.is_empty());
    }

    #[test]
    fn unrelated_text_resets_the_cache() {
        let mut stream = StreamingMarkdown::new();
        stream.render("first reply\n\nmore\n");
        assert!(!stream.committed.is_empty());
        let lines = stream.render("second reply");
        assert_eq!(texts(&lines), vec!["second reply"]);
    }
}
