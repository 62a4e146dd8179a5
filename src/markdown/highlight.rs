use std::sync::OnceLock;

use ratatui::{
    style::{Color, Modifier, Style},
    text::Span,
};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style as SyntectStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

const THEME: &str = "base16-ocean.dark";

fn syntax_set() -> &'static SyntaxSet {
    static SET: OnceLock<SyntaxSet> = OnceLock::new();
    SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme() -> &'static Theme {
    static THEME_CELL: OnceLock<Theme> = OnceLock::new();
    THEME_CELL.get_or_init(|| {
        ThemeSet::load_defaults()
            .themes
            .remove(THEME)
            .unwrap_or_default()
    })
}

fn to_style(style: SyntectStyle) -> Style {
    let fg = style.foreground;
    let mut out = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
    if style.font_style.contains(FontStyle::BOLD) {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    out
}

/// Highlight `code` as `lang` (a fence info token such as `rust` or `py`).
///
/// Returns one span list per source line, or `None` when the language is
/// unknown so the caller can fall back to plain code styling.
pub fn highlight_code(code: &str, lang: &str) -> Option<Vec<Vec<Span<'static>>>> {
    if lang.is_empty() {
        return None;
    }
    let set = syntax_set();
    let syntax = set.find_syntax_by_token(lang)?;
    let mut highlighter = HighlightLines::new(syntax, theme());

    let mut lines = Vec::new();
    for line in LinesWithEndings::from(code) {
        let ranges = highlighter.highlight_line(line, set).ok()?;
        let spans = ranges
            .into_iter()
            .filter_map(|(style, piece)| {
                let piece = piece.trim_end_matches(['\n', '\r']).replace('\t', "    ");
                (!piece.is_empty()).then(|| Span::styled(piece, to_style(style)))
            })
            .collect();
        lines.push(spans);
    }
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_gets_colored_spans() {
        let code = "fn main() {\n    let x = 1;\n}\n";
        let lines = highlight_code(code, "rust").expect("rust is bundled");
        assert_eq!(lines.len(), 3);

        let first: String = lines[0].iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(first, "fn main() {");

        let colors: Vec<_> = lines.iter().flatten().filter_map(|s| s.style.fg).collect();
        assert!(colors.iter().all(|c| matches!(c, Color::Rgb(..))));
        // keywords and identifiers are not all the same color
        assert!(colors.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn short_tokens_resolve_to_a_syntax() {
        assert!(highlight_code("x = 1\n", "py").is_some());
        assert!(highlight_code("let x = 1;\n", "rs").is_some());
    }

    #[test]
    fn unknown_or_missing_language_is_none() {
        assert!(highlight_code("whatever", "no-such-language").is_none());
        assert!(highlight_code("whatever", "").is_none());
    }

    #[test]
    fn partial_last_line_is_kept() {
        let lines = highlight_code("let a = 1;\nlet b", "rust").expect("rust is bundled");
        let last: String = lines[1].iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(last, "let b");
    }
}
