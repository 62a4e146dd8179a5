//! Markdown to styled terminal lines.
//!
//! Uses pulldown-cmark for parsing (tables, strikethrough and task lists
//! enabled) and syntect for fenced code blocks that name a language.
//!
//! - `parse`: event stream to `Line`s for a complete or partial document
//! - `stream`: caches finished top-level blocks while a reply is arriving
//! - `highlight`: syntect scopes to ratatui styles

mod highlight;
mod parse;
mod stream;

pub use highlight::highlight_code;
pub use parse::render_markdown;
pub use stream::StreamingMarkdown;
