//! Snippet extraction with highlight ranges.
//!
//! A match snippet is a window of analyzed tokens centred on the first
//! body token that matched the query. The excerpt keeps the original
//! wording (stop words and punctuation included), folds line breaks into
//! spaces, and marks cut edges with an ellipsis. Highlights are byte
//! ranges into the snippet text, so callers choose their own markup.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use mailfind_core::Analyzer;
use mailfind_core::text::preview;
use serde::Serialize;

/// Marker placed where the excerpt cuts the body.
pub const ELLIPSIS: &str = "…";

/// Highlight markers used by [`Snippet::render_default`].
pub const DEFAULT_OPEN: &str = "<b>";
pub const DEFAULT_CLOSE: &str = "</b>";

/// Whether a snippet shows matched terms or just the start of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetKind {
    Match,
    Preview,
}

/// A short excerpt of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub text: String,
    /// Sorted, non-overlapping byte ranges into `text`.
    pub highlights: Vec<Range<usize>>,
    pub kind: SnippetKind,
}

impl Snippet {
    /// A preview of the body start, no highlights.
    pub fn preview(body: &str, max_chars: usize) -> Self {
        Self {
            text: preview(body, max_chars),
            highlights: Vec::new(),
            kind: SnippetKind::Preview,
        }
    }

    /// Extract a snippet around the first body token in `terms`.
    ///
    /// Falls back to a preview when no body token matches.
    pub fn extract(
        analyzer: &Analyzer,
        body: &str,
        terms: &HashSet<String>,
        window: usize,
        preview_chars: usize,
    ) -> Self {
        let tokens = analyzer.analyze(body);
        let Some(first_hit) = tokens.iter().position(|t| terms.contains(&t.term)) else {
            return Self::preview(body, preview_chars);
        };

        let window = window.max(1);
        let end = (first_hit.saturating_sub(window / 2) + window).min(tokens.len());
        let start = end.saturating_sub(window);

        let from = tokens[start].offset_from;
        let to = tokens[end - 1].offset_to;

        let mut text = String::with_capacity(to - from + 2 * (ELLIPSIS.len() + 1));
        if body[..from].chars().any(char::is_alphanumeric) {
            text.push_str(ELLIPSIS);
            text.push(' ');
        }
        let base = text.len();
        // single-byte whitespace only, so token offsets stay valid
        text.extend(body[from..to].chars().map(|c| {
            if c.is_whitespace() && c.len_utf8() == 1 {
                ' '
            } else {
                c
            }
        }));
        if body[to..].chars().any(char::is_alphanumeric) {
            text.push(' ');
            text.push_str(ELLIPSIS);
        }

        let highlights = tokens[start..end]
            .iter()
            .filter(|t| terms.contains(&t.term))
            .map(|t| (t.offset_from - from + base)..(t.offset_to - from + base))
            .collect();

        Self {
            text,
            highlights,
            kind: SnippetKind::Match,
        }
    }

    /// Render with the given highlight markers around each match.
    pub fn render(&self, open: &str, close: &str) -> String {
        let mut out = String::with_capacity(
            self.text.len() + self.highlights.len() * (open.len() + close.len()),
        );
        let mut cursor = 0;
        for range in &self.highlights {
            out.push_str(&self.text[cursor..range.start]);
            out.push_str(open);
            out.push_str(&self.text[range.clone()]);
            out.push_str(close);
            cursor = range.end;
        }
        out.push_str(&self.text[cursor..]);
        out
    }

    /// Render with `<b>`/`</b>` markers.
    pub fn render_default(&self) -> String {
        self.render(DEFAULT_OPEN, DEFAULT_CLOSE)
    }

    pub fn is_match(&self) -> bool {
        self.kind == SnippetKind::Match
    }
}

impl fmt::Display for Snippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_default())
    }
}

// ============================================================================
// Tests
// ============================================================================
