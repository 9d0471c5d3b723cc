//! Text analysis shared by indexing, querying and hash embeddings.
//!
//! All term extraction goes through one [`Analyzer`] so that a query is
//! tokenized exactly the way message text was at ingestion time:
//! simple word splitting, lowercasing, English stop-word removal, and
//! English stemming (e.g., "meetings" → "meet").

use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter,
    TextAnalyzer, TokenStream,
};

/// Tokens longer than this many bytes are dropped (base64 blobs, URLs).
pub const MAX_TOKEN_BYTES: usize = 40;

/// One analyzed token with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    /// Normalized (lowercased, stemmed) term.
    pub term: String,
    /// Byte offset of the token start in the source text.
    pub offset_from: usize,
    /// Byte offset one past the token end in the source text.
    pub offset_to: usize,
    /// Word position in the source text, counting removed stop words.
    pub position: usize,
}

/// The analyzer pipeline used for every piece of indexed or queried text.
#[derive(Clone)]
pub struct Analyzer {
    inner: TextAnalyzer,
}

impl Analyzer {
    /// Build the English analyzer.
    pub fn english() -> Self {
        // tantivy ships the Lucene English list; `new` is only `None` for
        // languages without one.
        let stop_words = StopWordFilter::new(Language::English)
            .unwrap_or_else(|| StopWordFilter::remove(Vec::new()));
        let inner = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
            .filter(LowerCaser)
            .filter(stop_words)
            .filter(Stemmer::new(Language::English))
            .build();
        Self { inner }
    }

    /// Analyze text, keeping offsets and positions.
    pub fn analyze(&self, text: &str) -> Vec<AnalyzedToken> {
        let mut analyzer = self.inner.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while let Some(token) = stream.next() {
            tokens.push(AnalyzedToken {
                term: token.text.clone(),
                offset_from: token.offset_from,
                offset_to: token.offset_to,
                position: token.position,
            });
        }
        tokens
    }

    /// Analyze text and return only the normalized terms, in order.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.analyze(text).into_iter().map(|t| t.term).collect()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::english()
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").field("language", &"english").finish()
    }
}

/// Compact preview of a body: whitespace collapsed, cut at `max_chars`
/// characters with a trailing ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_lowercases_and_stems() {
        let analyzer = Analyzer::english();
        let terms = analyzer.terms("Meetings PLANNING");
        assert_eq!(terms, vec!["meet", "plan"]);
    }

    #[test]
    fn test_analyze_removes_stop_words() {
        let analyzer = Analyzer::english();
        let terms = analyzer.terms("the invoice is in the attachment");
        assert!(!terms.iter().any(|t| t == "the" || t == "is" || t == "in"));
        assert!(terms.contains(&"invoic".to_string()));
    }

    #[test]
    fn test_stop_word_list_is_the_english_one() {
        let analyzer = Analyzer::english();
        assert!(analyzer.terms("such as these, then there").is_empty());
        assert_eq!(analyzer.terms("their budget"), vec!["budget"]);
    }

    #[test]
    fn test_analyze_offsets_point_into_source() {
        let analyzer = Analyzer::english();
        let text = "Please find the Invoice";
        let tokens = analyzer.analyze(text);
        let last = tokens.last().unwrap();
        assert_eq!(&text[last.offset_from..last.offset_to], "Invoice");
    }

    #[test]
    fn test_positions_count_stop_words() {
        let analyzer = Analyzer::english();
        let tokens = analyzer.analyze("find the invoice");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].position - tokens[0].position, 2);
    }

    #[test]
    fn test_query_and_document_agree() {
        let analyzer = Analyzer::english();
        assert_eq!(analyzer.terms("invoices"), analyzer.terms("Invoice"));
    }

    #[test]
    fn test_long_tokens_dropped() {
        let analyzer = Analyzer::english();
        let blob = "a".repeat(MAX_TOKEN_BYTES + 5);
        assert!(analyzer.terms(&blob).is_empty());
    }

    #[test]
    fn test_preview_short_text_unchanged() {
        assert_eq!(preview("hello   there\nfriend", 50), "hello there friend");
    }

    #[test]
    fn test_preview_truncates_with_ellipsis() {
        let p = preview("one two three four five", 10);
        assert!(p.ends_with('…'));
        assert!(p.chars().count() <= 10);
    }

    #[test]
    fn test_preview_multibyte_safe() {
        let p = preview("ééééééééééé", 4);
        assert_eq!(p.chars().count(), 4);
    }
}
