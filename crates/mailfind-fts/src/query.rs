//! Query parsing for lexical search.
//!
//! The query language is deliberately small:
//!
//! - bare terms: `invoice march`
//! - quoted phrases: `"quarterly report"` (terms must be adjacent)
//! - required terms: `+invoice` or `invoice AND march`
//! - excluded terms: `-spam` or `NOT spam`
//! - alternatives: `invoice OR receipt`
//!
//! Operators are recognized only in upper case. Every term goes through
//! the shared [`Analyzer`], so stop words vanish and "Meetings" matches
//! "meeting".
//!
//! # Query Modes
//!
//! Terms without a prefix or an adjacent operator follow [`QueryMode`]:
//! **Smart** requires all of them when there are one or two, and any of
//! them when there are more.
//!
//! # Example
//!
//! ```
//! use mailfind_core::Analyzer;
//! use mailfind_fts::{ParsedQuery, QueryMode};
//!
//! let analyzer = Analyzer::english();
//! let query = ParsedQuery::parse("\"quarterly report\" -draft", &analyzer, QueryMode::Smart)?;
//! assert_eq!(query.clauses().len(), 2);
//! # Ok::<(), mailfind_core::Error>(())
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use mailfind_core::{AnalyzedToken, Analyzer, Error, Result};

use crate::types::QueryMode;

/// How a clause constrains matching documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    /// Document must match the clause.
    Must,
    /// Document may match; contributes to the score.
    Should,
    /// Document must not match the clause.
    MustNot,
}

/// One term or phrase of a parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub occur: Occur,
    /// Analyzed terms, in query order.
    pub terms: Vec<String>,
    /// Position of each term relative to the first, counting stop words.
    pub offsets: Vec<usize>,
    /// Whether the terms must appear adjacently.
    pub phrase: bool,
    /// The clause as written in the query.
    pub raw: String,
}

impl Clause {
    /// Whether matching needs a positional check beyond term presence.
    pub fn needs_positions(&self) -> bool {
        self.phrase && self.terms.len() > 1
    }

    /// Check phrase adjacency against the analyzed tokens of one field.
    pub fn phrase_matches(&self, tokens: &[AnalyzedToken]) -> bool {
        if self.terms.is_empty() {
            return false;
        }
        let mut positions: HashMap<&str, HashSet<usize>> = HashMap::new();
        for token in tokens {
            positions
                .entry(token.term.as_str())
                .or_default()
                .insert(token.position);
        }
        let Some(starts) = positions.get(self.terms[0].as_str()) else {
            return false;
        };
        starts.iter().any(|&start| {
            self.terms
                .iter()
                .zip(&self.offsets)
                .skip(1)
                .all(|(term, offset)| {
                    positions
                        .get(term.as_str())
                        .is_some_and(|p| p.contains(&(start + offset)))
                })
        })
    }
}

/// A validated, analyzed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    clauses: Vec<Clause>,
}

impl ParsedQuery {
    /// Parse and analyze a query string.
    ///
    /// A query whose terms are all stop words parses to an empty query
    /// (no results); malformed syntax is a `QuerySyntax` error.
    pub fn parse(input: &str, analyzer: &Analyzer, mode: QueryMode) -> Result<Self> {
        let tokens = tokenize(input)?;

        let mut pending: Vec<(Option<Occur>, Clause)> = Vec::new();
        let mut binary: Option<Token> = None;
        let mut negate_next = false;
        let mut after_term = false;
        let mut last_clause: Option<usize> = None;
        let mut dangling: Option<&'static str> = None;
        let mut has_positive = false;
        let mut first_excluded: Option<String> = None;

        for token in tokens {
            match token {
                Token::And | Token::Or => {
                    let name = token.operator_name();
                    if !after_term {
                        let reason = if dangling.is_some() {
                            "follows another operator"
                        } else {
                            "needs a term before it"
                        };
                        return Err(Error::query_syntax(name, reason));
                    }
                    let occur = if token == Token::And {
                        Occur::Must
                    } else {
                        Occur::Should
                    };
                    if let Some((explicit, _)) = last_clause.and_then(|i| pending.get_mut(i))
                        && explicit.is_none()
                    {
                        *explicit = Some(occur);
                    }
                    binary = Some(token);
                    after_term = false;
                    dangling = Some(name);
                }
                Token::Not => {
                    if negate_next {
                        return Err(Error::query_syntax("NOT", "follows another operator"));
                    }
                    negate_next = true;
                    after_term = false;
                    dangling = Some("NOT");
                }
                Token::Term {
                    text,
                    prefix,
                    quoted,
                } => {
                    let excluded = negate_next || prefix == Some('-');
                    let raw = render_raw(&text, prefix, quoted);
                    if excluded {
                        first_excluded.get_or_insert_with(|| raw.clone());
                    } else {
                        has_positive = true;
                    }

                    let analyzed = analyzer.analyze(&text);
                    last_clause = None;
                    if let Some(first) = analyzed.first() {
                        let explicit = if excluded {
                            Some(Occur::MustNot)
                        } else if prefix == Some('+') {
                            Some(Occur::Must)
                        } else {
                            match binary {
                                Some(Token::And) => Some(Occur::Must),
                                Some(Token::Or) => Some(Occur::Should),
                                _ => None,
                            }
                        };
                        let clause = Clause {
                            occur: Occur::Should,
                            offsets: analyzed
                                .iter()
                                .map(|t| t.position - first.position)
                                .collect(),
                            terms: analyzed.iter().map(|t| t.term.clone()).collect(),
                            phrase: quoted || analyzed.len() > 1,
                            raw,
                        };
                        pending.push((explicit, clause));
                        last_clause = Some(pending.len() - 1);
                    }

                    binary = None;
                    negate_next = false;
                    after_term = true;
                    dangling = None;
                }
            }
        }

        if let Some(op) = dangling {
            return Err(Error::query_syntax(op, "operator at end of query"));
        }
        if !has_positive && let Some(excluded) = first_excluded {
            return Err(Error::query_syntax(
                excluded,
                "query has only excluded terms",
            ));
        }

        let implicit = pending.iter().filter(|(o, _)| o.is_none()).count();
        let default_occur = match mode {
            QueryMode::And => Occur::Must,
            QueryMode::Or => Occur::Should,
            QueryMode::Smart if implicit <= 2 => Occur::Must,
            QueryMode::Smart => Occur::Should,
        };

        let clauses = pending
            .into_iter()
            .map(|(explicit, mut clause)| {
                clause.occur = explicit.unwrap_or(default_occur);
                clause
            })
            .collect();

        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True when nothing can match (empty or stop-word-only query).
    pub fn is_empty(&self) -> bool {
        !self.clauses.iter().any(|c| c.occur != Occur::MustNot)
    }

    pub fn has_required(&self) -> bool {
        self.clauses.iter().any(|c| c.occur == Occur::Must)
    }

    /// Distinct terms that contribute to scoring.
    pub fn scoring_terms(&self) -> BTreeSet<&str> {
        self.clauses
            .iter()
            .filter(|c| c.occur != Occur::MustNot)
            .flat_map(|c| c.terms.iter().map(String::as_str))
            .collect()
    }

    /// Distinct terms of every clause, excluded ones included.
    pub fn all_terms(&self) -> BTreeSet<&str> {
        self.clauses
            .iter()
            .flat_map(|c| c.terms.iter().map(String::as_str))
            .collect()
    }

    /// Terms to highlight in snippets.
    pub fn highlight_terms(&self) -> HashSet<String> {
        self.scoring_terms()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Term {
        text: String,
        prefix: Option<char>,
        quoted: bool,
    },
    And,
    Or,
    Not,
}

impl Token {
    fn operator_name(&self) -> &'static str {
        match self {
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
            Token::Term { .. } => "",
        }
    }
}

fn render_raw(text: &str, prefix: Option<char>, quoted: bool) -> String {
    let mut raw = prefix.map(String::from).unwrap_or_default();
    if quoted {
        raw.push('"');
        raw.push_str(text);
        raw.push('"');
    } else {
        raw.push_str(text);
    }
    raw
}

/// Split a query into terms, phrases and operators.
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let prefix = if c == '+' || c == '-' {
            chars.next();
            Some(c)
        } else {
            None
        };

        match chars.peek().copied() {
            None => {
                return Err(Error::query_syntax(c.to_string(), "operator has no term"));
            }
            Some((_, next)) if next.is_whitespace() => {
                return Err(Error::query_syntax(c.to_string(), "operator has no term"));
            }
            Some((quote, '"')) => {
                chars.next();
                let mut end = None;
                for (i, ch) in chars.by_ref() {
                    if ch == '"' {
                        end = Some(i);
                        break;
                    }
                }
                let Some(end) = end else {
                    return Err(Error::query_syntax(&input[start..], "unterminated quote"));
                };
                tokens.push(Token::Term {
                    text: input[quote + 1..end].to_string(),
                    prefix,
                    quoted: true,
                });
            }
            Some((word_start, _)) => {
                let mut word_end = input.len();
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_whitespace() || ch == '"' {
                        word_end = i;
                        break;
                    }
                    chars.next();
                }
                let word = &input[word_start..word_end];
                let token = match (prefix, word) {
                    (None, "AND") => Token::And,
                    (None, "OR") => Token::Or,
                    (None, "NOT") => Token::Not,
                    _ => Token::Term {
                        text: word.to_string(),
                        prefix,
                        quoted: false,
                    },
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<ParsedQuery> {
        ParsedQuery::parse(input, &Analyzer::english(), QueryMode::Smart)
    }

    fn parse_mode(input: &str, mode: QueryMode) -> ParsedQuery {
        ParsedQuery::parse(input, &Analyzer::english(), mode).unwrap()
    }

    fn occurs(query: &ParsedQuery) -> Vec<Occur> {
        query.clauses().iter().map(|c| c.occur).collect()
    }

    fn syntax_error(input: &str) -> (String, String) {
        match parse(input).unwrap_err() {
            Error::QuerySyntax { token, reason } => (token, reason),
            other => panic!("expected QuerySyntax, got {other:?}"),
        }
    }

    #[test]
    fn test_single_term_is_analyzed() {
        let query = parse("Invoices").unwrap();
        assert_eq!(query.clauses().len(), 1);
        assert_eq!(query.clauses()[0].terms, vec!["invoic"]);
        assert_eq!(query.clauses()[0].occur, Occur::Must);
    }

    #[test]
    fn test_smart_mode_short_query_requires_all() {
        let query = parse("invoice march").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::Must]);
    }

    #[test]
    fn test_smart_mode_long_query_is_any() {
        let query = parse("invoice march budget").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Should; 3]);
    }

    #[test]
    fn test_and_mode() {
        let query = parse_mode("invoice march budget", QueryMode::And);
        assert_eq!(occurs(&query), vec![Occur::Must; 3]);
    }

    #[test]
    fn test_or_mode() {
        let query = parse_mode("invoice", QueryMode::Or);
        assert_eq!(occurs(&query), vec![Occur::Should]);
    }

    #[test]
    fn test_phrase_offsets_count_stop_words() {
        let query = parse("\"find the invoice\"").unwrap();
        let clause = &query.clauses()[0];
        assert!(clause.phrase);
        assert_eq!(clause.terms, vec!["find", "invoic"]);
        assert_eq!(clause.offsets, vec![0, 2]);
        assert_eq!(clause.raw, "\"find the invoice\"");
    }

    #[test]
    fn test_prefixes() {
        let query = parse("+invoice -draft report").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::MustNot, Occur::Must]);
    }

    #[test]
    fn test_not_operator() {
        let query = parse("invoice NOT draft").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::MustNot]);
    }

    #[test]
    fn test_or_operator_marks_both_sides() {
        let query = parse_mode("invoice OR receipt", QueryMode::And);
        assert_eq!(occurs(&query), vec![Occur::Should, Occur::Should]);
    }

    #[test]
    fn test_and_operator_marks_both_sides() {
        let query = parse_mode("invoice AND receipt", QueryMode::Or);
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::Must]);
    }

    #[test]
    fn test_lowercase_operators_are_terms() {
        // "and"/"or" are stop words, "not" too
        let query = parse("invoice or receipt").unwrap();
        assert_eq!(query.clauses().len(), 2);
    }

    #[test]
    fn test_hyphenated_word_is_phrase() {
        let query = parse("e-mail").unwrap();
        let clause = &query.clauses()[0];
        assert_eq!(clause.terms, vec!["e", "mail"]);
        assert!(clause.needs_positions());
    }

    #[test]
    fn test_empty_and_stop_word_queries() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
        assert!(parse("the").unwrap().is_empty());
        assert!(parse("\"of the\"").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_quote() {
        let (token, reason) = syntax_error("invoice \"quarterly report");
        assert_eq!(token, "\"quarterly report");
        assert!(reason.contains("unterminated"));
    }

    #[test]
    fn test_leading_binary_operator() {
        let (token, _) = syntax_error("AND invoice");
        assert_eq!(token, "AND");
    }

    #[test]
    fn test_trailing_operator() {
        let (token, reason) = syntax_error("invoice OR");
        assert_eq!(token, "OR");
        assert!(reason.contains("end"));
    }

    #[test]
    fn test_doubled_operators() {
        let (token, reason) = syntax_error("invoice AND OR receipt");
        assert_eq!(token, "OR");
        assert!(reason.contains("another operator"));
        let (token, _) = syntax_error("NOT NOT invoice");
        assert_eq!(token, "NOT");
    }

    #[test]
    fn test_and_not_is_allowed() {
        let query = parse("invoice AND NOT draft").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::MustNot]);
    }

    #[test]
    fn test_bare_prefix() {
        assert_eq!(syntax_error("invoice -").0, "-");
        assert_eq!(syntax_error("+ invoice").0, "+");
    }

    #[test]
    fn test_only_excluded_terms() {
        let (token, _) = syntax_error("-draft");
        assert_eq!(token, "-draft");
    }

    #[test]
    fn test_term_sets() {
        let query = parse("invoice -draft \"march invoice\"").unwrap();
        let scoring: Vec<_> = query.scoring_terms().into_iter().collect();
        assert_eq!(scoring, vec!["invoic", "march"]);
        assert!(query.all_terms().contains("draft"));
        assert!(!query.highlight_terms().contains("draft"));
    }

    #[test]
    fn test_phrase_matches_adjacent_only() {
        let analyzer = Analyzer::english();
        let query = parse("\"quarterly report\"").unwrap();
        let clause = &query.clauses()[0];
        assert!(clause.phrase_matches(&analyzer.analyze("the quarterly report is late")));
        assert!(!clause.phrase_matches(&analyzer.analyze("report for the quarterly review")));
        assert!(!clause.phrase_matches(&analyzer.analyze("quarterly numbers report")));
    }
}
