//! SQL statement classification for read-only enforcement.
//!
//! This module decides whether a statement may be sent to ClickHouse at all.
//! It is a keyword-based filter built on the
//! [sqlparser](https://docs.rs/sqlparser/) tokenizer, not a full parser:
//! ClickHouse syntax is broad enough that an AST parse rejects many valid
//! queries, while tokens are enough to find the leading keyword, statement
//! separators and forbidden keywords outside string literals and comments.
//!
//! Allowed leading keywords: SELECT, SHOW, DESCRIBE, DESC, EXPLAIN and
//! WITH (when it ends in a SELECT). Everything else is rejected.

use sqlparser::dialect::ClickHouseDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer, Word};

/// Rejection reasons, returned verbatim to the caller.
pub mod reasons {
    pub const EMPTY: &str = "empty statement";
    pub const NOT_READ_ONLY: &str = "not a read-only statement";
    pub const MULTIPLE_STATEMENTS: &str = "multiple statements";
}

/// Keywords that start a write or administrative statement.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "ALTER", "CREATE", "DROP", "TRUNCATE", "GRANT", "RENAME",
    "ATTACH", "DETACH", "OPTIMIZE", "SYSTEM", "KILL", "REVOKE", "SET", "USE", "EXCHANGE",
];

/// Outcome of classifying a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The statement, trimmed of surrounding whitespace and a trailing `;`.
    Allowed(String),
    Rejected(&'static str),
}

impl Classification {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Classify a raw statement as read-only or rejected.
///
/// Pure and idempotent: classifying the normalized output of an allowed
/// statement yields the same statement again.
///
/// # Examples
///
/// ```
/// use clickhouse_gateway::tools::sql_validator::{classify, Classification};
///
/// assert_eq!(classify(" SELECT 1; "), Classification::Allowed("SELECT 1".to_string()));
/// assert!(!classify("DROP TABLE x").is_allowed());
/// ```
pub fn classify(raw: &str) -> Classification {
    let dialect = ClickHouseDialect {};
    let tokens = match Tokenizer::new(&dialect, raw).tokenize_with_location() {
        Ok(tokens) => tokens,
        // Unterminated literals or comments: refuse rather than guess.
        Err(_) => return Classification::Rejected(reasons::NOT_READ_ONLY),
    };

    let significant: Vec<&TokenWithSpan> = tokens
        .iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .collect();

    if significant.is_empty() {
        return Classification::Rejected(reasons::EMPTY);
    }

    // Everything up to the first separator is the statement body.
    let separator = significant
        .iter()
        .position(|t| matches!(t.token, Token::SemiColon));
    let body = match separator {
        Some(0) => return Classification::Rejected(reasons::EMPTY),
        Some(idx) if idx + 1 < significant.len() => {
            return Classification::Rejected(reasons::MULTIPLE_STATEMENTS);
        }
        Some(idx) => &significant[..idx],
        None => &significant[..],
    };

    if !is_read_only(body) {
        return Classification::Rejected(reasons::NOT_READ_ONLY);
    }

    let statement = match separator.and_then(|idx| byte_offset(raw, significant[idx].span.start)) {
        Some(end) => raw[..end].trim(),
        None => raw.trim(),
    };
    Classification::Allowed(statement.to_string())
}

/// Decide on a statement starting at `body[0]`.
///
/// SELECT, SHOW, DESCRIBE and DESC pass outright. EXPLAIN is decided by the
/// statement it explains, found after its kind and settings. WITH must reach
/// a top-level SELECT before any write keyword in statement position.
fn is_read_only(body: &[&TokenWithSpan]) -> bool {
    let Some(leading) = body.first().and_then(|t| is_bare_word(&t.token)) else {
        return false;
    };

    match leading.keyword {
        Keyword::SELECT | Keyword::SHOW | Keyword::DESCRIBE | Keyword::DESC => true,
        Keyword::EXPLAIN => match next_statement_word(body, 1, |_| true) {
            Some(idx) => is_read_only(&body[idx..]),
            // Explaining a parenthesized query
            None => true,
        },
        Keyword::WITH => {
            let idx = next_statement_word(body, 1, |word| word.keyword != Keyword::WITH);
            idx.is_some_and(|idx| {
                is_bare_word(&body[idx].token).is_some_and(|w| w.keyword == Keyword::SELECT)
            })
        }
        _ => false,
    }
}

fn is_bare_word(token: &Token) -> Option<&Word> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word),
        _ => None,
    }
}

fn starts_statement(word: &Word) -> bool {
    matches!(
        word.keyword,
        Keyword::SELECT
            | Keyword::SHOW
            | Keyword::DESCRIBE
            | Keyword::DESC
            | Keyword::EXPLAIN
            | Keyword::WITH
    ) || FORBIDDEN_KEYWORDS
        .iter()
        .any(|kw| word.value.eq_ignore_ascii_case(kw))
}

/// Index of the first word from `from` on that can start a statement: a bare
/// keyword outside parentheses that is not part of a dotted name and not an
/// alias after AS.
fn next_statement_word(
    body: &[&TokenWithSpan],
    from: usize,
    accept: impl Fn(&Word) -> bool,
) -> Option<usize> {
    let mut depth = 0usize;
    for idx in from..body.len() {
        match &body[idx].token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(word) if depth == 0 && word.quote_style.is_none() => {
                let prev = &body[idx - 1].token;
                let next = body.get(idx + 1).map(|t| &t.token);
                let dotted =
                    matches!(prev, Token::Period) || matches!(next, Some(Token::Period));
                let alias = matches!(prev, Token::Word(w) if w.keyword == Keyword::AS);
                if !dotted && !alias && starts_statement(word) && accept(word) {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Map a tokenizer location (1-based line and column, counted in chars) to a byte offset.
pub(crate) fn byte_offset(raw: &str, location: Location) -> Option<usize> {
    let (mut line, mut column) = (1u64, 1u64);
    for (offset, ch) in raw.char_indices() {
        if line == location.line && column == location.column {
            return Some(offset);
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line == location.line && column == location.column).then_some(raw.len())
}
