//! Client-side parameter rendering.
//!
//! Placeholders are `{name}` (bound from a JSON object) or `{0}`, `{1}`, ...
//! (bound from a JSON array). Each one is replaced by an escaped ClickHouse
//! literal before the statement is sent, so both transports receive the
//! identical text. Server-side `{name:Type}` placeholders, and braces inside
//! string literals or comments, are left untouched.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{QueryParam, QueryParams};
use crate::tools::sql_validator::byte_offset;
use sqlparser::dialect::ClickHouseDialect;
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer};

/// Render `params` into `sql`.
pub fn render(sql: &str, params: Option<&QueryParams>) -> GatewayResult<String> {
    let dialect = ClickHouseDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| GatewayError::validation(format!("cannot tokenize statement: {}", e)))?;

    let mut rendered = String::with_capacity(sql.len());
    let mut copied_to = 0;

    for window in tokens.windows(3) {
        let Some(name) = placeholder_name(window) else {
            continue;
        };
        let (Some(start), Some(end)) = (
            byte_offset(sql, window[0].span.start),
            byte_offset(sql, window[2].span.end),
        ) else {
            continue;
        };

        let value = params.and_then(|p| p.get(name)).ok_or_else(|| {
            GatewayError::validation(format!("missing value for parameter {{{}}}", name))
        })?;

        rendered.push_str(&sql[copied_to..start]);
        rendered.push_str(&literal(value)?);
        copied_to = end;
    }

    rendered.push_str(&sql[copied_to..]);
    Ok(rendered)
}

/// `{` followed directly by a bare identifier or an integer, then `}`.
fn placeholder_name(window: &[TokenWithSpan]) -> Option<&str> {
    let [open, inner, close] = window else {
        return None;
    };
    if !matches!(open.token, Token::LBrace) || !matches!(close.token, Token::RBrace) {
        return None;
    }
    match &inner.token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.as_str()),
        Token::Number(digits, false) if digits.bytes().all(|b| b.is_ascii_digit()) => {
            Some(digits.as_str())
        }
        _ => None,
    }
}

/// Render a parameter value as a ClickHouse literal.
pub fn literal(value: &QueryParam) -> GatewayResult<String> {
    Ok(match value {
        QueryParam::Null => "NULL".to_string(),
        QueryParam::Bool(v) => v.to_string(),
        QueryParam::Int(v) => v.to_string(),
        QueryParam::Float(v) if v.is_finite() => v.to_string(),
        QueryParam::Float(v) => {
            return Err(GatewayError::validation(format!(
                "parameter value {} cannot be represented in SQL",
                v
            )));
        }
        QueryParam::String(v) => quote(v),
        QueryParam::List(items) => {
            let items = items.iter().map(literal).collect::<GatewayResult<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
    })
}

/// Single-quote a string, escaping backslashes and quotes.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}
