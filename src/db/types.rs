//! Result shapes and normalization.
//!
//! The two transports hand back different shapes: the native driver yields
//! typed column blocks, the HTTP interface yields JSONCompact. Both are
//! converted into one canonical form, a list of column names and rows of
//! [`Cell`]s, before anything is rendered.
//!
//! # Architecture
//!
//! Normalization uses a two-phase approach:
//! 1. `ColumnType` parses the ClickHouse type name reported for each column
//! 2. Transport-specific adapters convert each value, guided by that type
//!
//! The HTTP adapter needs the type because JSONCompact quotes 64-bit and
//! wider integers and decimals, and encodes tuples as plain arrays.

use crate::error::{GatewayError, GatewayResult};
use crate::models::TransportKind;
use crate::db::params::quote;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// =============================================================================
// Raw Results
// =============================================================================

/// A successful execution on one transport.
#[derive(Debug)]
pub struct Execution {
    pub transport: TransportKind,
    pub result: RawResult,
    pub elapsed: Duration,
}

/// Driver result, one variant per response shape.
#[derive(Debug)]
pub enum RawResult {
    Native(NativeResult),
    Http(HttpResult),
    /// HTTP body in a format other than JSONCompact, chosen by a `FORMAT` clause
    HttpText(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeColumn {
    pub name: String,
    pub type_name: String,
}

/// Owned value read from a native block.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    /// Decimal text of an integer, float or decimal
    Number(String),
    Text(String),
    /// String column contents that are not valid UTF-8
    Bytes(Vec<u8>),
    Array(Vec<NativeValue>),
    Map(Vec<(NativeValue, NativeValue)>),
}

#[derive(Debug, Clone, Default)]
pub struct NativeResult {
    pub columns: Vec<NativeColumn>,
    pub rows: Vec<Vec<NativeValue>>,
    /// Row count reported by the driver
    pub row_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A JSONCompact response body. Values stay as raw JSON text.
#[derive(Debug, Deserialize)]
pub struct HttpResult {
    #[serde(default)]
    pub meta: Vec<HttpColumn>,
    #[serde(default)]
    pub data: Vec<Vec<Box<RawValue>>>,
    /// Row count reported by the server
    pub rows: Option<usize>,
}

// =============================================================================
// Canonical Form
// =============================================================================

/// Canonical cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    /// Original decimal text, never round-tripped through a float
    Number(String),
    Text(String),
    Array(Vec<Cell>),
    Tuple(Vec<Cell>),
    Map(Vec<(Cell, Cell)>),
}

impl Cell {
    /// Render a value nested inside a composite: strings are quoted.
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(&quote(s)),
            other => fmt::Display::fmt(other, f),
        }
    }

    fn fmt_list(items: &[Cell], open: char, close: char, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", open)?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            item.fmt_nested(f)?;
        }
        write!(f, "{}", close)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Number(s) | Self::Text(s) => f.write_str(s),
            Self::Array(items) => Self::fmt_list(items, '[', ']', f),
            Self::Tuple(items) => Self::fmt_list(items, '(', ')', f),
            Self::Map(entries) => {
                let mut rendered: Vec<(String, &Cell)> = entries
                    .iter()
                    .map(|(k, v)| (NestedDisplay(k).to_string(), v))
                    .collect();
                rendered.sort_by(|a, b| a.0.cmp(&b.0));

                f.write_str("{")?;
                for (i, (key, value)) in rendered.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: ", key)?;
                    value.fmt_nested(f)?;
                }
                f.write_str("}")
            }
        }
    }
}

struct NestedDisplay<'a>(&'a Cell);

impl fmt::Display for NestedDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_nested(f)
    }
}

/// Columns and rows in canonical form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedResult {
    /// Column names in driver order; duplicates are kept
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl NormalizedResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// =============================================================================
// Type Classification
// =============================================================================

/// Shape of a ClickHouse column type, as far as rendering cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Number,
    Bool,
    Array(Box<ColumnType>),
    /// Element names are present for named tuples
    Tuple(Vec<(Option<String>, ColumnType)>),
    Map(Box<ColumnType>, Box<ColumnType>),
    /// Strings, dates, UUIDs, enums and anything else rendered as text
    Other,
}

impl ColumnType {
    /// Parse a ClickHouse type name such as `Nullable(Decimal(18, 4))`.
    pub fn parse(type_name: &str) -> Self {
        let name = type_name.trim();
        let (head, args) = match name.find('(') {
            Some(open) if name.ends_with(')') => (&name[..open], Some(&name[open + 1..name.len() - 1])),
            _ => (name, None),
        };

        match (head, args) {
            ("Nullable" | "LowCardinality", Some(inner)) => Self::parse(inner),
            ("Array", Some(inner)) => Self::Array(Box::new(Self::parse(inner))),
            ("Map", Some(inner)) => {
                let parts = split_type_args(inner);
                match parts.as_slice() {
                    [key, value] => Self::Map(Box::new(Self::parse(key)), Box::new(Self::parse(value))),
                    _ => Self::Other,
                }
            }
            ("Tuple", Some(inner)) => Self::Tuple(
                split_type_args(inner)
                    .into_iter()
                    .map(parse_tuple_element)
                    .collect(),
            ),
            ("Bool" | "Boolean", None) => Self::Bool,
            (h, _) if is_numeric_type(h) => Self::Number,
            _ => Self::Other,
        }
    }
}

fn is_numeric_type(head: &str) -> bool {
    let digits = head
        .strip_prefix("UInt")
        .or_else(|| head.strip_prefix("Int"))
        .or_else(|| head.strip_prefix("Float"));
    if let Some(bits) = digits {
        return !bits.is_empty() && bits.bytes().all(|b| b.is_ascii_digit());
    }
    head.starts_with("Decimal")
}

/// `name Type` inside a named tuple, or just `Type`.
fn parse_tuple_element(element: &str) -> (Option<String>, ColumnType) {
    let element = element.trim();
    match (element.find(' '), element.find('(')) {
        (Some(space), paren) if paren.is_none_or(|p| space < p) => {
            let (name, ty) = element.split_at(space);
            (Some(name.trim_matches('`').to_string()), ColumnType::parse(ty))
        }
        _ => (None, ColumnType::parse(element)),
    }
}

/// Split type arguments on top-level commas, ignoring commas in parentheses or quotes.
fn split_type_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in args.char_indices() {
        if in_quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '\'' => in_quote = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts
}

// =============================================================================
// Adapters
// =============================================================================

/// Normalize a raw result from either transport.
pub fn normalize(raw: RawResult) -> GatewayResult<NormalizedResult> {
    match raw {
        RawResult::Native(result) => normalize_native(result),
        RawResult::Http(result) => normalize_http(result),
        RawResult::HttpText(text) => Ok(normalize_text(&text)),
    }
}

/// Normalize native blocks.
pub fn normalize_native(result: NativeResult) -> GatewayResult<NormalizedResult> {
    let fail = |message: String| GatewayError::normalization(TransportKind::Native, message);

    if result.rows.len() != result.row_count {
        return Err(fail(format!(
            "driver reported {} rows but returned {}",
            result.row_count,
            result.rows.len()
        )));
    }

    let width = result.columns.len();
    let rows = result
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != width {
                return Err(fail(format!(
                    "row {} has {} values for {} columns",
                    i,
                    row.len(),
                    width
                )));
            }
            Ok(row.into_iter().map(native_cell).collect::<Vec<Cell>>())
        })
        .collect::<GatewayResult<Vec<Vec<Cell>>>>()?;

    Ok(NormalizedResult {
        columns: result.columns.into_iter().map(|c| c.name).collect(),
        rows,
    })
}

fn native_cell(value: NativeValue) -> Cell {
    match value {
        NativeValue::Null => Cell::Null,
        NativeValue::Bool(v) => Cell::Bool(v),
        NativeValue::Number(s) => Cell::Number(s),
        NativeValue::Text(s) => Cell::Text(s),
        NativeValue::Bytes(bytes) => Cell::Text(decode_binary_value(bytes)),
        NativeValue::Array(items) => Cell::Array(items.into_iter().map(native_cell).collect()),
        NativeValue::Map(entries) => Cell::Map(
            entries
                .into_iter()
                .map(|(k, v)| (native_cell(k), native_cell(v)))
                .collect(),
        ),
    }
}

/// Decode string bytes as UTF-8, falling back to a `base64:` prefixed encoding.
pub fn decode_binary_value(bytes: Vec<u8>) -> String {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => format!("base64:{}", STANDARD.encode(e.as_bytes())),
    }
}

/// Normalize a JSONCompact response.
pub fn normalize_http(result: HttpResult) -> GatewayResult<NormalizedResult> {
    let fail = |message: String| GatewayError::normalization(TransportKind::Http, message);

    if let Some(rows) = result.rows {
        if rows != result.data.len() {
            return Err(fail(format!(
                "server reported {} rows but returned {}",
                rows,
                result.data.len()
            )));
        }
    }

    let types: Vec<ColumnType> = result
        .meta
        .iter()
        .map(|c| ColumnType::parse(&c.type_name))
        .collect();

    let rows = result
        .data
        .iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != types.len() {
                return Err(fail(format!(
                    "row {} has {} values for {} columns",
                    i,
                    row.len(),
                    types.len()
                )));
            }
            row.iter()
                .zip(&types)
                .map(|(raw, ty)| http_cell(raw, ty))
                .collect::<Result<Vec<Cell>, String>>()
                .map_err(|e| fail(format!("row {}: {}", i, e)))
        })
        .collect::<GatewayResult<Vec<Vec<Cell>>>>()?;

    Ok(NormalizedResult {
        columns: result.meta.into_iter().map(|c| c.name).collect(),
        rows,
    })
}

/// Normalize a plain text body (TSV, CSV, Pretty, ...).
///
/// Blank lines are skipped. Tab-separated lines are split into
/// `column_1`, `column_2`, ...; otherwise each line is one `result` cell.
pub fn normalize_text(text: &str) -> NormalizedResult {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        return NormalizedResult::default();
    }

    let width = lines
        .iter()
        .map(|line| line.split('\t').count())
        .max()
        .unwrap_or(1);
    let columns = if width == 1 {
        vec!["result".to_string()]
    } else {
        (1..=width).map(|i| format!("column_{}", i)).collect()
    };

    let rows = lines
        .iter()
        .map(|line| {
            let mut cells: Vec<Cell> = line
                .split('\t')
                .map(|value| Cell::Text(value.to_string()))
                .collect();
            cells.resize(width, Cell::Null);
            cells
        })
        .collect();

    NormalizedResult { columns, rows }
}

fn http_cell(raw: &RawValue, ty: &ColumnType) -> Result<Cell, String> {
    let text = raw.get().trim();
    match text.as_bytes().first() {
        None => Err("empty value".to_string()),
        Some(b'n') if text == "null" => Ok(Cell::Null),
        Some(b't') if text == "true" => Ok(Cell::Bool(true)),
        Some(b'f') if text == "false" => Ok(Cell::Bool(false)),
        Some(b'"') => {
            let s: String = serde_json::from_str(text).map_err(|e| e.to_string())?;
            Ok(match ty {
                ColumnType::Number => Cell::Number(s),
                _ => Cell::Text(s),
            })
        }
        Some(b'[') => {
            let items: Vec<Box<RawValue>> =
                serde_json::from_str(text).map_err(|e| e.to_string())?;
            match ty {
                ColumnType::Tuple(elements) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let element = elements.get(i).map_or(&ColumnType::Other, |(_, t)| t);
                        http_cell(item, element)
                    })
                    .collect::<Result<Vec<Cell>, String>>()
                    .map(Cell::Tuple),
                ColumnType::Array(element) => items
                    .iter()
                    .map(|item| http_cell(item, element))
                    .collect::<Result<Vec<Cell>, String>>()
                    .map(Cell::Array),
                _ => items
                    .iter()
                    .map(|item| http_cell(item, &ColumnType::Other))
                    .collect::<Result<Vec<Cell>, String>>()
                    .map(Cell::Array),
            }
        }
        Some(b'{') => {
            let entries: BTreeMap<String, Box<RawValue>> =
                serde_json::from_str(text).map_err(|e| e.to_string())?;
            match ty {
                ColumnType::Map(key_type, value_type) => entries
                    .iter()
                    .map(|(k, v)| {
                        let key = match key_type.as_ref() {
                            ColumnType::Number => Cell::Number(k.clone()),
                            _ => Cell::Text(k.clone()),
                        };
                        Ok((key, http_cell(v, value_type)?))
                    })
                    .collect::<Result<Vec<(Cell, Cell)>, String>>()
                    .map(Cell::Map),
                // Named tuples may be written as objects.
                ColumnType::Tuple(elements) if elements.iter().all(|(n, _)| n.is_some()) => elements
                    .iter()
                    .map(|(name, element)| {
                        let name = name.as_deref().unwrap_or_default();
                        match entries.get(name) {
                            Some(v) => http_cell(v, element),
                            None => Err(format!("tuple element '{}' is missing", name)),
                        }
                    })
                    .collect::<Result<Vec<Cell>, String>>()
                    .map(Cell::Tuple),
                _ => Err("unexpected JSON object in a non-Map column".to_string()),
            }
        }
        Some(_) => {
            // Bare JSON number: keep the server's text.
            serde_json::from_str::<serde_json::Number>(text).map_err(|e| e.to_string())?;
            Ok(Cell::Number(text.to_string()))
        }
    }
}
