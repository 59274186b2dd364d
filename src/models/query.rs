//! Query-related data models.
//!
//! This module defines the query request handed to the query service and
//! the parameter values that can be bound into it.

use crate::error::{GatewayError, GatewayResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default number of rows shown in a result table.
pub const DEFAULT_MAX_ROWS: usize = 10;

/// Maximum number of rows shown in a result table.
pub const MAX_ROW_LIMIT: usize = 100;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 300;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Rendered as a ClickHouse array literal
    List(Vec<QueryParam>),
}

/// Parameters bound into a statement: `{name}` placeholders take an object,
/// `{0}` placeholders take an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParams {
    Named(BTreeMap<String, QueryParam>),
    Positional(Vec<QueryParam>),
}

impl QueryParams {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Named(map) => map.is_empty(),
            Self::Positional(values) => values.is_empty(),
        }
    }

    /// Look up the value for a placeholder name.
    ///
    /// Named parameters match by key, positional ones by a decimal index.
    pub fn get(&self, name: &str) -> Option<&QueryParam> {
        match self {
            Self::Named(map) => map.get(name),
            Self::Positional(values) => name.parse::<usize>().ok().and_then(|i| values.get(i)),
        }
    }
}

/// A single read query, created per tool call.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    sql: String,
    params: Option<QueryParams>,
    timeout_secs: Option<u64>,
    max_rows: Option<usize>,
}

impl QueryRequest {
    /// Create a request. Empty or whitespace-only SQL is rejected.
    pub fn new(sql: impl Into<String>) -> GatewayResult<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(GatewayError::validation("empty statement"));
        }
        Ok(Self {
            sql,
            params: None,
            timeout_secs: None,
            max_rows: None,
        })
    }

    pub fn with_params(mut self, params: Option<QueryParams>) -> Self {
        self.params = params.filter(|p| !p.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Option<&QueryParams> {
        self.params.as_ref()
    }

    /// Get the effective timeout (with bounds checking).
    pub fn effective_timeout(&self, default_secs: u64) -> Duration {
        let secs = self
            .timeout_secs
            .unwrap_or(default_secs)
            .clamp(1, MAX_QUERY_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Get the effective display row limit (with bounds checking).
    pub fn effective_max_rows(&self, default_rows: usize) -> usize {
        self.max_rows
            .unwrap_or(default_rows)
            .clamp(1, MAX_ROW_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_rejects_blank_sql() {
        let err = QueryRequest::new("   \n\t").unwrap_err();
        assert_eq!(err.reason(), "empty statement");
        assert!(QueryRequest::new("").is_err());
    }

    #[test]
    fn test_query_request_defaults() {
        let req = QueryRequest::new("SELECT 1").unwrap();
        assert_eq!(req.effective_timeout(DEFAULT_QUERY_TIMEOUT_SECS).as_secs(), 30);
        assert_eq!(req.effective_max_rows(DEFAULT_MAX_ROWS), 10);
        assert!(req.params().is_none());
    }

    #[test]
    fn test_query_request_bounds() {
        let req = QueryRequest::new("SELECT 1")
            .unwrap()
            .with_timeout(Some(999))
            .with_max_rows(Some(5000));
        assert_eq!(req.effective_timeout(30).as_secs(), MAX_QUERY_TIMEOUT_SECS);
        assert_eq!(req.effective_max_rows(10), MAX_ROW_LIMIT);

        let req = QueryRequest::new("SELECT 1")
            .unwrap()
            .with_timeout(Some(0))
            .with_max_rows(Some(0));
        assert_eq!(req.effective_timeout(30).as_secs(), 1);
        assert_eq!(req.effective_max_rows(10), 1);
    }

    #[test]
    fn test_params_deserialize_named_and_positional() {
        let named: QueryParams =
            serde_json::from_value(serde_json::json!({"id": 7, "name": "x"})).unwrap();
        assert_eq!(named.get("id"), Some(&QueryParam::Int(7)));
        assert_eq!(named.get("0"), None);

        let positional: QueryParams =
            serde_json::from_value(serde_json::json!([1.5, null, [1, 2]])).unwrap();
        assert_eq!(positional.get("0"), Some(&QueryParam::Float(1.5)));
        assert_eq!(positional.get("1"), Some(&QueryParam::Null));
        assert!(matches!(positional.get("2"), Some(QueryParam::List(_))));
        assert_eq!(positional.get("x"), None);
    }

    #[test]
    fn test_empty_params_are_dropped() {
        let req = QueryRequest::new("SELECT 1")
            .unwrap()
            .with_params(Some(QueryParams::Positional(Vec::new())));
        assert!(req.params().is_none());
    }
}
