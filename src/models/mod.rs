//! Data models for the ClickHouse gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionConfigError, EndpointConfig, TransportKind};
pub use query::{
    DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS, MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT,
    QueryParam, QueryParams, QueryRequest,
};
