//! MCP tool implementations.
//!
//! - `query`: the `clickhouse_execute_read` tool handler
//! - `sql_validator`: read-only statement classification
//! - `format`: text table rendering

pub mod format;
pub mod query;
pub mod sql_validator;

pub use query::{QueryInput, QueryOutcome, QueryToolHandler};
