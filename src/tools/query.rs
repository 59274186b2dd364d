//! Read query tool.
//!
//! This module implements the `clickhouse_execute_read` MCP tool. A call
//! goes Classifier → Connection Manager → Normalizer → table renderer, and
//! ends in exactly one [`QueryOutcome`].

use crate::db::{ConnectionManager, normalize};
use crate::error::GatewayError;
use crate::models::{
    DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS, QueryParams, QueryRequest, TransportKind,
};
use crate::tools::format::render_table;
use crate::tools::sql_validator::{self, Classification};
use rmcp::ErrorData as McpError;
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Input for the read query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// SQL to execute. Only SELECT, SHOW, DESCRIBE, DESC, EXPLAIN and WITH ... SELECT are allowed.
    #[serde(alias = "sql_query")]
    pub sql: String,
    /// Values for {name} placeholders (JSON object) or {0}, {1}, ... placeholders (JSON array)
    #[serde(default)]
    pub params: Option<QueryParams>,
    /// Query timeout in seconds. Default: 30, max: 300
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Maximum rows to show. Default: 10, max: 100
    #[serde(default)]
    pub max_rows: Option<usize>,
}

/// Caller-visible result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Refused locally; nothing was sent to ClickHouse.
    Rejected { reason: String },
    Failed {
        transport: Option<TransportKind>,
        reason: String,
    },
    TimedOut { transport: TransportKind, secs: u64 },
    Table(String),
}

impl QueryOutcome {
    fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timeout",
            Self::Table(_) => "table",
        }
    }

    fn transport(&self) -> Option<TransportKind> {
        match self {
            Self::Failed { transport, .. } => *transport,
            Self::TimedOut { transport, .. } => Some(*transport),
            _ => None,
        }
    }

    fn reason(&self) -> String {
        match self {
            Self::Rejected { reason } | Self::Failed { reason, .. } => reason.clone(),
            Self::TimedOut { secs, .. } => format!("timed out after {}s", secs),
            Self::Table(_) => String::new(),
        }
    }

    /// Convert to an MCP tool result. Everything except a table is an MCP error.
    pub fn into_tool_result(self) -> Result<String, McpError> {
        let mut data = serde_json::json!({
            "reason": self.reason(),
            "kind": self.kind(),
        });
        if let Some(transport) = self.transport() {
            data["transport"] = serde_json::Value::String(transport.to_string());
        }

        match self {
            Self::Table(table) => Ok(table),
            Self::Rejected { .. } => Err(McpError::invalid_params(self.to_string(), Some(data))),
            Self::Failed { .. } | Self::TimedOut { .. } => {
                Err(McpError::internal_error(self.to_string(), Some(data)))
            }
        }
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "Rejected: {}", reason),
            Self::Failed {
                transport: Some(transport),
                reason,
            } => write!(f, "{} transport failed: {}", transport, reason),
            Self::Failed {
                transport: None,
                reason,
            } => write!(f, "Query failed: {}", reason),
            Self::TimedOut { transport, secs } => {
                write!(f, "{} transport timed out after {}s", transport, secs)
            }
            Self::Table(table) => f.write_str(table),
        }
    }
}

impl From<GatewayError> for QueryOutcome {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation { reason } => Self::Rejected { reason },
            GatewayError::Timeout { transport, secs } => Self::TimedOut { transport, secs },
            GatewayError::Transport { transport, message }
            | GatewayError::Normalization { transport, message } => Self::Failed {
                transport: Some(transport),
                reason: message,
            },
            other => Self::Failed {
                transport: None,
                reason: other.reason(),
            },
        }
    }
}

/// Handler for read query execution.
pub struct QueryToolHandler {
    connection_manager: Arc<ConnectionManager>,
    default_timeout_secs: u64,
    default_max_rows: usize,
}

impl QueryToolHandler {
    /// Create a handler with the built-in defaults.
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self::with_defaults(connection_manager, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_MAX_ROWS)
    }

    /// Create a handler with configured call defaults.
    pub fn with_defaults(
        connection_manager: Arc<ConnectionManager>,
        default_timeout_secs: u64,
        default_max_rows: usize,
    ) -> Self {
        Self {
            connection_manager,
            default_timeout_secs,
            default_max_rows,
        }
    }

    /// Handle the tool call.
    pub async fn query(&self, input: QueryInput) -> QueryOutcome {
        match QueryRequest::new(input.sql) {
            Ok(request) => {
                let request = request
                    .with_params(input.params)
                    .with_timeout(input.timeout_seconds)
                    .with_max_rows(input.max_rows);
                self.run(request).await
            }
            Err(e) => QueryOutcome::from(e),
        }
    }

    /// Run one request to its outcome.
    pub async fn run(&self, request: QueryRequest) -> QueryOutcome {
        let query_id = Uuid::new_v4();
        let started = Instant::now();

        let statement = match sql_validator::classify(request.sql()) {
            Classification::Allowed(statement) => statement,
            Classification::Rejected(reason) => {
                info!(%query_id, reason, "Query rejected");
                return QueryOutcome::Rejected {
                    reason: reason.to_string(),
                };
            }
        };

        let timeout = request.effective_timeout(self.default_timeout_secs);
        let max_rows = request.effective_max_rows(self.default_max_rows);

        let execution = match self
            .connection_manager
            .execute(&statement, request.params(), timeout)
            .await
        {
            Ok(execution) => execution,
            Err(e) => {
                warn!(
                    %query_id,
                    transport = ?e.transport_kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Query failed"
                );
                return QueryOutcome::from(e);
            }
        };

        let transport = execution.transport;
        match normalize(execution.result) {
            Ok(result) => {
                info!(
                    %query_id,
                    %transport,
                    rows = result.row_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Query executed"
                );
                QueryOutcome::Table(render_table(&result, max_rows))
            }
            Err(e) => {
                warn!(%query_id, %transport, error = %e, "Query result could not be normalized");
                QueryOutcome::from(e)
            }
        }
    }
}
