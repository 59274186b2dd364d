//! Error types for the ClickHouse gateway.
//!
//! This module defines the error taxonomy using `thiserror`. Every variant
//! renders to a short, human-readable message that is safe to hand back to
//! an MCP client: no stack traces, no URLs carrying credentials, no passwords.

use crate::models::TransportKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Rejected locally before any network call (classifier, empty input, parameters).
    #[error("Rejected: {reason}")]
    Validation { reason: String },

    #[error("{transport} transport failed: {message}")]
    Transport {
        transport: TransportKind,
        message: String,
    },

    #[error("{transport} transport timed out after {secs}s")]
    Timeout { transport: TransportKind, secs: u64 },

    /// The driver returned a value shape the normalizer cannot interpret.
    #[error("Unexpected result from {transport} transport: {message}")]
    Normalization {
        transport: TransportKind,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a validation (rejection) error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a transport error for the given transport.
    pub fn transport(transport: TransportKind, message: impl Into<String>) -> Self {
        Self::Transport {
            transport,
            message: message.into(),
        }
    }

    /// Create a timeout error. Sub-second budgets are reported as 1s.
    pub fn timeout(transport: TransportKind, budget: std::time::Duration) -> Self {
        Self::Timeout {
            transport,
            secs: budget.as_secs().max(1),
        }
    }

    /// Create a normalization error.
    pub fn normalization(transport: TransportKind, message: impl Into<String>) -> Self {
        Self::Normalization {
            transport,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Fill in the budget of a driver-reported timeout, which arrives without one.
    pub fn with_budget(self, budget: std::time::Duration) -> Self {
        match self {
            Self::Timeout { transport, secs: 0 } => Self::timeout(transport, budget),
            other => other,
        }
    }

    /// Transport and timeout failures are retried once on the alternate transport.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// The transport this error originated from, if any.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            Self::Transport { transport, .. }
            | Self::Timeout { transport, .. }
            | Self::Normalization { transport, .. } => Some(*transport),
            _ => None,
        }
    }

    /// Short machine-readable category, used in MCP error data.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Normalization { .. } => "normalization",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }

    /// The caller-facing reason, without the variant prefix.
    pub fn reason(&self) -> String {
        match self {
            Self::Validation { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Convert ClickHouse native driver errors.
///
/// Server errors keep only `NAME (code): message`; the server-side stack trace is dropped.
pub(crate) fn from_native(err: clickhouse_rs::errors::Error) -> GatewayError {
    use clickhouse_rs::errors::{DriverError, Error};

    match err {
        Error::Server(server) => GatewayError::transport(
            TransportKind::Native,
            format!("{} ({}): {}", server.name, server.code, server.message.trim()),
        ),
        Error::Driver(DriverError::Timeout) => GatewayError::Timeout {
            transport: TransportKind::Native,
            secs: 0,
        },
        Error::Connection(conn) => {
            GatewayError::transport(TransportKind::Native, format!("connection error: {}", conn))
        }
        Error::Io(io) => GatewayError::transport(TransportKind::Native, format!("I/O error: {}", io)),
        other => GatewayError::transport(TransportKind::Native, other.to_string()),
    }
}

/// Convert reqwest errors. The request URL is stripped before rendering.
pub(crate) fn from_http(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        return GatewayError::Timeout {
            transport: TransportKind::Http,
            secs: 0,
        };
    }
    let kind = if err.is_connect() {
        "connection error"
    } else if err.is_decode() {
        "failed to read response"
    } else {
        "request failed"
    };
    GatewayError::transport(
        TransportKind::Http,
        format!("{}: {}", kind, err.without_url()),
    )
}

/// Build error data as JSON value.
fn error_data(err: &GatewayError) -> Option<serde_json::Value> {
    let mut data = serde_json::json!({
        "reason": err.reason(),
        "kind": err.kind(),
    });
    if let Some(transport) = err.transport_kind() {
        data["transport"] = serde_json::Value::String(transport.to_string());
    }
    Some(data)
}

/// Convert GatewayError to MCP ErrorData for semantic error categorization.
impl From<GatewayError> for rmcp::ErrorData {
    fn from(err: GatewayError) -> Self {
        let data = error_data(&err);
        match &err {
            GatewayError::Validation { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),
            GatewayError::Transport { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::Normalization { .. }
            | GatewayError::Config { .. }
            | GatewayError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display_names_transport() {
        let err = GatewayError::transport(TransportKind::Native, "connection refused");
        assert_eq!(err.to_string(), "native transport failed: connection refused");

        let err = GatewayError::timeout(TransportKind::Http, Duration::from_secs(5));
        assert_eq!(err.to_string(), "http transport timed out after 5s");
    }

    #[test]
    fn test_timeout_rounds_sub_second_budget_up() {
        let err = GatewayError::timeout(TransportKind::Native, Duration::from_millis(200));
        assert!(matches!(err, GatewayError::Timeout { secs: 1, .. }));
    }

    #[test]
    fn test_error_retryable() {
        assert!(GatewayError::transport(TransportKind::Native, "x").is_retryable());
        assert!(GatewayError::timeout(TransportKind::Native, Duration::from_secs(1)).is_retryable());
        assert!(!GatewayError::validation("not a read-only statement").is_retryable());
        assert!(!GatewayError::normalization(TransportKind::Http, "bad row").is_retryable());
    }

    #[test]
    fn test_validation_reason_has_no_prefix() {
        let err = GatewayError::validation("multiple statements");
        assert_eq!(err.reason(), "multiple statements");
        assert_eq!(err.kind(), "validation");
        assert!(err.transport_kind().is_none());
    }

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = GatewayError::validation("not a read-only statement").into();
        assert_eq!(mcp_err.code.0, -32602);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["reason"], "not a read-only statement");
        assert_eq!(data["kind"], "validation");
        assert!(data.get("transport").is_none());
    }

    #[test]
    fn test_transport_maps_to_internal_error_with_transport() {
        let mcp_err: rmcp::ErrorData =
            GatewayError::transport(TransportKind::Http, "status 502").into();
        assert_eq!(mcp_err.code.0, -32603);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["transport"], "http");
        assert_eq!(data["kind"], "transport");
    }

    #[test]
    fn test_timeout_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData =
            GatewayError::timeout(TransportKind::Native, Duration::from_secs(5)).into();
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["kind"], "timeout");
    }

    #[test]
    fn test_normalization_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData =
            GatewayError::normalization(TransportKind::Http, "row 3 has 2 cells").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert!(mcp_err.message.contains("row 3 has 2 cells"));
    }

    #[test]
    fn test_native_server_error_drops_stack_trace() {
        let err = clickhouse_rs::errors::Error::Server(clickhouse_rs::errors::ServerError {
            code: 60,
            name: "DB::Exception".to_string(),
            message: "Table default.missing doesn't exist".to_string(),
            stack_trace: "0. DB::Exception::Exception ... secret frames".to_string(),
        });
        let converted = from_native(err);
        let text = converted.to_string();
        assert!(text.contains("DB::Exception (60)"));
        assert!(text.contains("doesn't exist"));
        assert!(!text.contains("secret frames"));
        assert!(converted.is_retryable());
    }
}
