//! Configuration handling for the ClickHouse gateway.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{
    DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS, EndpointConfig, MAX_QUERY_TIMEOUT_SECS,
    MAX_ROW_LIMIT,
};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::error;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

// ClickHouse endpoint defaults
pub const DEFAULT_CLICKHOUSE_HOST: &str = "localhost";
pub const DEFAULT_NATIVE_PORT: u16 = 9000;
pub const DEFAULT_CLICKHOUSE_HTTP_PORT: u16 = 8123;
pub const DEFAULT_DATABASE: &str = "default";
pub const DEFAULT_USERNAME: &str = "default";
pub const DEFAULT_READONLY_LEVEL: u8 = 1;

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// A configuration value that must never show up in logs or debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("****")
    }
}

/// Configuration for the ClickHouse gateway.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clickhouse-gateway",
    about = "MCP server that runs read-only SQL against ClickHouse over the native or HTTP protocol",
    version,
    author
)]
pub struct Config {
    /// ClickHouse server host
    #[arg(long, default_value = DEFAULT_CLICKHOUSE_HOST, env = "CLICKHOUSE_HOST")]
    pub host: String,

    /// ClickHouse native protocol port
    #[arg(long, default_value_t = DEFAULT_NATIVE_PORT, env = "CLICKHOUSE_PORT")]
    pub native_port: u16,

    /// ClickHouse HTTP interface port
    #[arg(
        long = "http-port",
        default_value_t = DEFAULT_CLICKHOUSE_HTTP_PORT,
        env = "CLICKHOUSE_HTTP_PORT"
    )]
    pub clickhouse_http_port: u16,

    /// Do not use the native protocol
    #[arg(long, env = "CLICKHOUSE_DISABLE_NATIVE")]
    pub disable_native: bool,

    /// Do not use the HTTP interface
    #[arg(long, env = "CLICKHOUSE_DISABLE_HTTP")]
    pub disable_http: bool,

    /// Use https for the HTTP interface
    #[arg(long, env = "CLICKHOUSE_SECURE")]
    pub secure: bool,

    /// Database queries run against
    #[arg(long, default_value = DEFAULT_DATABASE, env = "CLICKHOUSE_DATABASE")]
    pub database: String,

    /// ClickHouse user
    #[arg(long, default_value = DEFAULT_USERNAME, env = "CLICKHOUSE_USERNAME")]
    pub username: String,

    /// ClickHouse password
    #[arg(
        long,
        default_value = "",
        env = "CLICKHOUSE_PASSWORD",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: Secret,

    /// ClickHouse `readonly` setting for native sessions (0, 1 or 2)
    #[arg(
        long,
        default_value_t = DEFAULT_READONLY_LEVEL,
        env = "CLICKHOUSE_READONLY",
        value_parser = clap::value_parser!(u8).range(0..=2)
    )]
    pub readonly_level: u8,

    /// Register the query tool (set to false to start with no tools)
    #[arg(
        long,
        default_value_t = true,
        env = "CLICKHOUSE_ENABLED",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub enabled: bool,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "CLICKHOUSE_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Socket read timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_READ_TIMEOUT_SECS,
        env = "CLICKHOUSE_READ_TIMEOUT"
    )]
    pub read_timeout: u64,

    /// Default query timeout in seconds (covers the fallback attempt too)
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "CLICKHOUSE_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Default number of rows shown per result
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS, env = "MAX_ROWS")]
    pub max_rows: usize,

    /// Text file appended to the tool description
    #[arg(long, value_name = "PATH", env = "CLICKHOUSE_RESOURCE_DESC_FILE")]
    pub resource_desc_file: Option<PathBuf>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub mcp_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub mcp_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (written to stderr)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            host: DEFAULT_CLICKHOUSE_HOST.to_string(),
            native_port: DEFAULT_NATIVE_PORT,
            clickhouse_http_port: DEFAULT_CLICKHOUSE_HTTP_PORT,
            disable_native: false,
            disable_http: false,
            secure: false,
            database: DEFAULT_DATABASE.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: Secret::default(),
            readonly_level: DEFAULT_READONLY_LEVEL,
            enabled: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            max_rows: DEFAULT_MAX_ROWS,
            resource_desc_file: None,
            transport: TransportMode::Stdio,
            mcp_host: DEFAULT_HTTP_HOST.to_string(),
            mcp_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Build the ClickHouse endpoint. Fails when both transports are disabled.
    pub fn endpoint(&self) -> GatewayResult<EndpointConfig> {
        let native_port = (!self.disable_native).then_some(self.native_port);
        let http_port = (!self.disable_http).then_some(self.clickhouse_http_port);

        let mut endpoint = EndpointConfig::new(self.host.clone(), native_port, http_port)
            .map_err(|e| GatewayError::config(e.to_string()))?
            .with_credentials(
                self.database.clone(),
                self.username.clone(),
                self.password.expose(),
            )
            .with_timeouts(self.connect_timeout_duration(), self.read_timeout_duration());
        endpoint.secure = self.secure;
        endpoint.readonly = self.readonly_level;
        Ok(endpoint)
    }

    /// Check value ranges clap cannot express.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.connect_timeout == 0 || self.read_timeout == 0 {
            return Err(GatewayError::config("timeouts must be greater than 0"));
        }
        if self.query_timeout == 0 || self.query_timeout > MAX_QUERY_TIMEOUT_SECS {
            return Err(GatewayError::config(format!(
                "query timeout must be between 1 and {} seconds",
                MAX_QUERY_TIMEOUT_SECS
            )));
        }
        if self.max_rows == 0 || self.max_rows > MAX_ROW_LIMIT {
            return Err(GatewayError::config(format!(
                "max rows must be between 1 and {}",
                MAX_ROW_LIMIT
            )));
        }
        Ok(())
    }

    /// Free-form text appended to the tool description, or "" when unset or unreadable.
    pub fn resource_description(&self) -> String {
        load_resource_description(self.resource_desc_file.as_deref())
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.mcp_host, self.mcp_port)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Get the read timeout as a Duration.
    pub fn read_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Read the resource description file. The contents are never parsed.
pub fn load_resource_description(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read resource description");
            String::new()
        }
    }
}
