//! Connection-related data models.
//!
//! This module defines the two ClickHouse transports and the endpoint
//! configuration both of them are built from.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The two ways to reach ClickHouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Binary TCP protocol (port 9000 by default)
    Native,
    /// HTTP interface (port 8123 by default)
    Http,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Http => "http",
        }
    }

    /// The transport tried when this one fails.
    pub fn other(&self) -> Self {
        match self {
            Self::Native => Self::Http,
            Self::Http => Self::Native,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint configuration shared by both transports.
#[derive(Clone)]
pub struct EndpointConfig {
    pub host: String,
    pub native_port: Option<u16>,
    pub http_port: Option<u16>,
    pub database: String,
    pub username: String,
    /// Contains sensitive data - never log
    pub password: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Use https for the HTTP transport
    pub secure: bool,
    /// ClickHouse `readonly` setting applied to native sessions (0 disables)
    pub readonly: u8,
}

impl EndpointConfig {
    /// Create an endpoint. Fails when neither transport has a port.
    pub fn new(
        host: impl Into<String>,
        native_port: Option<u16>,
        http_port: Option<u16>,
    ) -> Result<Self, ConnectionConfigError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConnectionConfigError::EmptyHost);
        }
        if native_port.is_none() && http_port.is_none() {
            return Err(ConnectionConfigError::NoTransport);
        }

        Ok(Self {
            host,
            native_port,
            http_port,
            database: "default".to_string(),
            username: "default".to_string(),
            password: String::new(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            secure: false,
            readonly: 1,
        })
    }

    pub fn with_credentials(
        mut self,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.database = database.into();
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }

    /// Transports with a configured port, native first.
    pub fn transports(&self) -> Vec<TransportKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.native_port.is_some() {
            kinds.push(TransportKind::Native);
        }
        if self.http_port.is_some() {
            kinds.push(TransportKind::Http);
        }
        kinds
    }

    /// Base URL of the HTTP interface, if configured.
    pub fn http_url(&self) -> Option<String> {
        let scheme = if self.secure { "https" } else { "http" };
        self.http_port
            .map(|port| format!("{}://{}:{}/", scheme, self.host, port))
    }

    /// Address of the native interface, if configured.
    pub fn native_addr(&self) -> Option<String> {
        self.native_port
            .map(|port| format!("tcp://{}:{}", self.host, port))
    }
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("native_port", &self.native_port)
            .field("http_port", &self.http_port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"****")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("secure", &self.secure)
            .field("readonly", &self.readonly)
            .finish()
    }
}

/// Errors that can occur when creating an endpoint configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("ClickHouse host cannot be empty")]
    EmptyHost,

    #[error("At least one of the native or HTTP transports must be enabled")]
    NoTransport,
}
