//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::db::ConnectionManager;
use crate::error::{GatewayError, GatewayResult};
use crate::mcp::GatewayService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Stdio transport implementation.
///
/// This transport reads JSON-RPC messages from stdin and writes
/// responses to stdout, following the MCP protocol specification.
pub struct StdioTransport {
    service: GatewayService,
    connection_manager: Arc<ConnectionManager>,
}

impl StdioTransport {
    /// Create a new stdio transport.
    ///
    /// # Arguments
    ///
    /// * `service` - The MCP service to serve
    /// * `connection_manager` - Closed when the transport shuts down
    pub fn new(service: GatewayService, connection_manager: Arc<ConnectionManager>) -> Self {
        Self {
            service,
            connection_manager,
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> GatewayResult<()> {
        info!("Starting MCP server with stdio transport");

        let running_service = self.service.clone().serve(stdio()).await.map_err(|e| {
            GatewayError::internal(format!("Failed to start stdio transport: {}", e))
        })?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => {
                        info!("Stdio transport completed normally");
                    }
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        self.connection_manager.close_all().await;
                        return Err(GatewayError::internal(format!(
                            "Stdio transport error: {}",
                            e
                        )));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            // Spawn a task to listen for second signal and force exit
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing ClickHouse connections");
        self.connection_manager.close_all().await;

        if shutdown_requested {
            // tokio::select! cannot interrupt a blocking stdin read
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EndpointConfig;
    use crate::tools::QueryToolHandler;

    #[test]
    fn test_stdio_transport_creation() {
        let endpoint = EndpointConfig::new("localhost", Some(9000), None).unwrap();
        let manager = Arc::new(ConnectionManager::from_endpoint(&endpoint).unwrap());
        let service = GatewayService::new(Arc::new(QueryToolHandler::new(manager.clone())), "", true);
        let transport = StdioTransport::new(service, manager);
        assert_eq!(transport.name(), "stdio");
    }
}
