//! ClickHouse Gateway - Main entry point.
//!
//! This server provides an MCP (Model Context Protocol) tool for AI assistants
//! to run read-only SQL against ClickHouse.

use clickhouse_gateway::config::{Config, TransportMode};
use clickhouse_gateway::db::ConnectionManager;
use clickhouse_gateway::mcp::GatewayService;
use clickhouse_gateway::tools::QueryToolHandler;
use clickhouse_gateway::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries MCP frames in stdio mode.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    init_tracing(&config);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }
    let endpoint = match config.endpoint() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("At least one of the native protocol and the HTTP interface must be enabled.");
            std::process::exit(2);
        }
    };

    info!(
        transport = %config.transport,
        host = %endpoint.host,
        native_port = ?endpoint.native_port,
        http_port = ?endpoint.http_port,
        "Starting ClickHouse Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let connection_manager = Arc::new(ConnectionManager::from_endpoint(&endpoint)?);

    // Reachability is only reported; queries still fail over per call
    if config.enabled {
        connection_manager
            .check_transports(config.connect_timeout_duration())
            .await;
    }

    let query_handler = Arc::new(QueryToolHandler::with_defaults(
        connection_manager.clone(),
        config.query_timeout,
        config.max_rows,
    ));
    let service = GatewayService::new(
        query_handler,
        &config.resource_description(),
        config.enabled,
    );

    // Run the appropriate transport
    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            let transport = StdioTransport::new(service, connection_manager);
            transport.run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.mcp_host,
                port = config.mcp_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            let transport = HttpTransport::new(
                service,
                connection_manager,
                &config.mcp_host,
                config.mcp_port,
                &config.mcp_endpoint,
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
