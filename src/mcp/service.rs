//! MCP service implementation using rmcp.
//!
//! This module defines the GatewayService struct, which exposes the
//! read-only ClickHouse query tool via the MCP protocol using the rmcp
//! framework's macros.

use crate::tools::query::{QueryInput, QueryToolHandler};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::info;

/// Name of the read query tool.
pub const EXECUTE_READ_TOOL: &str = "clickhouse_execute_read";

const TOOL_DESCRIPTION: &str = "Execute read-only ClickHouse SQL code. Only SELECT, SHOW, DESCRIBE, EXPLAIN and WITH ... SELECT allowed; queries are validated before execution.\nOne statement per call. Bind values with {name} placeholders and a params object, or {0}, {1}, ... and a params array.\nThe result is a text table of at most max_rows rows (default 10, max 100).";

#[derive(Clone)]
pub struct GatewayService {
    /// Shared handler for the read query tool
    query_handler: Arc<QueryToolHandler>,
    /// Server instructions, including the resource description
    instructions: String,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    /// Create a new GatewayService instance.
    ///
    /// # Arguments
    ///
    /// * `query_handler` - Shared handler for read queries
    /// * `resource_description` - Free-form text appended to the tool description and instructions
    /// * `enabled` - When false, no tools are registered
    pub fn new(
        query_handler: Arc<QueryToolHandler>,
        resource_description: &str,
        enabled: bool,
    ) -> Self {
        let mut tool_router = Self::tool_router();
        if enabled {
            if let Some(route) = tool_router.map.get_mut(EXECUTE_READ_TOOL) {
                route.attr.description = Some(with_resource(TOOL_DESCRIPTION, resource_description).into());
            }
        } else {
            info!("ClickHouse tools disabled");
            tool_router.remove_route(EXECUTE_READ_TOOL);
        }

        Self {
            query_handler,
            instructions: instructions(resource_description, enabled),
            tool_router,
        }
    }
}

fn with_resource(base: &str, resource_description: &str) -> String {
    if resource_description.is_empty() {
        base.to_string()
    } else {
        format!("{}\n\n{}", base, resource_description)
    }
}

fn instructions(resource_description: &str, enabled: bool) -> String {
    if !enabled {
        return "ClickHouse tools are disabled on this server (CLICKHOUSE_ENABLED=false). No tools are available."
            .to_string();
    }
    let base = "Read-only access to a ClickHouse database.\n\
        \n\
        ## Workflow\n\
        1. Explore with `SHOW DATABASES`, `SHOW TABLES FROM db` and `DESCRIBE TABLE db.table`\n\
        2. Query with `SELECT`; add `LIMIT` to large scans\n\
        3. Raise `max_rows` (up to 100) to see more of a result\n\
        \n\
        ## Notes\n\
        - Writes, DDL, SET and multiple statements are rejected before reaching the server\n\
        - Queries run over the native protocol and fall back to HTTP when it is unavailable\n\
        - `timeout_seconds` bounds the whole call, fallback included (default 30, max 300)";
    with_resource(base, resource_description)
}

#[tool_router]
impl GatewayService {
    #[tool(
        name = "clickhouse_execute_read",
        description = "Execute read-only ClickHouse SQL code.",
        annotations(read_only_hint = true)
    )]
    async fn clickhouse_execute_read(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<String, McpError> {
        self.query_handler.query(input).await.into_tool_result()
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "clickhouse-gateway".to_owned(),
                title: Some("ClickHouse Gateway".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(self.instructions.clone()),
        }
    }
}
