//! ServerHandler implementation for the MSSQL MCP Server.
//!
//! Tools are routed by `#[tool_handler]`; resources and prompts are served
//! from [`crate::resources`] and [`crate::prompts`].

use crate::prompts::{build_prompt_list, get_prompt};
use crate::resources::{build_resource_list, read_resource};
use crate::security::ValidationMode;
use crate::server::JeweiMcpServer;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    GetPromptRequestParam, GetPromptResult, Implementation, ListPromptsResult,
    ListResourcesResult, Meta, PaginatedRequestParam, ProtocolVersion, ReadResourceRequestParam,
    ReadResourceResult, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{tool_handler, ErrorData};
use std::collections::HashMap;
use tracing::info;

#[tool_handler]
impl ServerHandler for JeweiMcpServer {
    /// Server identification, sent during the initialization handshake.
    fn get_info(&self) -> ServerInfo {
        info!("MCP client requesting server info");
        server_info(self)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: build_resource_list(),
            next_cursor: None,
            meta: Some(Meta(
                serde_json::json!({
                    "read_only": self.is_read_only(),
                    "current_database": self.current_database(),
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            )),
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        read_resource(self, &request.uri).map_err(ErrorData::from)
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, ErrorData> {
        Ok(ListPromptsResult {
            prompts: build_prompt_list(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, ErrorData> {
        let arguments: Option<HashMap<String, String>> = request.arguments.map(|map| {
            map.into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect()
        });

        get_prompt(self, &request.name, arguments.as_ref())
            .await
            .map_err(ErrorData::from)
    }
}

fn server_info(server: &JeweiMcpServer) -> ServerInfo {
    ServerInfo {
        protocol_version: ProtocolVersion::LATEST,

        capabilities: ServerCapabilities::builder()
            .enable_tools()
            .enable_resources()
            .enable_prompts()
            .build(),

        server_info: Implementation {
            name: server.config.server.name.clone(),
            title: Some("Jewei MSSQL MCP Server".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            icons: None,
            website_url: None,
        },

        instructions: Some(build_instructions(server)),
    }
}

/// Build server instructions based on current configuration.
fn build_instructions(server: &JeweiMcpServer) -> String {
    let mut instructions = String::new();

    instructions.push_str("# MSSQL MCP Server\n\n");
    instructions.push_str("This server runs queries against Microsoft SQL Server.\n\n");

    if let Some(db) = server.current_database() {
        instructions.push_str(&format!("**Connected to database:** `{}`\n\n", db));
    }

    instructions.push_str("### Tools\n");
    instructions.push_str("- `list_tables`: tables in a schema\n");
    instructions.push_str("- `get_table_structure`: columns, keys and indexes of a table\n");
    instructions.push_str("- `query_sql`: run a query and return rows\n");
    instructions.push_str("- `get_database_info`: database name, version and schemas\n");
    instructions.push_str("- `health_check`: connectivity probe\n\n");

    match server.config.security.validation_mode {
        ValidationMode::ReadOnly => {
            instructions.push_str("**Read-only mode**: only SELECT / WITH queries are accepted.\n\n");
        }
        ValidationMode::Unrestricted => {
            instructions.push_str("**Unrestricted mode**: all statements are accepted.\n\n");
        }
    }

    instructions.push_str("### Best Practices\n");
    instructions.push_str("1. Read `data://sql_describe` before writing SQL\n");
    instructions.push_str("2. Inspect tables with `get_table_structure` before querying them\n");
    instructions.push_str("3. Write SQL Server 2016 compatible T-SQL and bind values as @P1, @P2, ...\n");

    instructions
}
