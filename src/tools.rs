//! MCP Tools for SQL Server operations.
//!
//! - `query_sql`: Execute a read query and return its rows
//! - `get_table_structure`: Columns, keys and indexes of a table
//! - `list_tables`: Tables in a schema
//! - `get_database_info`: Database name, version, schemas and connection
//! - `health_check`: Test database connectivity
//!
//! Domain failures are returned as tool results with `is_error` set and a
//! JSON error payload, so the client sees the error kind and a suggestion.

mod inputs;

pub use inputs::*;

use crate::bridge::QueryRequest;
use crate::database::SqlParam;
use crate::error::ServerError;
use crate::server::JeweiMcpServer;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::{tool, tool_router, ErrorData as McpError};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

/// Build the tool router for [`JeweiMcpServer`].
pub(crate) fn create_tool_router() -> ToolRouter<JeweiMcpServer> {
    JeweiMcpServer::tool_router()
}

#[tool_router]
impl JeweiMcpServer {
    /// Execute a SQL query and return results.
    #[tool(
        description = "Execute a T-SQL query and return its rows. In read-only mode only SELECT/WITH statements are accepted. Parameters are bound positionally as @P1, @P2, ..."
    )]
    pub async fn query_sql(
        &self,
        Parameters(input): Parameters<QuerySqlInput>,
    ) -> Result<CallToolResult, McpError> {
        let params = match input
            .params
            .iter()
            .map(SqlParam::from_json)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(params) => params,
            Err(e) => return Ok(tool_error(e, json!({}))),
        };

        let request = QueryRequest {
            sql: input.sql,
            params,
            max_rows: input.max_rows,
        };

        let result = match self.bridge.execute_query(request).await {
            Ok(result) => result,
            Err(e) => return Ok(tool_error(e, json!({}))),
        };

        match input.format {
            OutputFormat::Json => json_result(&result),
            OutputFormat::Table => Ok(CallToolResult::success(vec![Content::text(
                result.to_markdown_table(),
            )])),
            OutputFormat::Csv => Ok(CallToolResult::success(vec![Content::text(
                result.to_csv(),
            )])),
        }
    }

    /// Describe a table.
    #[tool(
        description = "Get the structure of a table: columns (type, length, precision, scale, nullability, description), primary keys, foreign keys and indexes."
    )]
    pub async fn get_table_structure(
        &self,
        Parameters(input): Parameters<TableStructureInput>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .bridge
            .describe_table(&input.table_name, Some(&input.schema))
            .await
        {
            Ok(structure) => json_result(&structure),
            Err(e) => Ok(tool_error(
                e,
                json!({ "table": input.table_name, "schema": input.schema }),
            )),
        }
    }

    /// List tables in a schema.
    #[tool(description = "List the tables in a schema with their descriptions.")]
    pub async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<CallToolResult, McpError> {
        match self.bridge.list_tables(Some(&input.schema)).await {
            Ok(tables) => json_result(&tables),
            Err(e) => Ok(tool_error(e, json!({ "schema": input.schema }))),
        }
    }

    /// Database information.
    #[tool(
        description = "Get the current database name, SQL Server version, schemas and connection details."
    )]
    pub async fn get_database_info(&self) -> Result<CallToolResult, McpError> {
        match self.bridge.database_info().await {
            Ok(info) => json_result(&info),
            Err(e) => Ok(tool_error(e, json!({}))),
        }
    }

    /// Connectivity probe.
    #[tool(description = "Check database connectivity and report round-trip latency.")]
    pub async fn health_check(&self) -> Result<CallToolResult, McpError> {
        let status = self.bridge.health_check().await;
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        if status.is_healthy() {
            Ok(CallToolResult::success(vec![Content::text(json)]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(json)]))
        }
    }
}

/// Serialize a value as a pretty JSON success result.
fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Build a failed tool result carrying the error payload plus request context.
fn tool_error(error: ServerError, context: Value) -> CallToolResult {
    warn!(kind = %error.kind(), error = %error, "Tool call failed");

    let mut payload = serde_json::to_value(error.to_payload())
        .unwrap_or_else(|_| json!({ "error": error.to_string() }));

    if let (Some(body), Value::Object(extra)) = (payload.as_object_mut(), context) {
        for (key, value) in extra {
            body.entry(key).or_insert(value);
        }
    }

    CallToolResult::error(vec![Content::text(payload.to_string())])
}
