//! MCP Resources.
//!
//! - `data://sql_describe` - SQL authoring guidelines for the connected server.
//!   Clients should read it before writing queries.

use crate::constants::SQL_GUIDELINES_URI;
use crate::error::ServerError;
use crate::server::JeweiMcpServer;
use rmcp::model::{AnnotateAble, RawResource, ReadResourceResult, Resource, ResourceContents};

/// Build the list of available resources.
pub fn build_resource_list() -> Vec<Resource> {
    vec![create_resource(
        SQL_GUIDELINES_URI,
        "sql_describe",
        "SQL authoring guidelines for this server (read before writing SQL)",
        "text/plain",
    )]
}

/// Read a resource by URI.
pub fn read_resource(
    server: &JeweiMcpServer,
    uri: &str,
) -> Result<ReadResourceResult, ServerError> {
    let content = match uri {
        SQL_GUIDELINES_URI => sql_guidelines(server),
        _ => return Err(ServerError::object_not_found("Resource", uri)),
    };

    Ok(ReadResourceResult {
        contents: vec![ResourceContents::text(content, uri.to_string())],
    })
}

/// Guidelines text, adjusted to the server's database and validation mode.
pub fn sql_guidelines(server: &JeweiMcpServer) -> String {
    let mut text = String::from(
        "SQL authoring guidelines\n\
         \n\
         1. Statements must be valid Microsoft SQL Server 2016 T-SQL.\n\
         \x20  Avoid newer syntax such as STRING_AGG, TRIM, CONCAT_WS or GREATEST.\n\
         2. Limit result size with TOP (n) or ORDER BY ... OFFSET/FETCH, not LIMIT.\n\
         3. Quote identifiers with brackets: [schema].[table].[column].\n\
         4. Qualify tables with their schema (default schema is dbo).\n\
         5. Pass literal values as parameters (@P1, @P2, ...) instead of\n\
         \x20  concatenating them into the SQL text.\n\
         6. Use get_table_structure to check column names and types before querying.\n",
    );

    if server.is_read_only() {
        text.push_str(
            "7. This server is read-only: only a single SELECT (or WITH ... SELECT)\n\
             \x20  statement is accepted. INSERT, UPDATE, DELETE, DDL, EXEC and\n\
             \x20  SELECT ... INTO are rejected.\n",
        );
    }

    if let Some(db) = server.current_database() {
        text.push_str(&format!("\nConnected database: {}\n", db));
    }

    text.push_str(&format!(
        "Rows per result are capped at {}.\n",
        server.bridge().max_rows()
    ));

    text
}

fn create_resource(uri: &str, name: &str, description: &str, mime_type: &str) -> Resource {
    let mut resource = RawResource::new(uri, name);
    resource.description = Some(description.to_string());
    resource.mime_type = Some(mime_type.to_string());
    resource.no_annotation()
}
