//! MCP Prompts.
//!
//! - `introduction`: a short greeting exchange.
//! - `query-table`: a SELECT authoring prompt carrying the table's columns.

use crate::constants::DEFAULT_SCHEMA;
use crate::database::ColumnDetail;
use crate::error::ServerError;
use crate::security::TableName;
use crate::server::JeweiMcpServer;
use rmcp::model::{
    GetPromptResult, Prompt, PromptArgument, PromptMessage, PromptMessageContent,
    PromptMessageRole,
};
use std::collections::HashMap;

/// Create a prompt argument helper.
fn prompt_arg(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        required: Some(required),
    }
}

/// Create a prompt helper.
fn prompt(name: &str, description: &str, arguments: Vec<PromptArgument>) -> Prompt {
    Prompt {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        arguments: Some(arguments),
        icons: None,
        meta: None,
    }
}

fn user_message(text: String) -> PromptMessage {
    PromptMessage {
        role: PromptMessageRole::User,
        content: PromptMessageContent::text(text),
    }
}

/// Build the list of available prompts.
pub fn build_prompt_list() -> Vec<Prompt> {
    vec![
        prompt(
            "introduction",
            "Greet the user and introduce what this server can do",
            vec![prompt_arg("user_name", "Name to greet", false)],
        ),
        prompt(
            "query-table",
            "Write a SELECT query for a table, given its column list",
            vec![
                prompt_arg("table", "Table name, optionally schema-qualified", true),
                prompt_arg("schema", "Schema name (default: dbo)", false),
            ],
        ),
    ]
}

/// Get a specific prompt with arguments filled in.
pub async fn get_prompt(
    server: &JeweiMcpServer,
    name: &str,
    arguments: Option<&HashMap<String, String>>,
) -> Result<GetPromptResult, ServerError> {
    let args = arguments.cloned().unwrap_or_default();

    match name {
        "introduction" => Ok(introduction_prompt(server, &args)),
        "query-table" => query_table_prompt(server, &args).await,
        _ => Err(ServerError::invalid_input(format!("Unknown prompt: {}", name))),
    }
}

fn introduction_prompt(server: &JeweiMcpServer, args: &HashMap<String, String>) -> GetPromptResult {
    let user = args
        .get("user_name")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("there");

    let database = server.current_database().unwrap_or("the default database");

    let text = format!(
        "Hi {user}! Please introduce yourself as my SQL Server assistant in a friendly way. \
         Mention that you can list tables, describe table structures and run {mode} queries \
         against {database}. Keep it to a few sentences and feel free to add an emoji. 👋",
        mode = if server.is_read_only() { "read-only" } else { "SQL" },
    );

    GetPromptResult {
        description: Some(format!("Introduction for {}", user)),
        messages: vec![user_message(text)],
    }
}

async fn query_table_prompt(
    server: &JeweiMcpServer,
    args: &HashMap<String, String>,
) -> Result<GetPromptResult, ServerError> {
    let table = args
        .get("table")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::invalid_input("Missing required argument: table"))?;
    let schema = args
        .get("schema")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SCHEMA);

    let structure = server.bridge.describe_table(table, Some(schema)).await?;
    let name = TableName {
        schema: structure.schema.clone(),
        table: structure.table.clone(),
    };

    let schema_desc = structure
        .columns
        .iter()
        .map(|c| {
            let mut line = format!(
                "  - {} ({}{})",
                c.column_name,
                display_type(c),
                if c.is_nullable { ", nullable" } else { "" }
            );
            if structure.primary_keys.contains(&c.column_name) {
                line.push_str(" [PK]");
            }
            if !c.description.is_empty() {
                line.push_str(&format!(": {}", c.description));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");

    let text = format!(
        r#"Write a SELECT query against {quoted}.

## Table Schema

{schema_desc}

## Guidelines
- The query must run on SQL Server 2016 (T-SQL)
- Use bracket notation for identifiers: [schema].[table].[column]
- Limit rows with TOP (n) or OFFSET/FETCH
- Include ORDER BY for deterministic results
- Pass literal values as @P1, @P2, ... parameters
"#,
        quoted = name.quoted(),
    );

    Ok(GetPromptResult {
        description: Some(format!("Query builder for {}", name)),
        messages: vec![user_message(text)],
    })
}

/// Render a column type with its length or precision, e.g. `nvarchar(50)`.
fn display_type(column: &ColumnDetail) -> String {
    let ty = column.data_type.as_str();
    match ty.to_lowercase().as_str() {
        "varchar" | "char" | "varbinary" | "binary" => match column.max_length {
            Some(-1) => format!("{}(max)", ty),
            Some(n) => format!("{}({})", ty, n),
            None => ty.to_string(),
        },
        // sys.columns reports byte lengths
        "nvarchar" | "nchar" => match column.max_length {
            Some(-1) => format!("{}(max)", ty),
            Some(n) => format!("{}({})", ty, n / 2),
            None => ty.to_string(),
        },
        "decimal" | "numeric" => match (column.precision, column.scale) {
            (Some(p), Some(s)) => format!("{}({},{})", ty, p, s),
            _ => ty.to_string(),
        },
        _ => ty.to_string(),
    }
}
