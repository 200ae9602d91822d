//! Tool input types with JSON Schema generation.

use crate::constants::DEFAULT_SCHEMA;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured JSON (default).
    #[default]
    Json,
    /// Markdown table format.
    Table,
    /// CSV format.
    Csv,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

/// Input for the `query_sql` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QuerySqlInput {
    /// The SQL statement to execute.
    #[schemars(description = "T-SQL SELECT statement to execute (SQL Server 2016 syntax)")]
    pub sql: String,

    /// Positional parameters.
    #[serde(default)]
    #[schemars(
        description = "Optional positional parameters, referenced in the SQL as @P1, @P2, ... in order"
    )]
    pub params: Vec<Value>,

    /// Maximum number of rows to return.
    #[serde(default)]
    #[schemars(description = "Maximum number of rows to return (default: server configured limit)")]
    pub max_rows: Option<usize>,

    /// Output format for query results.
    #[serde(default)]
    #[schemars(description = "Output format: 'json', 'table' (markdown) or 'csv' (default: json)")]
    pub format: OutputFormat,
}

/// Input for the `get_table_structure` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableStructureInput {
    /// Table name, optionally schema-qualified.
    #[schemars(description = "Table name, e.g. 'Orders' or 'sales.Orders'")]
    pub table_name: String,

    /// Schema name.
    #[serde(default = "default_schema")]
    #[schemars(description = "Schema name (default: dbo); ignored if table_name is qualified")]
    pub schema: String,
}

/// Input for the `list_tables` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema name.
    #[serde(default = "default_schema")]
    #[schemars(description = "Schema name (default: dbo)")]
    pub schema: String,
}

impl Default for ListTablesInput {
    fn default() -> Self {
        Self {
            schema: default_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_format_names() {
        let input: QuerySqlInput =
            serde_json::from_value(json!({"sql": "SELECT 1", "format": "csv"})).unwrap();
        assert_eq!(input.format, OutputFormat::Csv);
        assert!(serde_json::from_value::<OutputFormat>(json!("xml")).is_err());
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
    }

    #[test]
    fn test_query_input_defaults() {
        let input: QuerySqlInput = serde_json::from_value(json!({"sql": "SELECT 1"})).unwrap();
        assert!(input.params.is_empty());
        assert_eq!(input.max_rows, None);
        assert_eq!(input.format, OutputFormat::Json);
    }

    #[test]
    fn test_schema_defaults_to_dbo() {
        let input: TableStructureInput =
            serde_json::from_value(json!({"table_name": "Users"})).unwrap();
        assert_eq!(input.schema, "dbo");

        let input: ListTablesInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(input.schema, "dbo");
    }
}
