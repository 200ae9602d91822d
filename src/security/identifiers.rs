//! SQL Server identifier parsing and escaping.
//!
//! Uses SQL Server's bracket notation `[identifier]` to escape identifiers.

use crate::error::ServerError;
use std::fmt;

/// Maximum length for SQL Server identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// A schema-qualified table name with delimiters removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: String,
    pub table: String,
}

impl TableName {
    /// Bracket-quoted `[schema].[table]` form for embedding in SQL text.
    pub fn quoted(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Quote a single identifier with brackets, doubling embedded `]`.
///
/// ```
/// use jewei_mssql_mcp_server::security::quote_identifier;
///
/// assert_eq!(quote_identifier("Users"), "[Users]");
/// assert_eq!(quote_identifier("Table[1]"), "[Table[1]]]");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Validate a single unquoted identifier.
pub fn validate_identifier(identifier: &str) -> Result<(), ServerError> {
    if identifier.trim().is_empty() {
        return Err(ServerError::invalid_input("Identifier cannot be empty"));
    }

    if identifier.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(ServerError::invalid_input(format!(
            "Identifier exceeds maximum length of {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }

    if identifier.chars().any(char::is_control) {
        return Err(ServerError::invalid_input(
            "Identifier contains control characters",
        ));
    }

    Ok(())
}

/// Parse a table name that may be schema-qualified.
///
/// Accepts `Users`, `dbo.Users`, `[dbo].[My.Table]` and `"dbo"."Users"`.
/// An explicit schema in `name` wins over `default_schema`.
pub fn parse_table_name(name: &str, default_schema: &str) -> Result<TableName, ServerError> {
    let parts = split_qualified(name.trim())?;

    let (schema, table) = match parts.as_slice() {
        [table] => (default_schema.trim().to_string(), table.clone()),
        [schema, table] => (schema.clone(), table.clone()),
        _ => {
            return Err(ServerError::invalid_input(format!(
                "Invalid table name '{}': expected 'table' or 'schema.table'",
                name
            )))
        }
    };

    validate_identifier(&schema)?;
    validate_identifier(&table)?;

    Ok(TableName { schema, table })
}

/// Split a dotted name into parts, honouring bracket and quote delimiters.
fn split_qualified(name: &str) -> Result<Vec<String>, ServerError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' | '"' if current.trim().is_empty() => {
                let close = if c == '[' { ']' } else { '"' };
                current.clear();
                loop {
                    match chars.next() {
                        Some(ch) if ch == close => {
                            if chars.peek() == Some(&close) {
                                chars.next();
                                current.push(close);
                            } else {
                                break;
                            }
                        }
                        Some(ch) => current.push(ch),
                        None => {
                            return Err(ServerError::invalid_input(format!(
                                "Unterminated delimited identifier in '{}'",
                                name
                            )))
                        }
                    }
                }
            }
            '.' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    Ok(parts.into_iter().map(|p| p.trim().to_string()).collect())
}
