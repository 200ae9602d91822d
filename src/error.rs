//! Error types for the MSSQL MCP Server.
//!
//! This module defines semantic error types with SQL Server error code mapping
//! for user-friendly error messages.

use rmcp::ErrorData;
use serde::Serialize;
use thiserror::Error;

/// Domain-specific errors for the MSSQL MCP Server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Object not found (table, schema, database, etc.)
    #[error("{object_type} not found: {name}")]
    ObjectNotFound { object_type: String, name: String },

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Query rejected before reaching the database
    #[error("Query validation failed: {0}")]
    ValidationFailed(String),

    /// Query execution error
    #[error("Query execution error: {message}")]
    QueryExecution {
        message: String,
        sql_error_code: Option<u32>,
    },

    /// Query timeout
    #[error("Query timeout: operation exceeded {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error category exposed to MCP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Connection,
    Authentication,
    NotFound,
    PermissionDenied,
    Validation,
    Query,
    Timeout,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    /// Stable string form used in tool error payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connection => "connection",
            ErrorKind::Authentication => "authentication",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Validation => "validation",
            ErrorKind::Query => "query",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an object not found error.
    pub fn object_not_found(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            object_type: object_type.into(),
            name: name.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Create a query execution error.
    pub fn query_error(msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error with the SQL Server error number.
    pub fn query_error_with_code(msg: impl Into<String>, code: u32) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create a timeout error.
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout {
            timeout_seconds: seconds,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::ObjectNotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::ValidationFailed(_) => ErrorKind::Validation,
            Self::QueryExecution { .. } => ErrorKind::Query,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is transient and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            Self::QueryExecution {
                sql_error_code: Some(code),
                ..
            } => is_transient_sql_error(*code),
            _ => false,
        }
    }

    /// Whether the connection that produced this error should be discarded.
    pub fn poisons_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check your environment variables or .env file"),
            Self::Connection { .. } => {
                Some("Check server hostname, port, and network connectivity")
            }
            Self::Authentication(_) => Some("Verify DB_USER and DB_PASSWORD are correct"),
            Self::ObjectNotFound { .. } => Some("Check the object name and schema"),
            Self::PermissionDenied(_) => {
                Some("Request appropriate permissions from your database administrator")
            }
            Self::ValidationFailed(_) => {
                Some("Only read-only SELECT statements are accepted in read-only mode")
            }
            Self::Timeout { .. } => Some("Try a simpler query or add a TOP clause"),
            Self::QueryExecution {
                sql_error_code: Some(102),
                ..
            } => Some("Check the statement for T-SQL syntax errors"),
            _ => None,
        }
    }

    /// Build the structured payload returned to MCP clients.
    pub fn to_payload(&self) -> ErrorPayload {
        let sql_error_code = match self {
            Self::QueryExecution { sql_error_code, .. } => *sql_error_code,
            _ => None,
        };

        ErrorPayload {
            error: self.to_string(),
            kind: self.kind(),
            sql_error_code,
            suggestion: self.suggestion(),
            transient: self.is_transient(),
        }
    }
}

/// Structured error body carried by failed tool results.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_error_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
    pub transient: bool,
}

/// Map SQL Server error numbers to semantic ServerError types.
pub fn from_sql_error(code: u32, message: &str) -> ServerError {
    match code {
        // Authentication errors
        18456 => ServerError::auth(format!("Login failed: {}", message)),
        18452 => ServerError::auth(format!("Untrusted login: {}", message)),

        // Database cannot be opened
        4060 => ServerError::object_not_found("Database", message),

        // Object not found errors
        208 => ServerError::object_not_found("Object", message),
        2812 => ServerError::object_not_found("Stored procedure", message),
        15151 => ServerError::object_not_found("Object", message),

        // Permission errors
        229 | 230 | 262 | 297 => ServerError::permission_denied(message),

        // Syntax errors
        102 | 156 | 105 => {
            ServerError::query_error_with_code(format!("Syntax error: {}", message), code)
        }

        // Invalid column/object
        207 => ServerError::query_error_with_code(format!("Invalid column: {}", message), code),

        // Deadlock
        1205 => ServerError::query_error_with_code(
            "Transaction was deadlocked and has been rolled back",
            code,
        ),

        // Default: generic query error
        _ => ServerError::query_error_with_code(message, code),
    }
}

/// Check if a SQL Server error number indicates a transient error.
fn is_transient_sql_error(code: u32) -> bool {
    matches!(
        code,
        1205    // Deadlock
        | 10053 // Connection forcibly closed
        | 10054 // Connection reset
        | 10060 // Connection timed out
        | 40197 // Azure: service error
        | 40501 // Azure: service busy
        | 40613 // Azure: database unavailable
        | 49918 // Azure: not enough resources
        | 49919 // Azure: too many requests
        | 49920 // Azure: too busy
    )
}

/// Convert ServerError to rmcp's ErrorData for protocol responses.
///
/// Tool failures are reported as `CallToolResult::error` instead; this is
/// used by resources and prompts.
impl From<ServerError> for ErrorData {
    fn from(e: ServerError) -> Self {
        let data = serde_json::to_value(e.to_payload()).ok();
        match e.kind() {
            ErrorKind::InvalidInput | ErrorKind::Validation => {
                ErrorData::invalid_params(e.to_string(), data)
            }
            ErrorKind::NotFound => ErrorData::resource_not_found(e.to_string(), data),
            _ => ErrorData::internal_error(e.to_string(), data),
        }
    }
}

impl From<tiberius::error::Error> for ServerError {
    fn from(e: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match e {
            Error::Server(token) => from_sql_error(token.code(), token.message()),
            Error::Io { kind, message } => {
                ServerError::connection(format!("IO error ({:?}): {}", kind, message))
            }
            Error::Tls(message) => ServerError::connection(format!("TLS error: {}", message)),
            Error::Routing { host, port } => ServerError::connection(format!(
                "Server requested routing to {}:{}",
                host, port
            )),
            Error::Protocol(message) => {
                ServerError::connection(format!("Protocol error: {}", message))
            }
            Error::Conversion(message) => {
                ServerError::query_error(format!("Type conversion error: {}", message))
            }
            other => ServerError::query_error(other.to_string()),
        }
    }
}
