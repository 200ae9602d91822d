//! Centralized constants for the MSSQL MCP Server.
//!
//! Default values and fixed names used throughout the codebase.

// =============================================================================
// Connection Constants
// =============================================================================

/// Default SQL Server port.
pub const DEFAULT_PORT: u16 = 1433;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default age after which a cached connection is replaced, in seconds.
pub const DEFAULT_CONNECTION_RECYCLE_SECS: u64 = 3600;

/// Application name reported to SQL Server.
pub const APPLICATION_NAME: &str = "jewei-mssql-mcp-server";

// =============================================================================
// Query Constants
// =============================================================================

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default maximum result rows.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 10_000;

/// Default maximum query length in bytes.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 1_000_000;

/// Schema used when a tool call does not name one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Number of characters of SQL text kept in log lines.
pub const LOG_SQL_PREVIEW_CHARS: usize = 100;

// =============================================================================
// Server Constants
// =============================================================================

/// Default MCP server name reported during initialization.
pub const DEFAULT_SERVER_NAME: &str = "jewei-mssql-mcp-server";

/// Default bind host for the HTTP transport.
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Default bind port for the HTTP transport.
pub const DEFAULT_HTTP_PORT: u16 = 9000;

/// Default mount path for the HTTP transport.
pub const DEFAULT_HTTP_PATH: &str = "/mcp";

// =============================================================================
// Resource Constants
// =============================================================================

/// URI of the SQL authoring guidelines resource.
pub const SQL_GUIDELINES_URI: &str = "data://sql_describe";
