//! Configuration management for the MSSQL MCP Server.
//!
//! Configuration is loaded once at startup from environment variables (and an
//! optional `.env` file) following the 12-factor app pattern. Every `DB_*`
//! variable also accepts its `MSSQL_*` alias.

use crate::constants::{
    APPLICATION_NAME, DEFAULT_CONNECTION_RECYCLE_SECS, DEFAULT_CONNECTION_TIMEOUT_SECS,
    DEFAULT_HTTP_HOST, DEFAULT_HTTP_PATH, DEFAULT_HTTP_PORT, DEFAULT_MAX_QUERY_LENGTH,
    DEFAULT_MAX_RESULT_ROWS, DEFAULT_PORT, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_SERVER_NAME,
};
use crate::error::ServerError;
use crate::security::ValidationMode;
use crate::transport::{HttpConfig, TransportType};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Database connection configuration
    pub database: DatabaseConfig,

    /// Security configuration
    pub security: SecurityConfig,

    /// Query execution configuration
    pub query: QueryConfig,

    /// MCP server identity and transport
    pub server: ServerConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
    /// SQL Server hostname or IP address
    pub host: String,

    /// SQL Server port (default: 1433)
    pub port: u16,

    /// Database name (None uses the login's default database)
    pub database: Option<String>,

    /// SQL Server login
    pub credentials: Credentials,

    /// Require TLS encryption
    pub encrypt: bool,

    /// Trust server certificate (for self-signed certs)
    pub trust_server_certificate: bool,

    /// Application name sent to SQL Server
    pub application_name: String,

    /// TCP connect and login timeout
    pub connect_timeout: Duration,

    /// Age after which the cached connection is replaced
    pub connection_recycle: Duration,
}

/// SQL Server authentication credentials.
///
/// The password is never serialized and is redacted from `Debug` output.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Security configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityConfig {
    /// Query validation mode
    pub validation_mode: ValidationMode,

    /// Maximum query length (bytes)
    pub max_query_length: usize,

    /// Maximum result rows per query
    pub max_result_rows: usize,
}

/// Query execution configuration.
#[derive(Debug, Clone, Serialize)]
pub struct QueryConfig {
    /// Query timeout
    pub timeout: Duration,
}

/// MCP server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Name reported in the MCP handshake
    pub name: String,

    /// Transport to serve on
    pub transport: TransportType,

    /// HTTP transport settings (used when `transport` is http)
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Environment Variables
    ///
    /// ## Required
    /// - `DB_HOST`: SQL Server hostname
    /// - `DB_USER`: SQL Server login
    /// - `DB_PASSWORD`: SQL Server password
    ///
    /// ## Optional
    /// - `DB_PORT`: Port number (default: 1433)
    /// - `DB_NAME`: Database name
    /// - `DB_ENCRYPT`: Require TLS (default: false)
    /// - `DB_TRUST_CERT`: Trust server certificate (default: true)
    /// - `DB_CONNECT_TIMEOUT`: Connection timeout in seconds (default: 30)
    /// - `DB_QUERY_TIMEOUT`: Query timeout in seconds (default: 30)
    /// - `DB_CONNECTION_RECYCLE`: Connection max age in seconds (default: 3600)
    /// - `MCP_VALIDATION_MODE`: readonly or unrestricted (default: readonly)
    /// - `MCP_MAX_ROWS`: Maximum result rows (default: 10000)
    /// - `MCP_MAX_QUERY_LENGTH`: Maximum query length in bytes (default: 1000000)
    /// - `MCP_SERVER_NAME`: Server name reported to clients
    /// - `MCP_TRANSPORT`: stdio or http (default: stdio)
    /// - `MCP_HTTP_HOST`, `MCP_HTTP_PORT`, `MCP_HTTP_PATH`: HTTP bind settings
    pub fn from_env() -> Result<Self, ServerError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ServerError::config(format!("Failed to read .env: {}", e))),
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let host = env.require(&["DB_HOST", "MSSQL_HOST"])?;
        let username = env.require(&["DB_USER", "MSSQL_USER"])?;
        let password = env.require_raw(&["DB_PASSWORD", "MSSQL_PASSWORD"])?;

        let port = env.parse(&["DB_PORT", "MSSQL_PORT"], DEFAULT_PORT)?;
        let database = env.get(&["DB_NAME", "MSSQL_DATABASE"]);

        let encrypt = env.flag(&["DB_ENCRYPT", "MSSQL_ENCRYPT"], false)?;
        let trust_server_certificate = env.flag(&["DB_TRUST_CERT", "MSSQL_TRUST_CERT"], true)?;

        let connect_timeout_secs: u64 = env.parse(
            &["DB_CONNECT_TIMEOUT", "MSSQL_CONNECT_TIMEOUT"],
            DEFAULT_CONNECTION_TIMEOUT_SECS,
        )?;
        let query_timeout_secs: u64 = env.parse(
            &["DB_QUERY_TIMEOUT", "MSSQL_QUERY_TIMEOUT"],
            DEFAULT_QUERY_TIMEOUT_SECS,
        )?;
        let recycle_secs: u64 = env.parse(
            &["DB_CONNECTION_RECYCLE", "MSSQL_CONNECTION_RECYCLE"],
            DEFAULT_CONNECTION_RECYCLE_SECS,
        )?;

        let validation_mode = env.parse(
            &["MCP_VALIDATION_MODE", "MSSQL_VALIDATION_MODE"],
            ValidationMode::ReadOnly,
        )?;
        let max_result_rows: usize =
            env.parse(&["MCP_MAX_ROWS", "MSSQL_MAX_ROWS"], DEFAULT_MAX_RESULT_ROWS)?;
        let max_query_length: usize =
            env.parse(&["MCP_MAX_QUERY_LENGTH"], DEFAULT_MAX_QUERY_LENGTH)?;

        if query_timeout_secs == 0 || connect_timeout_secs == 0 {
            return Err(ServerError::config("Timeouts must be greater than zero"));
        }
        if max_result_rows == 0 {
            return Err(ServerError::config("MCP_MAX_ROWS must be greater than zero"));
        }

        let name = env
            .get(&["MCP_SERVER_NAME"])
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());
        let transport = env.parse(&["MCP_TRANSPORT"], TransportType::Stdio)?;
        #[cfg(not(feature = "http"))]
        if transport == TransportType::Http {
            return Err(ServerError::config(
                "MCP_TRANSPORT=http requires a build with the `http` feature",
            ));
        }
        let http = HttpConfig {
            host: env
                .get(&["MCP_HTTP_HOST"])
                .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            port: env.parse(&["MCP_HTTP_PORT"], DEFAULT_HTTP_PORT)?,
            path: env
                .get(&["MCP_HTTP_PATH"])
                .unwrap_or_else(|| DEFAULT_HTTP_PATH.to_string()),
        };

        Ok(Config {
            database: DatabaseConfig {
                host,
                port,
                database,
                credentials: Credentials { username, password },
                encrypt,
                trust_server_certificate,
                application_name: APPLICATION_NAME.to_string(),
                connect_timeout: Duration::from_secs(connect_timeout_secs),
                connection_recycle: Duration::from_secs(recycle_secs),
            },
            security: SecurityConfig {
                validation_mode,
                max_query_length,
                max_result_rows,
            },
            query: QueryConfig {
                timeout: Duration::from_secs(query_timeout_secs),
            },
            server: ServerConfig {
                name,
                transport,
                http,
            },
        })
    }

    /// Get the configured database name, if any.
    pub fn current_database(&self) -> Option<&str> {
        self.database.database.as_deref()
    }
}

/// Variable lookup with alias and parse helpers.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// First non-empty value among `keys`, with the matching key.
    fn get_with_key(&self, keys: &[&'static str]) -> Option<(&'static str, String)> {
        keys.iter().find_map(|key| {
            (self.lookup)(*key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (*key, v))
        })
    }

    fn get(&self, keys: &[&'static str]) -> Option<String> {
        self.get_with_key(keys).map(|(_, v)| v)
    }

    fn require(&self, keys: &[&'static str]) -> Result<String, ServerError> {
        self.get(keys).ok_or_else(|| {
            ServerError::config(format!("{} environment variable is required", keys[0]))
        })
    }

    /// Like [`Env::require`] but keeps surrounding whitespace, for secrets.
    fn require_raw(&self, keys: &[&'static str]) -> Result<String, ServerError> {
        keys.iter()
            .find_map(|key| (self.lookup)(*key).filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                ServerError::config(format!("{} environment variable is required", keys[0]))
            })
    }

    fn parse<T>(&self, keys: &[&'static str], default: T) -> Result<T, ServerError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get_with_key(keys) {
            Some((key, raw)) => raw
                .parse()
                .map_err(|e| ServerError::config(format!("Invalid value for {}: {}", key, e))),
            None => Ok(default),
        }
    }

    fn flag(&self, keys: &[&'static str], default: bool) -> Result<bool, ServerError> {
        match self.get_with_key(keys) {
            Some((key, raw)) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ServerError::config(format!(
                    "Invalid value for {}: expected true or false, got '{}'",
                    key, raw
                ))),
            },
            None => Ok(default),
        }
    }
}
