//! The query bridge: validates tool requests and forwards them to a SQL backend.
//!
//! Every call is independent. Driver failures come back as [`ServerError`]
//! values and never terminate the process.

use crate::config::Config;
use crate::constants::{DEFAULT_SCHEMA, LOG_SQL_PREVIEW_CHARS};
use crate::database::{
    truncate_for_log, DatabaseInfo, MetadataQueries, QueryResult, SqlBackend, SqlParam,
    TableStructure, TableSummary,
};
use crate::error::ServerError;
use crate::security::{parse_table_name, validate_identifier, QueryValidator, ValidationMode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A raw SQL request.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub max_rows: Option<usize>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }
}

/// Tables in one schema.
#[derive(Debug, Clone, Serialize)]
pub struct TableList {
    pub schema: String,
    pub tables: Vec<TableSummary>,
    pub count: usize,
}

/// Connection details safe to show to clients. Never carries the password.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: String,
}

/// Database information plus the connection it was read over.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseOverview {
    #[serde(flatten)]
    pub info: DatabaseInfo,
    pub connection: ConnectionSummary,
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Request/response bridge between MCP tools and SQL Server.
pub struct QueryBridge {
    backend: Arc<dyn SqlBackend>,
    metadata: MetadataQueries,
    validator: QueryValidator,
    max_rows: usize,
    max_query_length: usize,
    connection: ConnectionSummary,
}

impl QueryBridge {
    /// Create a bridge over `backend` with limits taken from `config`.
    pub fn new(backend: Arc<dyn SqlBackend>, config: &Config) -> Self {
        Self {
            metadata: MetadataQueries::new(Arc::clone(&backend)),
            backend,
            validator: QueryValidator::new(config.security.validation_mode),
            max_rows: config.security.max_result_rows,
            max_query_length: config.security.max_query_length,
            connection: ConnectionSummary {
                host: config.database.host.clone(),
                port: config.database.port,
                database: config.database.database.clone(),
                user: config.database.credentials.username.clone(),
            },
        }
    }

    /// Current validation mode.
    pub fn validation_mode(&self) -> ValidationMode {
        self.validator.mode()
    }

    /// Configured row cap.
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Execute a raw statement in one round trip.
    ///
    /// The SQL text is passed to the server as given; it is only checked,
    /// never rewritten.
    pub async fn execute_query(&self, request: QueryRequest) -> Result<QueryResult, ServerError> {
        let sql = request.sql.as_str();

        if sql.trim().is_empty() {
            return Err(ServerError::invalid_input("SQL text must not be empty"));
        }

        if sql.len() > self.max_query_length {
            return Err(ServerError::validation(format!(
                "Query exceeds maximum length of {} bytes",
                self.max_query_length
            )));
        }

        let max_rows = match request.max_rows {
            Some(0) => {
                return Err(ServerError::invalid_input("max_rows must be greater than zero"))
            }
            Some(requested) => requested.min(self.max_rows),
            None => self.max_rows,
        };

        if let Err(e) = self.validator.validate(sql) {
            warn!(
                sql = %truncate(sql),
                error = %e,
                "Rejected query"
            );
            return Err(e);
        }

        info!(
            sql = %truncate(sql),
            params = request.params.len(),
            max_rows,
            "Executing query"
        );

        let mut result = self.backend.query(sql, &request.params, max_rows).await?;
        result.limit_rows(max_rows);

        debug!(
            rows = result.row_count(),
            truncated = result.truncated,
            "Query returned"
        );

        Ok(result)
    }

    /// Describe a table's columns, keys and indexes.
    ///
    /// `table_name` may be schema-qualified, which overrides `schema`.
    pub async fn describe_table(
        &self,
        table_name: &str,
        schema: Option<&str>,
    ) -> Result<TableStructure, ServerError> {
        let name = parse_table_name(table_name, schema.unwrap_or(DEFAULT_SCHEMA))?;
        info!(table = %name, "Describing table");

        self.metadata.describe_table(&name.schema, &name.table).await
    }

    /// List the tables in a schema (default `dbo`).
    pub async fn list_tables(&self, schema: Option<&str>) -> Result<TableList, ServerError> {
        let schema = schema
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCHEMA);
        validate_identifier(schema)?;
        info!(schema, "Listing tables");

        let tables = self.metadata.list_tables(schema).await?;
        Ok(TableList {
            schema: schema.to_string(),
            count: tables.len(),
            tables,
        })
    }

    /// Database name, server version, schemas and connection details.
    pub async fn database_info(&self) -> Result<DatabaseOverview, ServerError> {
        info!("Reading database info");
        let info = self.metadata.database_info().await?;
        Ok(DatabaseOverview {
            info,
            connection: self.connection.clone(),
        })
    }

    /// Probe the server with `SELECT 1`.
    pub async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        let outcome = self.backend.ping().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => HealthStatus {
                status: "healthy",
                latency_ms,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "Health check failed");
                HealthStatus {
                    status: "unhealthy",
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn truncate(sql: &str) -> String {
    truncate_for_log(sql, LOG_SQL_PREVIEW_CHARS)
}
