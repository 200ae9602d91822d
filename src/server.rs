//! MCP server struct definition and initialization.

use crate::bridge::QueryBridge;
use crate::config::Config;
use crate::database::{create_backend, SqlBackend};
use crate::error::ServerError;
use crate::security::ValidationMode;
use rmcp::handler::server::router::tool::ToolRouter;
use std::sync::Arc;

/// The MSSQL MCP Server instance.
///
/// This struct is cloned for each request, but the inner state
/// is shared via Arc. The server provides:
///
/// - **Tools**: Query execution, table structure, listings, health
/// - **Resources**: SQL authoring guidelines
/// - **Prompts**: Greeting and query-authoring templates
#[derive(Clone)]
pub struct JeweiMcpServer {
    /// Query bridge shared by all tools.
    pub(crate) bridge: Arc<QueryBridge>,

    /// Configuration.
    pub(crate) config: Arc<Config>,

    /// Tool router for dispatching tool calls.
    pub(crate) tool_router: ToolRouter<Self>,
}

impl JeweiMcpServer {
    /// Create a server connected to SQL Server.
    ///
    /// Connectivity is verified with `SELECT 1` before returning.
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let backend = create_backend(&config.database, config.query.timeout).await?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Create a server over an existing backend.
    pub fn with_backend(config: Config, backend: Arc<dyn SqlBackend>) -> Self {
        let bridge = Arc::new(QueryBridge::new(backend, &config));

        Self {
            bridge,
            config: Arc::new(config),
            tool_router: crate::tools::create_tool_router(),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the query bridge.
    pub fn bridge(&self) -> &QueryBridge {
        &self.bridge
    }

    /// Get the configured database name, if any.
    pub fn current_database(&self) -> Option<&str> {
        self.config.current_database()
    }

    /// Whether only read statements are accepted.
    pub fn is_read_only(&self) -> bool {
        self.bridge.validation_mode() == ValidationMode::ReadOnly
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{
        Credentials, DatabaseConfig, QueryConfig, SecurityConfig, ServerConfig,
    };
    use crate::database::{QueryResult, SqlParam};
    use crate::transport::{HttpConfig, TransportType};
    use async_trait::async_trait;
    use std::time::Duration;

    pub(crate) fn test_config() -> Config {
        Config {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: Some("master".to_string()),
                credentials: Credentials {
                    username: "sa".to_string(),
                    password: "test".to_string(),
                },
                encrypt: false,
                trust_server_certificate: true,
                application_name: "test".to_string(),
                connect_timeout: Duration::from_secs(5),
                connection_recycle: Duration::from_secs(3600),
            },
            security: SecurityConfig {
                validation_mode: ValidationMode::ReadOnly,
                max_query_length: 100_000,
                max_result_rows: 1000,
            },
            query: QueryConfig {
                timeout: Duration::from_secs(30),
            },
            server: ServerConfig {
                name: "test-server".to_string(),
                transport: TransportType::Stdio,
                http: HttpConfig::default(),
            },
        }
    }

    /// Backend that answers every query with an empty result.
    pub(crate) struct EmptyBackend;

    #[async_trait]
    impl SqlBackend for EmptyBackend {
        async fn query(
            &self,
            _sql: &str,
            _params: &[SqlParam],
            _max_rows: usize,
        ) -> Result<QueryResult, ServerError> {
            Ok(QueryResult::empty())
        }
    }

    pub(crate) fn test_server() -> JeweiMcpServer {
        JeweiMcpServer::with_backend(test_config(), Arc::new(EmptyBackend))
    }

    #[test]
    fn test_server_accessors() {
        let server = test_server();
        assert_eq!(server.current_database(), Some("master"));
        assert!(server.is_read_only());
        assert_eq!(server.bridge().max_rows(), 1000);
    }
}
