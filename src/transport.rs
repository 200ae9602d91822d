//! Transport layer for the MCP server.
//!
//! - stdio: Standard input/output (default, for desktop MCP clients)
//! - http: MCP streamable HTTP served with axum
//!
//! The HTTP transport requires the `http` feature flag. Selecting it in a
//! build without the feature is a configuration error.

use crate::config::ServerConfig;
use crate::constants::{DEFAULT_HTTP_HOST, DEFAULT_HTTP_PATH, DEFAULT_HTTP_PORT};
use crate::server::JeweiMcpServer;
use rmcp::ServiceExt;
use serde::Serialize;
use tracing::{error, info};

/// Available transport types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Standard input/output transport (default).
    #[default]
    Stdio,

    /// Streamable HTTP transport.
    Http,
}

/// Error returned when parsing a transport type fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTransportTypeError(String);

impl std::fmt::Display for ParseTransportTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transport type: '{}' (expected stdio or http)", self.0)
    }
}

impl std::error::Error for ParseTransportTypeError {}

impl std::str::FromStr for TransportType {
    type Err = ParseTransportTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" | "standard" | "io" => Ok(TransportType::Stdio),
            "http" | "streamable-http" | "streamable_http" => Ok(TransportType::Http),
            _ => Err(ParseTransportTypeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Stdio => write!(f, "stdio"),
            TransportType::Http => write!(f, "http"),
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Path the MCP endpoint is mounted at.
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            path: DEFAULT_HTTP_PATH.to_string(),
        }
    }
}

impl HttpConfig {
    /// Socket address string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serve on the configured transport until the client disconnects or a
/// shutdown signal arrives.
pub async fn serve(server: JeweiMcpServer, config: &ServerConfig) -> anyhow::Result<()> {
    match config.transport {
        TransportType::Stdio => serve_stdio(server).await,
        #[cfg(feature = "http")]
        TransportType::Http => http_server::serve_http(server, &config.http).await,
        #[cfg(not(feature = "http"))]
        TransportType::Http => Err(crate::error::ServerError::config(
            "MCP_TRANSPORT=http requires a build with the `http` feature",
        )
        .into()),
    }
}

/// Serve over stdin/stdout.
pub async fn serve_stdio(server: JeweiMcpServer) -> anyhow::Result<()> {
    info!("Serving MCP over stdio");

    let service = server.serve(rmcp::transport::stdio()).await?;

    tokio::select! {
        quit_reason = service.waiting() => {
            match quit_reason {
                Ok(reason) => info!(?reason, "Service stopped"),
                Err(e) => error!(error = %e, "Service error"),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Completes on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Streamable HTTP server (only available with `http` feature).
#[cfg(feature = "http")]
pub mod http_server {
    use super::*;
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    };
    use tower_http::trace::TraceLayer;

    /// Serve the MCP endpoint at `config.path` until a shutdown signal.
    pub async fn serve_http(server: JeweiMcpServer, config: &HttpConfig) -> anyhow::Result<()> {
        let service = StreamableHttpService::new(
            move || Ok(server.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        let app = axum::Router::new()
            .nest_service(&config.path, service)
            .layer(TraceLayer::new_for_http());

        let addr = config.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("HTTP server listening on http://{}", addr);
        info!("MCP endpoint: http://{}{}", addr, config.path);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_parsing() {
        assert_eq!("stdio".parse::<TransportType>().unwrap(), TransportType::Stdio);
        assert_eq!("HTTP".parse::<TransportType>().unwrap(), TransportType::Http);
        assert!("sse2".parse::<TransportType>().is_err());
        assert_eq!(TransportType::default(), TransportType::Stdio);
        assert_eq!(TransportType::Http.to_string(), "http");
    }

    #[test]
    fn test_http_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.path, "/mcp");
    }

    #[cfg(not(feature = "http"))]
    #[tokio::test]
    async fn test_http_without_feature_is_config_error() {
        let server = crate::server::tests::test_server();
        let mut config = server.config().server.clone();
        config.transport = TransportType::Http;

        let err = serve(server, &config).await.unwrap_err();
        let err = err.downcast::<crate::error::ServerError>().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
