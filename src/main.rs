//! Jewei MSSQL MCP Server entry point.
//!
//! Serves over stdio by default, or streamable HTTP when `MCP_TRANSPORT=http`
//! and the `http` feature is enabled.

use anyhow::Result;
use jewei_mssql_mcp_server::transport;
use jewei_mssql_mcp_server::{Config, JeweiMcpServer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Jewei MSSQL MCP Server starting"
    );

    let config = Config::from_env().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    info!(
        host = %config.database.host,
        port = config.database.port,
        database = config.current_database().unwrap_or("<default>"),
        mode = %config.security.validation_mode,
        transport = %config.server.transport,
        "Configuration loaded"
    );

    // Connectivity is verified here; failure is fatal.
    let server = JeweiMcpServer::new(config.clone())
        .await
        .inspect_err(|e| error!(kind = %e.kind(), error = %e, "Failed to connect to SQL Server"))?;
    info!("Server initialized, ready to accept requests");

    transport::serve(server, &config.server).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing to stderr (stdout carries JSON-RPC on stdio).
///
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// structured output.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,jewei_mssql_mcp_server=info"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
}
