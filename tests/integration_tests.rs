//! Integration tests against a real SQL Server.
//!
//! These tests support two modes:
//! 1. **Testcontainers** (default): Automatically spins up a SQL Server container
//! 2. **External server**: Connect to an existing server via MSSQL_HOST env var
//!
//! ## Running with testcontainers (requires Docker):
//! ```bash
//! cargo test --test integration_tests -- --ignored --test-threads=1
//! ```
//!
//! ## Running against external server:
//! ```bash
//! MSSQL_HOST=localhost MSSQL_PORT=1433 MSSQL_PASSWORD='yourPass' \
//!   cargo test --test integration_tests -- --ignored --test-threads=1
//! ```
//!
//! Note: SQL Server container requires ~2GB RAM and takes 30-60 seconds to start.

use jewei_mssql_mcp_server::bridge::QueryRequest;
use jewei_mssql_mcp_server::tools::{OutputFormat, QuerySqlInput, TableStructureInput};
use jewei_mssql_mcp_server::{
    Config, ErrorKind, JeweiMcpServer, MssqlBackend, SqlBackend, SqlParam, SqlValue,
};
use rmcp::handler::server::wrapper::Parameters;
use serde_json::{json, Value};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::mssql_server::MssqlServer;

/// Default SA password for testcontainers.
const DEFAULT_SA_PASSWORD: &str = "yourStrong(!)Password";

/// SQL Server versions supported for testing.
pub mod versions {
    pub const SQL_SERVER_2022: &str = "2022-latest";
    pub const SQL_SERVER_2019: &str = "2019-latest";
    pub const SQL_SERVER_2017: &str = "2017-latest";

    pub const DEFAULT: &str = SQL_SERVER_2022;
}

fn get_test_version() -> String {
    std::env::var("MSSQL_TEST_VERSION").unwrap_or_else(|_| versions::DEFAULT.to_string())
}

fn use_external_server() -> bool {
    std::env::var("MSSQL_HOST").is_ok()
}

#[allow(dead_code)] // Variants held for lifetime management (Drop trait)
enum TestDatabaseSource {
    External,
    Container(Box<ContainerAsync<MssqlServer>>),
}

/// A reachable SQL Server plus the settings to reach it.
struct TestDatabase {
    #[allow(dead_code)] // Held for lifetime management (Drop trait on Container)
    source: TestDatabaseSource,
    host: String,
    port: u16,
    password: String,
}

impl TestDatabase {
    async fn new() -> Self {
        if use_external_server() {
            Self::from_external()
        } else {
            Self::from_testcontainer(&get_test_version()).await
        }
    }

    fn from_external() -> Self {
        let host = std::env::var("MSSQL_HOST").expect("MSSQL_HOST must be set");
        let port = std::env::var("MSSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(1433);
        let password =
            std::env::var("MSSQL_PASSWORD").unwrap_or_else(|_| DEFAULT_SA_PASSWORD.to_string());

        eprintln!("Using external SQL Server at {}:{}", host, port);

        Self {
            source: TestDatabaseSource::External,
            host,
            port,
            password,
        }
    }

    async fn from_testcontainer(version: &str) -> Self {
        eprintln!("Starting SQL Server {} container via testcontainers...", version);

        let container = MssqlServer::default()
            .with_accept_eula()
            .with_tag(version)
            .start()
            .await
            .unwrap_or_else(|e| panic!("Failed to start SQL Server {} container: {}", version, e));

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(1433)
            .await
            .expect("Failed to get port");

        // Wait a bit for SQL Server to fully initialize
        tokio::time::sleep(Duration::from_secs(5)).await;

        Self {
            source: TestDatabaseSource::Container(Box::new(container)),
            host: host.to_string(),
            port,
            password: DEFAULT_SA_PASSWORD.to_string(),
        }
    }

    /// Server configuration for this database, with extra variables applied.
    fn config(&self, overrides: &[(&str, &str)]) -> Config {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("DB_HOST".into(), self.host.clone());
        vars.insert("DB_PORT".into(), self.port.to_string());
        vars.insert("DB_USER".into(), "sa".into());
        vars.insert("DB_PASSWORD".into(), self.password.clone());
        vars.insert("DB_NAME".into(), "master".into());
        vars.insert("DB_TRUST_CERT".into(), "true".into());
        for (k, v) in overrides {
            vars.insert(k.to_string(), v.to_string());
        }

        Config::from_lookup(|key| vars.get(key).cloned()).expect("Invalid test config")
    }

    async fn server(&self) -> JeweiMcpServer {
        JeweiMcpServer::new(self.config(&[]))
            .await
            .expect("Failed to start server")
    }

    /// A backend without statement validation, for fixtures.
    fn admin(&self) -> MssqlBackend {
        let config = self.config(&[]);
        MssqlBackend::new(config.database, config.query.timeout)
    }
}

async fn exec(backend: &MssqlBackend, sql: &str) {
    backend
        .query(sql, &[], usize::MAX)
        .await
        .unwrap_or_else(|e| panic!("Fixture statement failed: {}\n{}", e, sql));
}

fn tool_json(result: &rmcp::model::CallToolResult) -> Value {
    let text = result.content[0].as_text().expect("text content").text.clone();
    serde_json::from_str(&text).expect("tool output is JSON")
}

// =============================================================================
// Connection Tests
// =============================================================================

mod connection_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_startup_and_health() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let status = server.bridge().health_check().await;
        assert!(status.is_healthy(), "{:?}", status);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_wrong_password_is_authentication_error() {
        let db = TestDatabase::new().await;
        let config = db.config(&[("DB_PASSWORD", "definitely-wrong")]);

        let err = JeweiMcpServer::new(config).await.err().expect("login should fail");
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_database_info() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let overview = server.bridge().database_info().await.expect("database_info");
        assert_eq!(overview.info.database_name.as_deref(), Some("master"));
        assert!(overview
            .info
            .version
            .as_deref()
            .unwrap_or_default()
            .contains("Microsoft SQL Server"));
        assert!(overview.info.schemas.iter().any(|s| s == "dbo"));
        assert!(!serde_json::to_string(&overview).unwrap().contains(&db.password));
    }
}

// =============================================================================
// Query Tests
// =============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_value_conversion() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let input = QuerySqlInput {
            sql: r#"SELECT
                CAST(42 AS INT) AS i,
                CAST(1 AS BIT) AS b,
                CAST(12.50 AS DECIMAL(10,2)) AS d,
                CAST(123.45 AS MONEY) AS m,
                CAST(-0.1 AS SMALLMONEY) AS sm,
                N'héllo' AS s,
                CAST('2024-02-29T13:45:00' AS DATETIME2) AS ts,
                CAST('2024-02-29' AS DATE) AS dt,
                CAST(0xDEADBEEF AS VARBINARY(4)) AS bin,
                CAST('6F9619FF-8B86-D011-B42D-00C04FC964FF' AS UNIQUEIDENTIFIER) AS g,
                NULL AS n"#
                .to_string(),
            params: vec![],
            max_rows: None,
            format: OutputFormat::Json,
        };

        let result = server.query_sql(Parameters(input)).await.unwrap();
        assert_ne!(result.is_error, Some(true), "{:?}", result);

        let row = &tool_json(&result)["rows"][0];
        assert_eq!(row["i"], 42);
        assert_eq!(row["b"], true);
        assert_eq!(row["d"], "12.50");
        assert_eq!(row["m"], "123.4500");
        assert_eq!(row["sm"], "-0.1000");
        assert_eq!(row["s"], "héllo");
        assert_eq!(row["ts"], "2024-02-29T13:45:00");
        assert_eq!(row["dt"], "2024-02-29");
        assert_eq!(row["bin"], "0xDEADBEEF");
        assert_eq!(
            row["g"].as_str().unwrap().to_uppercase(),
            "6F9619FF-8B86-D011-B42D-00C04FC964FF"
        );
        assert_eq!(row["n"], Value::Null);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_bound_parameters() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let request = QueryRequest {
            params: vec![SqlParam::Int(7), SqlParam::from("x'; DROP TABLE t; --")],
            ..QueryRequest::new("SELECT @P1 * 2 AS doubled, @P2 AS echoed")
        };
        let result = server.bridge().execute_query(request).await.unwrap();

        let record = result.records().next().unwrap();
        assert_eq!(record.i64("doubled"), Some(14));
        assert_eq!(record.string("echoed"), "x'; DROP TABLE t; --");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_first_result_set_and_truncation() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let request = QueryRequest {
            max_rows: Some(5),
            ..QueryRequest::new(
                "SELECT TOP (50) ROW_NUMBER() OVER (ORDER BY (SELECT NULL)) AS n \
                 FROM sys.all_objects; SELECT 'second' AS s",
            )
        };
        let result = server.bridge().execute_query(request).await.unwrap();

        assert_eq!(result.columns[0].name, "n");
        assert_eq!(result.row_count(), 5);
        assert!(result.truncated);

        // The connection is still usable after draining.
        let again = server
            .bridge()
            .execute_query(QueryRequest::new("SELECT 1 AS one"))
            .await
            .unwrap();
        assert_eq!(again.rows[0].values[0], SqlValue::I32(1));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_unnamed_and_duplicate_columns() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let result = server
            .bridge()
            .execute_query(QueryRequest::new("SELECT 1, 2 AS a, 3 AS a"))
            .await
            .unwrap();

        let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["column_1", "a", "a_2"]);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_timeout_discards_connection() {
        let db = TestDatabase::new().await;

        let backend = MssqlBackend::new(db.config(&[]).database, Duration::from_secs(1));
        let err = backend
            .query("WAITFOR DELAY '00:00:05'; SELECT 1", &[], 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        backend.ping().await.expect("reconnects after timeout");
    }
}

// =============================================================================
// Validation Tests
// =============================================================================

mod validation_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_read_only_blocks_writes() {
        let db = TestDatabase::new().await;
        let server = db.server().await;
        let admin = db.admin();
        exec(&admin, "IF OBJECT_ID('dbo.ro_guard') IS NOT NULL DROP TABLE dbo.ro_guard").await;
        exec(&admin, "CREATE TABLE dbo.ro_guard (id INT)").await;

        let input = QuerySqlInput {
            sql: "INSERT INTO dbo.ro_guard VALUES (1)".to_string(),
            params: vec![],
            max_rows: None,
            format: OutputFormat::Json,
        };
        let result = server.query_sql(Parameters(input)).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(tool_json(&result)["kind"], "validation");

        let count = admin
            .query("SELECT COUNT(*) AS c FROM dbo.ro_guard", &[], 1)
            .await
            .unwrap();
        assert_eq!(count.records().next().unwrap().i64("c"), Some(0));

        exec(&admin, "DROP TABLE dbo.ro_guard").await;
    }
}

// =============================================================================
// Session Isolation Tests
// =============================================================================

mod session_tests {
    use super::*;

    async fn unrestricted_server(db: &TestDatabase) -> JeweiMcpServer {
        JeweiMcpServer::new(db.config(&[("MCP_VALIDATION_MODE", "unrestricted")]))
            .await
            .expect("Failed to start server")
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_rowcount_does_not_carry_over() {
        let db = TestDatabase::new().await;
        let server = unrestricted_server(&db).await;
        let bridge = server.bridge();

        bridge
            .execute_query(QueryRequest::new("SELECT 1 AS one; SET ROWCOUNT 1"))
            .await
            .unwrap();

        let result = bridge
            .execute_query(QueryRequest::new("SELECT name FROM sys.databases"))
            .await
            .unwrap();
        assert!(result.row_count() >= 4, "{:?}", result);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_database_switch_does_not_carry_over() {
        let db = TestDatabase::new().await;
        let server = unrestricted_server(&db).await;
        let bridge = server.bridge();

        bridge
            .execute_query(QueryRequest::new("SELECT 1 AS one; USE tempdb"))
            .await
            .unwrap();

        let overview = bridge.database_info().await.unwrap();
        assert_eq!(overview.info.database_name.as_deref(), Some("master"));

        let result = bridge
            .execute_query(QueryRequest::new("SELECT DB_NAME() AS db"))
            .await
            .unwrap();
        assert_eq!(result.records().next().unwrap().string("db"), "master");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_open_transaction_is_rolled_back() {
        let db = TestDatabase::new().await;
        let server = unrestricted_server(&db).await;
        let admin = db.admin();
        exec(&admin, "IF OBJECT_ID('dbo.tx_guard') IS NOT NULL DROP TABLE dbo.tx_guard").await;
        exec(&admin, "CREATE TABLE dbo.tx_guard (id INT)").await;

        server
            .bridge()
            .execute_query(QueryRequest::new(
                "BEGIN TRANSACTION; INSERT INTO dbo.tx_guard VALUES (1); SELECT @@TRANCOUNT AS open_tx",
            ))
            .await
            .unwrap();

        let count = admin
            .query("SELECT COUNT(*) AS c FROM dbo.tx_guard", &[], 1)
            .await
            .unwrap();
        assert_eq!(count.records().next().unwrap().i64("c"), Some(0));

        let result = server
            .bridge()
            .execute_query(QueryRequest::new("SELECT @@TRANCOUNT AS open_tx"))
            .await
            .unwrap();
        assert_eq!(result.records().next().unwrap().i64("open_tx"), Some(0));

        exec(&admin, "DROP TABLE dbo.tx_guard").await;
    }
}

// =============================================================================
// Metadata Tests
// =============================================================================

mod metadata_tests {
    use super::*;

    async fn create_fixture(admin: &MssqlBackend) {
        exec(admin, "IF OBJECT_ID('dbo.it_orders') IS NOT NULL DROP TABLE dbo.it_orders").await;
        exec(admin, "IF OBJECT_ID('dbo.it_customers') IS NOT NULL DROP TABLE dbo.it_customers").await;
        exec(
            admin,
            "CREATE TABLE dbo.it_customers (
                id INT NOT NULL CONSTRAINT PK_it_customers PRIMARY KEY,
                name NVARCHAR(100) NOT NULL
            )",
        )
        .await;
        exec(
            admin,
            "CREATE TABLE dbo.it_orders (
                id INT NOT NULL CONSTRAINT PK_it_orders PRIMARY KEY,
                customer_id INT NOT NULL
                    CONSTRAINT FK_it_orders_customers REFERENCES dbo.it_customers(id),
                amount DECIMAL(12,2) NULL,
                placed_at DATETIME2 NOT NULL
            )",
        )
        .await;
        exec(
            admin,
            "CREATE INDEX IX_it_orders_customer ON dbo.it_orders (customer_id, placed_at)",
        )
        .await;
        exec(
            admin,
            "EXEC sp_addextendedproperty @name = N'MS_Description', @value = N'Order total',
                @level0type = N'SCHEMA', @level0name = N'dbo',
                @level1type = N'TABLE', @level1name = N'it_orders',
                @level2type = N'COLUMN', @level2name = N'amount'",
        )
        .await;
    }

    async fn drop_fixture(admin: &MssqlBackend) {
        exec(admin, "DROP TABLE dbo.it_orders").await;
        exec(admin, "DROP TABLE dbo.it_customers").await;
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_describe_table() {
        let db = TestDatabase::new().await;
        let admin = db.admin();
        create_fixture(&admin).await;
        let server = db.server().await;

        let structure = server
            .bridge()
            .describe_table("it_orders", None)
            .await
            .expect("describe_table");

        let names: Vec<&str> = structure
            .columns
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "customer_id", "amount", "placed_at"]);

        let amount = &structure.columns[2];
        assert_eq!(amount.data_type, "decimal");
        assert_eq!(amount.precision, Some(12));
        assert_eq!(amount.scale, Some(2));
        assert!(amount.is_nullable);
        assert_eq!(amount.description, "Order total");

        assert_eq!(structure.primary_keys, vec!["id"]);
        assert_eq!(structure.foreign_keys.len(), 1);
        assert_eq!(structure.foreign_keys[0].referenced_table, "it_customers");
        assert_eq!(structure.foreign_keys[0].referenced_column, "id");

        let index = structure
            .indexes
            .iter()
            .find(|i| i.index_name == "IX_it_orders_customer")
            .expect("index present");
        assert_eq!(index.columns, vec!["customer_id", "placed_at"]);
        assert!(!index.is_unique);

        drop_fixture(&admin).await;
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_list_tables_and_missing_table() {
        let db = TestDatabase::new().await;
        let admin = db.admin();
        create_fixture(&admin).await;
        let server = db.server().await;

        let list = server.bridge().list_tables(None).await.unwrap();
        assert!(list.tables.iter().any(|t| t.table_name == "it_orders"));
        assert_eq!(list.count, list.tables.len());

        let result = server
            .get_table_structure(Parameters(TableStructureInput {
                table_name: "it_missing".to_string(),
                schema: "dbo".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(tool_json(&result)["kind"], "not_found");

        drop_fixture(&admin).await;
    }
}

// =============================================================================
// Error Mapping Tests
// =============================================================================

mod error_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_syntax_error_code() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let input = QuerySqlInput {
            sql: "SELECT FROM WHERE".to_string(),
            params: vec![],
            max_rows: None,
            format: OutputFormat::Json,
        };
        let result = server.query_sql(Parameters(input)).await.unwrap();

        assert_eq!(result.is_error, Some(true));
        let body = tool_json(&result);
        assert_eq!(body["kind"], "query");
        assert_eq!(body["sql_error_code"], json!(156));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_missing_object_is_not_found() {
        let db = TestDatabase::new().await;
        let server = db.server().await;

        let err = server
            .bridge()
            .execute_query(QueryRequest::new("SELECT * FROM dbo.nonexistent_table_xyz"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Errors do not poison the cached connection.
        assert!(server.bridge().health_check().await.is_healthy());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_backend_shared_across_clones() {
        let db = TestDatabase::new().await;
        let backend: Arc<dyn SqlBackend> = Arc::new(db.admin());
        let server = JeweiMcpServer::with_backend(db.config(&[]), backend);
        let clone = server.clone();

        let (a, b) = tokio::join!(
            server.bridge().execute_query(QueryRequest::new("SELECT 1 AS a")),
            clone.bridge().execute_query(QueryRequest::new("SELECT 2 AS b")),
        );
        assert_eq!(a.unwrap().rows[0].values[0], SqlValue::I32(1));
        assert_eq!(b.unwrap().rows[0].values[0], SqlValue::I32(2));
    }
}
