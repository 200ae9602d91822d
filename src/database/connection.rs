//! SQL Server connection management and query execution.
//!
//! A single connection is opened lazily, reused across sequential requests,
//! and replaced once it reaches the configured recycle age or after a
//! connection-level failure.
//!
//! After every call the session is returned to its state at login: open
//! transactions are rolled back and `SET ROWCOUNT` is cleared. Any other
//! session setting that changed (database, language, SET options, isolation
//! level) gets the connection discarded instead.

use crate::config::DatabaseConfig;
use crate::constants::LOG_SQL_PREVIEW_CHARS;
use crate::database::backend::{SqlBackend, SqlParam};
use crate::database::query::{truncate_for_log, QueryResult, Record};
use crate::error::ServerError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

/// Type alias for a raw tiberius connection.
pub type RawConnection = Client<Compat<TcpStream>>;

struct CachedConnection {
    client: RawConnection,
    established: Instant,
    baseline: SessionState,
}

/// Rolls back open work, clears `SET ROWCOUNT`, then reads the session settings.
const RESET_SESSION_SQL: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION; \
SET ROWCOUNT 0; \
SELECT DB_NAME() AS database_name, @@OPTIONS AS options, @@TRANCOUNT AS open_transactions, \
s.language, s.date_format, s.date_first, s.lock_timeout, s.text_size, \
s.transaction_isolation_level, s.deadlock_priority \
FROM sys.dm_exec_sessions AS s WHERE s.session_id = @@SPID";

/// Session settings that must not carry over from one call to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionState {
    database: String,
    options: Option<i64>,
    open_transactions: Option<i64>,
    language: String,
    date_format: String,
    date_first: Option<i64>,
    lock_timeout: Option<i64>,
    text_size: Option<i64>,
    isolation_level: Option<i64>,
    deadlock_priority: Option<i64>,
}

impl SessionState {
    fn from_record(row: Record<'_>) -> Self {
        Self {
            database: row.string("database_name"),
            options: row.i64("options"),
            open_transactions: row.i64("open_transactions"),
            language: row.string("language"),
            date_format: row.string("date_format"),
            date_first: row.i64("date_first"),
            lock_timeout: row.i64("lock_timeout"),
            text_size: row.i64("text_size"),
            isolation_level: row.i64("transaction_isolation_level"),
            deadlock_priority: row.i64("deadlock_priority"),
        }
    }

    fn from_result(result: &QueryResult) -> Result<Self, ServerError> {
        result
            .records()
            .next()
            .map(Self::from_record)
            .ok_or_else(|| ServerError::connection("Session state query returned no rows"))
    }
}

/// Reset the session and read back its settings.
async fn reset_session(client: &mut RawConnection) -> Result<SessionState, ServerError> {
    let stream = client.simple_query(RESET_SESSION_SQL).await?;
    let result = QueryResult::from_stream(stream, 1, Instant::now()).await?;
    SessionState::from_result(&result)
}

/// [`SqlBackend`] backed by a tiberius connection.
pub struct MssqlBackend {
    config: DatabaseConfig,
    query_timeout: Duration,
    connection: Mutex<Option<CachedConnection>>,
}

impl MssqlBackend {
    /// Create a backend. No connection is opened until the first query.
    pub fn new(config: DatabaseConfig, query_timeout: Duration) -> Self {
        Self {
            config,
            query_timeout,
            connection: Mutex::new(None),
        }
    }

    /// Return the cached connection, opening a new one if needed.
    async fn checkout<'a>(
        &self,
        slot: &'a mut Option<CachedConnection>,
    ) -> Result<&'a mut RawConnection, ServerError> {
        let expired = slot
            .as_ref()
            .is_some_and(|c| c.established.elapsed() >= self.config.connection_recycle);
        if expired {
            debug!("Recycling connection after {:?}", self.config.connection_recycle);
            *slot = None;
        }

        if slot.is_none() {
            let mut client = connect(&self.config).await?;
            let baseline =
                tokio::time::timeout(self.config.connect_timeout, reset_session(&mut client))
                    .await
                    .map_err(|_| {
                        ServerError::connection("Timed out reading session state after login")
                    })??;
            *slot = Some(CachedConnection {
                client,
                established: Instant::now(),
                baseline,
            });
        }

        slot.as_mut()
            .map(|c| &mut c.client)
            .ok_or_else(|| ServerError::internal("Connection slot unexpectedly empty"))
    }

    /// Return the cached session to its login state, or drop the connection.
    async fn restore_session(&self, slot: &mut Option<CachedConnection>) {
        let Some(cached) = slot.as_mut() else {
            return;
        };

        let outcome =
            tokio::time::timeout(self.query_timeout, reset_session(&mut cached.client)).await;
        let keep = match outcome {
            Ok(Ok(state)) if state == cached.baseline => true,
            Ok(Ok(state)) => {
                warn!(
                    ?state,
                    baseline = ?cached.baseline,
                    "Session settings changed; discarding connection"
                );
                false
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Session reset failed; discarding connection");
                false
            }
            Err(_) => {
                warn!("Session reset timed out; discarding connection");
                false
            }
        };

        if !keep {
            *slot = None;
        }
    }
}

#[async_trait]
impl SqlBackend for MssqlBackend {
    async fn query(
        &self,
        sql: &str,
        params: &[SqlParam],
        max_rows: usize,
    ) -> Result<QueryResult, ServerError> {
        let start = Instant::now();
        debug!(
            sql = %truncate_for_log(sql, LOG_SQL_PREVIEW_CHARS),
            params = params.len(),
            "Executing query"
        );

        let mut slot = self.connection.lock().await;

        // Connecting has its own timeout; the query timeout covers execution only.
        let result = match self.checkout(&mut slot).await {
            Ok(client) => {
                match tokio::time::timeout(
                    self.query_timeout,
                    run_query(client, sql, params, max_rows, start),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ServerError::timeout(self.query_timeout.as_secs())),
                }
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(r) => debug!(
                rows = r.row_count(),
                truncated = r.truncated,
                elapsed_ms = r.execution_time_ms,
                "Query completed"
            ),
            Err(e) if e.poisons_connection() => {
                warn!(error = %e, "Discarding connection after failure");
                *slot = None;
            }
            Err(e) => debug!(error = %e, "Query failed"),
        }

        self.restore_session(&mut slot).await;

        result
    }
}

async fn run_query(
    client: &mut RawConnection,
    sql: &str,
    params: &[SqlParam],
    max_rows: usize,
    start: Instant,
) -> Result<QueryResult, ServerError> {
    let stream = if params.is_empty() {
        client.simple_query(sql).await?
    } else {
        let mut query = Query::new(sql);
        for param in params {
            match param {
                SqlParam::Null => query.bind(Option::<String>::None),
                SqlParam::Bool(v) => query.bind(*v),
                SqlParam::Int(v) => query.bind(*v),
                SqlParam::Float(v) => query.bind(*v),
                SqlParam::Text(v) => query.bind(v.clone()),
            }
        }
        query.query(client).await?
    };

    QueryResult::from_stream(stream, max_rows, start).await
}

/// Create a tiberius Config from DatabaseConfig.
pub fn create_config(db_config: &DatabaseConfig) -> Config {
    let mut config = Config::new();

    config.host(&db_config.host);
    config.port(db_config.port);

    if let Some(ref database) = db_config.database {
        config.database(database);
    }

    config.authentication(AuthMethod::sql_server(
        &db_config.credentials.username,
        &db_config.credentials.password,
    ));

    if db_config.encrypt {
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::Off);
    }

    if db_config.trust_server_certificate {
        config.trust_cert();
    }

    config.application_name(&db_config.application_name);

    config
}

/// Open a raw connection to SQL Server within the configured connect timeout.
pub async fn connect(db_config: &DatabaseConfig) -> Result<RawConnection, ServerError> {
    info!(
        host = %db_config.host,
        port = db_config.port,
        database = db_config.database.as_deref().unwrap_or("<default>"),
        user = %db_config.credentials.username,
        "Connecting to SQL Server"
    );

    let config = create_config(db_config);
    let client = tokio::time::timeout(db_config.connect_timeout, establish(config))
        .await
        .map_err(|_| {
            ServerError::connection(format!(
                "Timed out connecting to {}:{} after {:?}",
                db_config.host,
                db_config.port,
                db_config.connect_timeout
            ))
        })??;

    debug!("Connection established successfully");
    Ok(client)
}

async fn establish(config: Config) -> Result<RawConnection, ServerError> {
    let tcp = open_tcp(&config.get_addr()).await?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways may redirect the login to another node.
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!(%host, port, "Following server routing redirect");
            let mut config = config;
            config.host(&host);
            config.port(port);

            let tcp = open_tcp(&config.get_addr()).await?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn open_tcp(address: &str) -> Result<TcpStream, ServerError> {
    let tcp = TcpStream::connect(address).await.map_err(|e| {
        ServerError::connection_with_source(format!("Failed to connect to {}", address), e)
    })?;

    tcp.set_nodelay(true)
        .map_err(|e| ServerError::connection_with_source("Failed to set TCP_NODELAY", e))?;

    Ok(tcp)
}

/// Create the production backend and verify connectivity with `SELECT 1`.
pub async fn create_backend(
    db_config: &DatabaseConfig,
    query_timeout: Duration,
) -> Result<MssqlBackend, ServerError> {
    let backend = MssqlBackend::new(db_config.clone(), query_timeout);
    backend.ping().await?;
    info!("Initial connection test successful");
    Ok(backend)
}
