// Database access layer: connection lifecycle, scoped sessions, and query
// execution with per-attempt timeout and a bounded retry budget

use crate::config::{DatabaseSettings, DEFAULT_CONNECTION_STORE};
use crate::db::params::{ConnectionParams, Identity};
use crate::db::pool::{ConnectionPool, Connector, MySqlConnector};
use crate::db::query::{ExecuteOptions, QueryKind, QueryResult, Row, Value};
use crate::db::session::Cursor;
use crate::db::store;
use crate::errors::DatabaseError;
use crate::telemetry::{self, LogContext};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{error, info, warn, Instrument};

struct Connected {
    pool: Arc<dyn ConnectionPool>,
    identity: Identity,
}

/// Pooled MySQL access shared by the web and bot layers.
///
/// Constructed unconnected; [`Database::connect`] or
/// [`Database::connect_from_config`] installs a pool, [`Database::close`]
/// removes it. Query operations fail with [`DatabaseError::NotConnected`]
/// while no pool is installed.
pub struct Database {
    connector: Arc<dyn Connector>,
    store_path: PathBuf,
    pool_bounds: (usize, usize),
    defaults: ExecuteOptions,
    log: LogContext,
    state: RwLock<Option<Connected>>,
}

impl Database {
    /// Unconnected instance using the MySQL driver and default settings
    pub fn new(log: LogContext) -> Self {
        Self::with_connector(Arc::new(MySqlConnector::new()), log)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, log: LogContext) -> Self {
        Self {
            connector,
            store_path: PathBuf::from(DEFAULT_CONNECTION_STORE),
            pool_bounds: (1, 10),
            defaults: ExecuteOptions::default(),
            log,
            state: RwLock::new(None),
        }
    }

    /// Unconnected instance configured from application settings
    pub fn from_settings(settings: &DatabaseSettings, log: LogContext) -> Self {
        Self::new(log).configure(settings)
    }

    /// Apply store path, pool bounds and execute defaults from settings
    pub fn configure(mut self, settings: &DatabaseSettings) -> Self {
        self.store_path = PathBuf::from(&settings.config_path);
        self.pool_bounds = (settings.min_connections, settings.max_connections);
        self.defaults = ExecuteOptions::default()
            .with_retry(settings.retry)
            .with_timeout(settings.timeout());
        self
    }

    /// Where [`Database::connect`] persists connection parameters
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_default_options(mut self, options: ExecuteOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn default_options(&self) -> ExecuteOptions {
        self.defaults
    }

    /// Host, user and database of the live pool
    pub async fn identity(&self) -> Option<Identity> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|connected| connected.identity.clone())
    }

    /// Create the pool and persist the parameters under `[params.database]`
    pub async fn connect(&self, params: &ConnectionParams) -> Result<(), DatabaseError> {
        self.connect_and_persist(params, &self.store_path).await
    }

    /// Load the section named after `database` (falling back to `[database]`)
    /// from `path` and connect.
    ///
    /// Host, user and password are required; port defaults to 3306. The
    /// parameters are written back to the same file on success.
    pub async fn connect_from_config(
        &self,
        database: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), DatabaseError> {
        let path = path.as_ref();
        let span = tracing::info_span!(
            parent: self.log.span(),
            "connect_from_config",
            database = database,
            path = %path.display()
        );

        async {
            let stored = store::load_connection(path, database).map_err(|e| {
                error!(error = %e, "Failed to load database config");
                e
            })?;

            let (pool_min, pool_max) = self.pool_bounds;
            let params = ConnectionParams::new(
                stored.host,
                stored.port,
                stored.user,
                stored.password,
                database,
            )
            .with_pool_size(pool_min, pool_max);

            self.connect_and_persist(&params, path).await?;
            info!(section = %stored.section, "Loaded connection from config");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn connect_and_persist(
        &self,
        params: &ConnectionParams,
        store_path: &Path,
    ) -> Result<(), DatabaseError> {
        let span = tracing::info_span!(
            parent: self.log.span(),
            "connect",
            host = %params.host,
            port = params.port,
            database = %params.database
        );

        async {
            params.validate()?;

            let pool = self.connector.connect(params).await.map_err(|e| {
                error!(error = %e, "[CONNECT ERROR] Failed to create database pool");
                match e {
                    DatabaseError::ConnectionFailed(_)
                    | DatabaseError::InvalidConfiguration(_) => e,
                    other => DatabaseError::ConnectionFailed(other.to_string()),
                }
            })?;

            info!(
                pool_min = params.pool_min,
                pool_max = params.pool_max,
                "Connected to MySQL [{}:{}] - DB: {}",
                params.host,
                params.port,
                params.database
            );

            let previous = self.state.write().await.replace(Connected {
                pool,
                identity: params.identity(),
            });
            if let Some(previous) = previous {
                warn!("Replaced an existing pool; closing the old one");
                if let Err(e) = previous.pool.close().await {
                    warn!(error = %e, "Failed to close replaced pool");
                }
            }

            // The pool is live either way; a persistence failure is only logged
            match store::save_connection(
                store_path,
                &params.database,
                &params.host,
                params.port,
                &params.user,
                &params.password,
            ) {
                Ok(()) => info!("Connection established and config saved"),
                Err(e) => error!(
                    error = %e,
                    "[SAVE CONFIG ERROR] Connection established but config not saved"
                ),
            }

            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn pool(&self) -> Result<Arc<dyn ConnectionPool>, DatabaseError> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|connected| connected.pool.clone())
            .ok_or(DatabaseError::NotConnected)
    }

    /// Acquire a connection and ping it. Any failure, including a missing
    /// pool or exceeding the default timeout, reads as `false`.
    pub async fn is_connected(&self) -> bool {
        let span = tracing::debug_span!(parent: self.log.span(), "is_connected");

        async {
            let probe = async {
                let pool = self.pool().await?;
                let mut conn = pool.acquire().await?;
                conn.ping().await
            };

            match tokio::time::timeout(self.defaults.timeout, probe).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(error = %e, "Liveness check failed");
                    false
                }
                Err(_) => {
                    warn!("Liveness check timed out");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Acquire a connection and ping it, surfacing any failure
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        let span = tracing::debug_span!(parent: self.log.span(), "ping");

        async {
            let pool = self.pool().await?;
            let mut conn = pool.acquire().await?;
            conn.ping().await?;
            info!("Ping successful");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Run `f` with a cursor bound to one pooled connection.
    ///
    /// The connection goes back to the pool when `f`'s future completes,
    /// fails, or is dropped.
    ///
    /// ```ignore
    /// let count = db
    ///     .session(|cur| Box::pin(async move {
    ///         cur.execute("DELETE FROM codes WHERE expires_at < NOW()", vec![]).await?;
    ///         cur.commit().await?;
    ///         Ok(cur.rowcount())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn session<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Cursor) -> BoxFuture<'c, Result<T, DatabaseError>> + Send,
    {
        let pool = self.pool().await?;
        run_session(pool, f).await
    }

    /// Execute with default options, classifying the statement by its text
    pub async fn execute(
        &self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<QueryResult, DatabaseError> {
        self.execute_with(query, params, self.defaults).await
    }

    pub async fn execute_with(
        &self,
        query: &str,
        params: Vec<Value>,
        options: ExecuteOptions,
    ) -> Result<QueryResult, DatabaseError> {
        self.execute_as(QueryKind::classify(query), query, params, options)
            .await
    }

    /// Execute with an explicitly declared statement kind.
    ///
    /// `Read` fetches every row; `Write` runs the statement, commits, and
    /// returns the affected row count. Each attempt is bounded by
    /// `options.timeout`; failures accepted by `options.retry_policy` are
    /// retried immediately until `options.retry + 1` attempts have been made.
    pub async fn execute_as(
        &self,
        kind: QueryKind,
        query: &str,
        params: Vec<Value>,
        options: ExecuteOptions,
    ) -> Result<QueryResult, DatabaseError> {
        let span = tracing::info_span!(
            parent: self.log.span(),
            "execute",
            kind = kind.as_str(),
            retry = options.retry,
            timeout_ms = options.timeout.as_millis() as u64
        );

        async {
            let pool = self.pool().await?;
            let max_attempts = options.max_attempts();
            let mut attempt: u32 = 0;

            loop {
                attempt += 1;
                telemetry::record_query_attempt(kind.as_str());
                let started = Instant::now();

                let statement = query.to_owned();
                let values = params.clone();
                let outcome = tokio::time::timeout(
                    options.timeout,
                    run_session(pool.clone(), move |cursor| {
                        Box::pin(
                            async move { run_statement(cursor, kind, &statement, values).await },
                        )
                    }),
                )
                .await;

                let err = match outcome {
                    Ok(Ok(result)) => {
                        telemetry::record_query_duration(
                            kind.as_str(),
                            started.elapsed().as_secs_f64(),
                        );
                        return Ok(result);
                    }
                    Ok(Err(e)) => {
                        error!(
                            attempt,
                            max_attempts,
                            error = %e,
                            "[EXECUTE ERROR] Query attempt failed"
                        );
                        telemetry::record_query_failure(kind.as_str(), failure_reason(&e));
                        e
                    }
                    Err(_) => {
                        warn!(attempt, max_attempts, "[TIMEOUT] Query attempt exceeded timeout");
                        telemetry::record_query_timeout(kind.as_str());
                        DatabaseError::Timeout {
                            attempts: attempt,
                            timeout: options.timeout,
                        }
                    }
                };

                if attempt >= max_attempts {
                    error!(attempts = attempt, "Retry budget exhausted");
                    return Err(err);
                }
                if !options.retry_policy.should_retry(&err) {
                    return Err(err);
                }
                info!(next_attempt = attempt + 1, max_attempts, "Retrying query");
            }
        }
        .instrument(span)
        .await
    }

    /// First row of a read query, or `None` when it returns nothing
    pub async fn fetch_one(
        &self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<Option<Row>, DatabaseError> {
        Ok(self.fetch_all(query, params).await?.into_iter().next())
    }

    /// Every row of a read query.
    ///
    /// Cell variants differ between parameterized and unparameterized
    /// queries; see [`Row`].
    pub async fn fetch_all(
        &self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Row>, DatabaseError> {
        self.execute_as(QueryKind::Read, query, params, self.defaults)
            .await?
            .into_rows()
    }

    /// Server version string reported by `SELECT VERSION()`
    pub async fn version(&self) -> Result<Option<String>, DatabaseError> {
        let row = self.fetch_one("SELECT VERSION()", Vec::new()).await?;
        Ok(row
            .and_then(|row| row.into_iter().next())
            .and_then(|value| mysql_async::from_value_opt::<String>(value).ok()))
    }

    /// Close the pool and wait for its connections; a no-op when unconnected
    pub async fn close(&self) {
        let span = tracing::info_span!(parent: self.log.span(), "close");

        async {
            let taken = self.state.write().await.take();
            if let Some(connected) = taken {
                if let Err(e) = connected.pool.close().await {
                    warn!(error = %e, "Error while closing connection pool");
                }
                info!("Connection pool closed");
            }
        }
        .instrument(span)
        .await
    }
}

async fn run_session<T, F>(pool: Arc<dyn ConnectionPool>, f: F) -> Result<T, DatabaseError>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut Cursor) -> BoxFuture<'c, Result<T, DatabaseError>> + Send,
{
    let conn = pool.acquire().await?;
    let mut cursor = Cursor::new(conn);
    f(&mut cursor).await
}

async fn run_statement(
    cursor: &mut Cursor,
    kind: QueryKind,
    query: &str,
    params: Vec<Value>,
) -> Result<QueryResult, DatabaseError> {
    match kind {
        QueryKind::Read => {
            let rows = cursor.fetch_all(query, params).await?;
            info!("[SELECT] {} rows returned", rows.len());
            Ok(QueryResult::Rows(rows))
        }
        QueryKind::Write => {
            let affected = cursor.execute(query, params).await?;
            cursor.commit().await?;
            info!("[EXECUTE] Rows affected: {}", affected);
            Ok(QueryResult::Affected(affected))
        }
    }
}

fn failure_reason(err: &DatabaseError) -> &'static str {
    if err.is_retryable() {
        "transient"
    } else {
        "query"
    }
}
