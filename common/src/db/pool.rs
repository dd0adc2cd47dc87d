// Connection pool seam and its MySQL implementation

use crate::db::params::ConnectionParams;
use crate::db::query::{Row, Value};
use crate::errors::DatabaseError;
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Creates pools from connection parameters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a pool bounded by `params.pool_min..=params.pool_max`
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Arc<dyn ConnectionPool>, DatabaseError>;
}

/// A bounded set of live connections
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Check out one connection. Dropping it hands it back to the pool.
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, DatabaseError>;

    /// Close the pool and wait for checked-out connections to finish closing
    async fn close(&self) -> Result<(), DatabaseError>;
}

/// One checked-out connection
#[async_trait]
pub trait PooledConnection: Send {
    async fn ping(&mut self) -> Result<(), DatabaseError>;

    async fn fetch_all(&mut self, query: &str, params: Vec<Value>)
        -> Result<Vec<Row>, DatabaseError>;

    /// Run a statement and return the affected row count
    async fn execute(&mut self, query: &str, params: Vec<Value>) -> Result<u64, DatabaseError>;

    async fn commit(&mut self) -> Result<(), DatabaseError>;
}

/// Opens `mysql_async` pools
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }

    fn build_opts(params: &ConnectionParams) -> Result<Opts, DatabaseError> {
        let constraints = PoolConstraints::new(params.pool_min, params.pool_max).ok_or_else(|| {
            DatabaseError::InvalidConfiguration(format!(
                "Invalid pool bounds {}..{}",
                params.pool_min, params.pool_max
            ))
        })?;

        let autocommit = if params.autocommit { 1 } else { 0 };

        let builder = OptsBuilder::default()
            .ip_or_hostname(params.host.clone())
            .tcp_port(params.port)
            .user(Some(params.user.clone()))
            .pass(Some(params.password.clone()))
            .db_name(Some(params.database.clone()))
            .pool_opts(PoolOpts::default().with_constraints(constraints))
            .init(vec![format!("SET autocommit={}", autocommit)]);

        Ok(Opts::from(builder))
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    #[instrument(
        skip(self, params),
        fields(host = %params.host, port = params.port, database = %params.database)
    )]
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Arc<dyn ConnectionPool>, DatabaseError> {
        let pool = Pool::new(Self::build_opts(params)?);

        // Pool::new is lazy; check out one connection so bad credentials fail here
        let conn = pool.get_conn().await.map_err(|e| {
            DatabaseError::ConnectionFailed(format!(
                "Failed to connect to MySQL at {}:{}: {}",
                params.host, params.port, e
            ))
        })?;
        drop(conn);

        info!(
            pool_min = params.pool_min,
            pool_max = params.pool_max,
            "MySQL connection pool created"
        );

        Ok(Arc::new(MySqlPool { pool }))
    }
}

/// `mysql_async` pool behind the [`ConnectionPool`] seam
#[derive(Debug, Clone)]
pub struct MySqlPool {
    pool: Pool,
}

#[async_trait]
impl ConnectionPool for MySqlPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, DatabaseError> {
        let conn = self.pool.get_conn().await.map_err(DatabaseError::from)?;
        Ok(Box::new(MySqlConnection { conn }))
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        self.pool.clone().disconnect().await.map_err(DatabaseError::from)
    }
}

struct MySqlConnection {
    conn: Conn,
}

fn to_params(params: Vec<Value>) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params)
    }
}

fn to_row(row: mysql_async::Row) -> Row {
    (0..row.len())
        .map(|i| row.as_ref(i).cloned().unwrap_or(Value::NULL))
        .collect()
}

#[async_trait]
impl PooledConnection for MySqlConnection {
    async fn ping(&mut self) -> Result<(), DatabaseError> {
        self.conn.ping().await.map_err(DatabaseError::from)
    }

    async fn fetch_all(
        &mut self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Row>, DatabaseError> {
        // Text protocol when unparameterized; not every statement can be prepared.
        // Cells then arrive as Value::Bytes instead of typed values.
        let rows: Vec<mysql_async::Row> = if params.is_empty() {
            self.conn.query(query).await?
        } else {
            self.conn.exec(query, to_params(params)).await?
        };
        debug!(rows = rows.len(), "Fetched rows");
        Ok(rows.into_iter().map(to_row).collect())
    }

    async fn execute(&mut self, query: &str, params: Vec<Value>) -> Result<u64, DatabaseError> {
        if params.is_empty() {
            self.conn.query_drop(query).await?;
        } else {
            self.conn.exec_drop(query, to_params(params)).await?;
        }
        Ok(self.conn.affected_rows())
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.conn.query_drop("COMMIT").await.map_err(DatabaseError::from)
    }
}
