// Database access layer: pooled MySQL connections, scoped sessions, query
// execution with timeout/retry, and persisted connection parameters

pub mod client;
pub mod params;
pub mod pool;
pub mod query;
pub mod session;
pub mod store;

pub use client::Database;
pub use params::{ConnectionParams, Identity, DEFAULT_PORT};
pub use pool::{ConnectionPool, Connector, MySqlConnector, MySqlPool, PooledConnection};
pub use query::{ExecuteOptions, QueryKind, QueryResult, RetryPolicy, Row, Value};
pub use session::Cursor;
pub use store::{load_connection, save_connection, StoredConnection};
