// Error handling for the database access layer

use std::time::Duration;
use thiserror::Error;

/// Coarse error categories exposed to callers of the data layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No pool present, or pool creation failed
    Connection,
    /// Required section or fields absent from the configuration store
    ConfigurationMissing,
    /// Every attempt exceeded the per-call timeout
    TimeoutExceeded,
    /// Any other failure while running a statement
    Query,
}

/// Database access layer errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database not connected")]
    NotConnected,

    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Query timed out after {attempts} attempt(s) of {}ms each", timeout.as_millis())]
    Timeout { attempts: u32, timeout: Duration },

    #[error("Transient database failure: {0}")]
    Transient(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Unexpected query result: {0}")]
    UnexpectedResult(String),

    #[error("Failed to persist configuration: {0}")]
    ConfigPersistFailed(String),
}

impl DatabaseError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::NotConnected | DatabaseError::ConnectionFailed(_) => {
                ErrorKind::Connection
            }
            DatabaseError::ConfigurationMissing(_)
            | DatabaseError::InvalidConfiguration(_)
            | DatabaseError::ConfigPersistFailed(_) => ErrorKind::ConfigurationMissing,
            DatabaseError::Timeout { .. } => ErrorKind::TimeoutExceeded,
            DatabaseError::Transient(_)
            | DatabaseError::QueryFailed(_)
            | DatabaseError::UnexpectedResult(_) => ErrorKind::Query,
        }
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::Timeout { .. } | DatabaseError::Transient(_)
        )
    }
}

/// MySQL server error codes that indicate a retryable condition
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

impl From<mysql_async::Error> for DatabaseError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server_err) => match server_err.code {
                ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK => DatabaseError::Transient(format!(
                    "MySQL error {} ({}): {}",
                    server_err.code, server_err.state, server_err.message
                )),
                _ => DatabaseError::QueryFailed(format!(
                    "MySQL error {} ({}): {}",
                    server_err.code, server_err.state, server_err.message
                )),
            },
            mysql_async::Error::Io(e) => DatabaseError::Transient(e.to_string()),
            mysql_async::Error::Driver(e) => DatabaseError::Transient(e.to_string()),
            mysql_async::Error::Url(e) => DatabaseError::ConnectionFailed(e.to_string()),
            other => DatabaseError::QueryFailed(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for DatabaseError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => DatabaseError::ConfigurationMissing(key),
            config::ConfigError::Foreign(e) => DatabaseError::ConfigurationMissing(e.to_string()),
            other => DatabaseError::InvalidConfiguration(other.to_string()),
        }
    }
}
