// Connection parameters and the identity recorded at connect time

use crate::errors::DatabaseError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PORT: u16 = 3306;

/// Everything needed to open a pool against one MySQL database
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_min: usize,
    pub pool_max: usize,
    pub autocommit: bool,
}

impl ConnectionParams {
    /// Parameters with the default pool bounds (1..10) and autocommit on
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            pool_min: 1,
            pool_max: 10,
            autocommit: true,
        }
    }

    pub fn with_pool_size(mut self, min: usize, max: usize) -> Self {
        self.pool_min = min;
        self.pool_max = max;
        self
    }

    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.host.trim().is_empty() {
            return Err(DatabaseError::InvalidConfiguration(
                "host cannot be empty".to_string(),
            ));
        }
        if self.user.trim().is_empty() {
            return Err(DatabaseError::InvalidConfiguration(
                "user cannot be empty".to_string(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(DatabaseError::InvalidConfiguration(
                "database name cannot be empty".to_string(),
            ));
        }
        if self.pool_max == 0 {
            return Err(DatabaseError::InvalidConfiguration(
                "pool_max must be greater than 0".to_string(),
            ));
        }
        if self.pool_min > self.pool_max {
            return Err(DatabaseError::InvalidConfiguration(format!(
                "pool_min ({}) cannot exceed pool_max ({})",
                self.pool_min, self.pool_max
            )));
        }
        Ok(())
    }

    pub fn identity(&self) -> Identity {
        Identity {
            host: self.host.clone(),
            user: self.user.clone(),
            database: self.database.clone(),
        }
    }
}

// Keep the password out of logs
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("pool_min", &self.pool_min)
            .field("pool_max", &self.pool_max)
            .field("autocommit", &self.autocommit)
            .finish()
    }
}

/// Diagnostic identity of a connected instance; write-once at connect time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub host: String,
    pub user: String,
    pub database: String,
}
