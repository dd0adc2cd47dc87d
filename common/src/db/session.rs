// Cursor bound to one checked-out connection for the length of a scoped session

use crate::db::pool::PooledConnection;
use crate::db::query::{Row, Value};
use crate::errors::DatabaseError;

/// Statement interface handed to the block of [`crate::db::Database::session`].
///
/// Owns the checked-out connection; the connection returns to the pool when
/// the cursor is dropped at the end of the session.
pub struct Cursor {
    conn: Box<dyn PooledConnection>,
    rowcount: Option<u64>,
}

impl Cursor {
    pub(crate) fn new(conn: Box<dyn PooledConnection>) -> Self {
        Self {
            conn,
            rowcount: None,
        }
    }

    pub async fn fetch_all(
        &mut self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Row>, DatabaseError> {
        let rows = self.conn.fetch_all(query, params).await?;
        self.rowcount = Some(rows.len() as u64);
        Ok(rows)
    }

    pub async fn fetch_one(
        &mut self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<Option<Row>, DatabaseError> {
        Ok(self.fetch_all(query, params).await?.into_iter().next())
    }

    /// Run a statement without committing; returns the affected row count
    pub async fn execute(&mut self, query: &str, params: Vec<Value>) -> Result<u64, DatabaseError> {
        let affected = self.conn.execute(query, params).await?;
        self.rowcount = Some(affected);
        Ok(affected)
    }

    pub async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.conn.commit().await
    }

    pub async fn ping(&mut self) -> Result<(), DatabaseError> {
        self.conn.ping().await
    }

    /// Rows returned or affected by the last statement on this cursor
    pub fn rowcount(&self) -> Option<u64> {
        self.rowcount
    }
}
