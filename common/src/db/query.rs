// Query classification, results and per-call execution options

use crate::errors::DatabaseError;
use std::time::Duration;

pub use mysql_async::Value;

/// One result row; arity is fixed by the statement's column list.
///
/// Cell representation depends on the wire protocol: unparameterized reads
/// come back as text (`Value::Bytes`), parameterized reads as typed values
/// (`Value::Int`, `Value::Double`, ...). Convert cells with
/// `mysql_async::from_value` / `from_value_opt` rather than matching variants.
pub type Row = Vec<Value>;

/// Whether a statement returns rows or modifies data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Read,
    Write,
}

impl QueryKind {
    /// Textual classification: `SELECT`-prefixed statements are reads.
    ///
    /// Only the leading keyword is inspected, so a CTE write or a
    /// `SHOW`/`EXPLAIN` statement is classified by its literal prefix. Use
    /// [`crate::db::Database::execute_as`] to state intent explicitly.
    pub fn classify(query: &str) -> Self {
        let trimmed = query.trim_start();
        let is_select = trimmed
            .get(..6)
            .map(|prefix| prefix.eq_ignore_ascii_case("SELECT"))
            .unwrap_or(false);
        if is_select {
            QueryKind::Read
        } else {
            QueryKind::Write
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Read => "read",
            QueryKind::Write => "write",
        }
    }
}

/// Outcome of a single execute call
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(Vec<Row>),
    Affected(u64),
}

impl QueryResult {
    pub fn into_rows(self) -> Result<Vec<Row>, DatabaseError> {
        match self {
            QueryResult::Rows(rows) => Ok(rows),
            QueryResult::Affected(count) => Err(DatabaseError::UnexpectedResult(format!(
                "expected rows, got affected count {}",
                count
            ))),
        }
    }

    pub fn into_affected(self) -> Result<u64, DatabaseError> {
        match self {
            QueryResult::Affected(count) => Ok(count),
            QueryResult::Rows(rows) => Err(DatabaseError::UnexpectedResult(format!(
                "expected affected count, got {} row(s)",
                rows.len()
            ))),
        }
    }
}

/// Which failures consume a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry timeouts and connectivity failures; surface everything else at once
    #[default]
    TransientOnly,
    /// Retry every failure until the budget runs out
    AllErrors,
}

impl RetryPolicy {
    pub fn should_retry(&self, err: &DatabaseError) -> bool {
        match self {
            RetryPolicy::TransientOnly => err.is_retryable(),
            RetryPolicy::AllErrors => true,
        }
    }
}

/// Retry budget and per-attempt timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Additional attempts after the first; total attempts = retry + 1
    pub retry: u32,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            retry: 2,
            timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::TransientOnly,
        }
    }
}

impl ExecuteOptions {
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.saturating_add(1)
    }
}
