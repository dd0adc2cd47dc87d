// Property-based tests for the database access layer
// Runs against an in-memory pool so no MySQL server is needed

use async_trait::async_trait;
use common::db::{
    ConnectionParams, ConnectionPool, Connector, Database, ExecuteOptions, PooledConnection,
    QueryKind, QueryResult, RetryPolicy, Row, Value,
};
use common::errors::{DatabaseError, ErrorKind};
use common::telemetry::LogContext;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How every connection from a [`FakePool`] behaves
#[derive(Debug, Clone, Copy, PartialEq)]
enum Behavior {
    Healthy,
    /// Every statement fails with a connectivity error
    Transient,
    /// Every statement fails with a syntax error
    Syntax,
    /// Statements never complete
    Hang,
    /// Statements and pings fail
    Broken,
}

#[derive(Default)]
struct Counters {
    statements: AtomicUsize,
    commits: AtomicUsize,
    closes: AtomicUsize,
}

struct FakePool {
    behavior: Behavior,
    idle: Arc<AtomicUsize>,
    counters: Arc<Counters>,
}

impl FakePool {
    fn new(behavior: Behavior, size: usize) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            idle: Arc::new(AtomicUsize::new(size)),
            counters: Arc::new(Counters::default()),
        })
    }

    fn idle(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }

    fn statements(&self) -> usize {
        self.counters.statements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for FakePool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, DatabaseError> {
        let taken = self
            .idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_err() {
            return Err(DatabaseError::Transient("pool exhausted".to_string()));
        }
        Ok(Box::new(FakeConnection {
            behavior: self.behavior,
            idle: self.idle.clone(),
            counters: self.counters.clone(),
        }))
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeConnection {
    behavior: Behavior,
    idle: Arc<AtomicUsize>,
    counters: Arc<Counters>,
}

impl FakeConnection {
    async fn statement(&self) -> Result<(), DatabaseError> {
        self.counters.statements.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Healthy => Ok(()),
            Behavior::Transient | Behavior::Broken => {
                Err(DatabaseError::Transient("Lost connection to MySQL server".to_string()))
            }
            Behavior::Syntax => Err(DatabaseError::QueryFailed(
                "MySQL error 1064 (42000): You have an error in your SQL syntax".to_string(),
            )),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.idle.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PooledConnection for FakeConnection {
    async fn ping(&mut self) -> Result<(), DatabaseError> {
        match self.behavior {
            Behavior::Broken => Err(DatabaseError::Transient("broken pipe".to_string())),
            _ => Ok(()),
        }
    }

    async fn fetch_all(
        &mut self,
        _query: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Row>, DatabaseError> {
        self.statement().await?;
        let mut row = vec![Value::Int(1)];
        row.extend(params);
        Ok(vec![row])
    }

    async fn execute(&mut self, _query: &str, _params: Vec<Value>) -> Result<u64, DatabaseError> {
        self.statement().await?;
        Ok(3)
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeConnector {
    pool: Arc<FakePool>,
    connects: AtomicUsize,
}

impl FakeConnector {
    fn new(pool: Arc<FakePool>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            connects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _params: &ConnectionParams,
    ) -> Result<Arc<dyn ConnectionPool>, DatabaseError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.pool.clone())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn connected(behavior: Behavior, dir: &tempfile::TempDir) -> (Database, Arc<FakePool>) {
    let pool = FakePool::new(behavior, 4);
    let db = Database::with_connector(FakeConnector::new(pool.clone()), LogContext::disabled())
        .with_store_path(dir.path().join("configdb.cfg"));
    db.connect(&ConnectionParams::new("127.0.0.1", 3306, "app", "pw", "core"))
        .await
        .unwrap();
    (db, pool)
}

fn fast(retry: u32) -> ExecuteOptions {
    ExecuteOptions::default()
        .with_retry(retry)
        .with_timeout(Duration::from_millis(50))
}

/// **Property 1: Connect persists config**
///
/// *For any* valid parameters, after `connect` succeeds, `connect_from_config`
/// with the same database name and path yields the same identity.
#[test]
fn property_connect_persists_config() {
    proptest!(ProptestConfig::with_cases(32), |(
        host in "[a-z][a-z0-9.-]{0,20}",
        port in 1u16..=65535,
        user in "[a-z][a-z0-9_]{0,12}",
        password in "[A-Za-z0-9!@%^&*_-]{1,16}",
        database in "[a-z][a-z0-9_]{0,12}"
    )| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Config").join("configdb.cfg");

        let (first, second) = runtime().block_on(async {
            let pool = FakePool::new(Behavior::Healthy, 2);
            let connector = FakeConnector::new(pool);

            let db = Database::with_connector(connector.clone(), LogContext::disabled())
                .with_store_path(&path);
            let params = ConnectionParams::new(&host, port, &user, &password, &database);
            db.connect(&params).await.unwrap();
            let first = db.identity().await;
            db.close().await;

            let reloaded = Database::with_connector(connector, LogContext::disabled());
            reloaded.connect_from_config(&database, &path).await.unwrap();
            let second = reloaded.identity().await;
            reloaded.close().await;
            (first, second)
        });

        prop_assert!(first.is_some());
        prop_assert_eq!(first, second);

        let stored = common::db::load_connection(&path, &database).unwrap();
        prop_assert_eq!(stored.port, port);
        prop_assert_eq!(stored.password, password);
    });
}

/// **Property 2: Unconnected execute fails**
///
/// *For any* query, executing on a never-connected instance fails with a
/// connection error without reaching the connector.
#[test]
fn property_unconnected_execute_fails() {
    proptest!(|(query in ".{0,64}")| {
        let pool = FakePool::new(Behavior::Healthy, 1);
        let connector = FakeConnector::new(pool.clone());
        let db = Database::with_connector(connector.clone(), LogContext::disabled());

        let result = runtime().block_on(db.execute(&query, Vec::new()));

        match result {
            Err(DatabaseError::NotConnected) => {}
            other => prop_assert!(false, "Expected NotConnected, got: {:?}", other),
        }
        prop_assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        prop_assert_eq!(pool.statements(), 0);
    });
}

/// **Property 3: Retry budget is exhausted exactly once**
///
/// *For any* retry budget R and a query that always fails transiently,
/// execute makes exactly R + 1 attempts before surfacing the error.
#[test]
fn property_retry_budget_exhausted_exactly_once() {
    proptest!(ProptestConfig::with_cases(16), |(retry in 0u32..6)| {
        let dir = tempfile::tempdir().unwrap();
        let (result, attempts, idle) = runtime().block_on(async {
            let (db, pool) = connected(Behavior::Transient, &dir).await;
            let result = db.execute_with("UPDATE t SET x = 1", Vec::new(), fast(retry)).await;
            (result, pool.statements(), pool.idle())
        });

        prop_assert!(matches!(result, Err(DatabaseError::Transient(_))));
        prop_assert_eq!(attempts, retry as usize + 1);
        prop_assert_eq!(idle, 4);
    });
}

#[tokio::test]
async fn test_default_retry_makes_three_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Transient, &dir).await;

    let err = db.execute("SELECT * FROM users", Vec::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);
    assert_eq!(pool.statements(), 3);
}

#[tokio::test]
async fn test_non_retryable_error_surfaces_after_one_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Syntax, &dir).await;

    let err = db.execute("SELEC oops", Vec::new()).await.unwrap_err();
    assert!(matches!(err, DatabaseError::QueryFailed(_)));
    assert_eq!(pool.statements(), 1);
}

#[tokio::test]
async fn test_all_errors_policy_retries_syntax_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Syntax, &dir).await;

    let options = fast(2).with_retry_policy(RetryPolicy::AllErrors);
    let err = db
        .execute_with("SELEC oops", Vec::new(), options)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::QueryFailed(_)));
    assert_eq!(pool.statements(), 3);
}

#[tokio::test]
async fn test_timeouts_are_retried_then_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Hang, &dir).await;

    let err = db
        .execute_with("SELECT SLEEP(100)", Vec::new(), fast(2))
        .await
        .unwrap_err();

    match err {
        DatabaseError::Timeout { attempts, timeout } => {
            assert_eq!(attempts, 3);
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("Expected Timeout, got: {:?}", other),
    }
    assert_eq!(pool.statements(), 3);
    // Cancelled attempts still hand their connections back
    assert_eq!(pool.idle(), 4);
}

/// **Property 4: Read/write classification**
#[tokio::test]
async fn test_read_write_classification() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Healthy, &dir).await;

    let read = db.execute("SELECT 1", Vec::new()).await.unwrap();
    assert!(matches!(read, QueryResult::Rows(ref rows) if rows.len() == 1));
    assert_eq!(pool.counters.commits.load(Ordering::SeqCst), 0);

    let write = db.execute("UPDATE t SET x=1", Vec::new()).await.unwrap();
    assert_eq!(write, QueryResult::Affected(3));
    assert_eq!(pool.counters.commits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_explicit_kind_overrides_text() {
    let dir = tempfile::tempdir().unwrap();
    let (db, _pool) = connected(Behavior::Healthy, &dir).await;

    let result = db
        .execute_as(
            QueryKind::Read,
            "SHOW TABLES",
            Vec::new(),
            ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert!(matches!(result, QueryResult::Rows(_)));
}

#[tokio::test]
async fn test_fetch_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let (db, _pool) = connected(Behavior::Healthy, &dir).await;

    let row = db
        .fetch_one(
            "SELECT password FROM users WHERE gmail = ?",
            vec![Value::from("someone@example.com")],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.len(), 2);
    assert_eq!(row[1], Value::from("someone@example.com"));

    let rows = db.fetch_all("SELECT 1", Vec::new()).await.unwrap();
    assert_eq!(rows.len(), 1);
}

/// **Property 5: Scoped session always releases**
#[tokio::test]
async fn test_scoped_session_releases_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Healthy, &dir).await;
    let before = pool.idle();

    let result: Result<(), DatabaseError> = db
        .session(|cursor| {
            Box::pin(async move {
                cursor.execute("DELETE FROM codes", Vec::new()).await?;
                Err(DatabaseError::QueryFailed("caller aborted".to_string()))
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(pool.idle(), before);
}

#[tokio::test]
async fn test_scoped_session_releases_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Healthy, &dir).await;
    let before = pool.idle();

    let rowcount = db
        .session(|cursor| {
            Box::pin(async move {
                assert_eq!(cursor.rowcount(), None);
                cursor.execute("DELETE FROM codes", Vec::new()).await?;
                cursor.commit().await?;
                Ok(cursor.rowcount())
            })
        })
        .await
        .unwrap();

    assert_eq!(rowcount, Some(3));
    assert_eq!(pool.idle(), before);
}

#[tokio::test]
async fn test_concurrent_sessions_are_bounded_by_pool_size() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Healthy, &dir).await;
    let db = Arc::new(db);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.execute("SELECT 1", Vec::new()).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(pool.idle(), 4);
}

/// **Property 6: Liveness never raises**
#[tokio::test]
async fn test_liveness_with_broken_connections_is_false() {
    let dir = tempfile::tempdir().unwrap();
    let (db, _pool) = connected(Behavior::Broken, &dir).await;

    assert!(!db.is_connected().await);
    assert!(db.ping().await.is_err());
}

#[tokio::test]
async fn test_liveness_with_healthy_pool_is_true() {
    let dir = tempfile::tempdir().unwrap();
    let (db, _pool) = connected(Behavior::Healthy, &dir).await;

    assert!(db.is_connected().await);
    assert!(db.ping().await.is_ok());
}

/// **Property 7: Close is idempotent**
#[tokio::test]
async fn test_close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (db, pool) = connected(Behavior::Healthy, &dir).await;

    db.close().await;
    db.close().await;
    assert_eq!(pool.counters.closes.load(Ordering::SeqCst), 1);
    assert!(!db.is_connected().await);

    let never = Database::with_connector(
        FakeConnector::new(FakePool::new(Behavior::Healthy, 1)),
        LogContext::disabled(),
    );
    never.close().await;
}

#[tokio::test]
async fn test_connect_from_config_without_section_is_configuration_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configdb.cfg");
    std::fs::write(&path, "[unrelated]\nhost = h\nuser = u\npassword = p\n").unwrap();

    let pool = FakePool::new(Behavior::Healthy, 1);
    let connector = FakeConnector::new(pool);
    let db = Database::with_connector(connector.clone(), LogContext::disabled());

    let err = db.connect_from_config("core", &path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_from_config_reads_database_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configdb.cfg");
    std::fs::write(&path, "[database]\nhost = 10.1.2.3\nuser = bot\npassword = pw\n").unwrap();

    let pool = FakePool::new(Behavior::Healthy, 1);
    let db = Database::with_connector(FakeConnector::new(pool), LogContext::disabled());
    db.connect_from_config("core", &path).await.unwrap();

    let identity = db.identity().await.unwrap();
    assert_eq!(identity.host, "10.1.2.3");
    assert_eq!(identity.user, "bot");
    assert_eq!(identity.database, "core");

    // Persisted under the database name alongside the original section
    let stored = common::db::load_connection(&path, "core").unwrap();
    assert_eq!(stored.section, "core");
    assert_eq!(stored.port, 3306);
}
