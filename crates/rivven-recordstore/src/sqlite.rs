//! SQLite backend implementation for rivven-recordstore
//!
//! rusqlite is synchronous, so every statement runs on the blocking pool
//! against a connection shared behind a mutex. Transactions are plain
//! `BEGIN` / `COMMIT` / `ROLLBACK` statements on that connection.
//!
//! Connection URLs: `sqlite:///abs/path.db`, `sqlite://rel/path.db`,
//! `sqlite::memory:` or a bare file path. An in-memory database lives only
//! as long as the connection that opened it, so a data source that opens a
//! connection per operation refuses it.
//!
//! Properties:
//! - `busy_timeout_ms`: how long a statement waits on a locked database

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, DatabaseType, Transaction};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Property naming the busy timeout in milliseconds
pub const BUSY_TIMEOUT_PROPERTY: &str = "busy_timeout_ms";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const MEMORY_PATH: &str = ":memory:";

type SharedConnection = Arc<Mutex<rusqlite::Connection>>;

/// Convert a Value to a rusqlite parameter
fn value_to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int32(n) => Sql::Integer(i64::from(*n)),
        Value::Int64(n) => Sql::Integer(*n),
        Value::Float32(n) => Sql::Real(f64::from(*n)),
        Value::Float64(n) => Sql::Real(*n),
        Value::String(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
    }
}

/// Convert a SQLite column value to a Value
fn sql_to_value(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int64(n),
        ValueRef::Real(n) => Value::Float64(n),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn query_error(e: rusqlite::Error, sql: &str) -> Error {
    Error::Query {
        message: e.to_string(),
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

fn transaction_error(e: rusqlite::Error) -> Error {
    Error::Transaction {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

fn run_query(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(e, sql))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(params.iter().map(value_to_sql)))
        .map_err(|e| query_error(e, sql))?;

    let mut result = Vec::new();
    while let Some(row) = rows.next().map_err(|e| query_error(e, sql))? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(sql_to_value(row.get_ref(idx).map_err(|e| query_error(e, sql))?));
        }
        result.push(Row::new(columns.clone(), values));
    }
    Ok(result)
}

fn run_execute(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<u64> {
    let affected = conn
        .execute(sql, rusqlite::params_from_iter(params.iter().map(value_to_sql)))
        .map_err(|e| query_error(e, sql))?;
    Ok(affected as u64)
}

/// Run a closure against the shared connection on the blocking pool
async fn with_conn<F, T>(conn: &SharedConnection, func: F) -> Result<T>
where
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let guard = conn
            .lock()
            .map_err(|_| Error::connection("sqlite connection mutex poisoned"))?;
        func(&guard)
    })
    .await
    .map_err(|e| Error::internal(format!("sqlite join error: {}", e)))?
}

/// SQLite connection
pub struct SqliteConnection {
    conn: SharedConnection,
}

impl SqliteConnection {
    /// Wrap an open rusqlite connection
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        with_conn(&self.conn, move |conn| run_query(conn, &sql, &params)).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        with_conn(&self.conn, move |conn| run_execute(conn, &sql, &params)).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        with_conn(&self.conn, |conn| {
            conn.execute_batch("BEGIN").map_err(transaction_error)
        })
        .await?;

        Ok(Box::new(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            committed: AtomicBool::new(false),
            rolled_back: AtomicBool::new(false),
        }))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).and_then(|v| v.as_str()).map(String::from))
            .collect())
    }
}

/// SQLite transaction
pub struct SqliteTransaction {
    conn: SharedConnection,
    committed: AtomicBool,
    rolled_back: AtomicBool,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        with_conn(&self.conn, move |conn| run_execute(conn, &sql, &params)).await
    }

    async fn execute_batch(&self, statements: &[(&str, &[Value])]) -> Result<Vec<u64>> {
        let statements: Vec<(String, Vec<Value>)> = statements
            .iter()
            .map(|(sql, params)| (sql.to_string(), params.to_vec()))
            .collect();

        with_conn(&self.conn, move |conn| {
            statements
                .iter()
                .map(|(sql, params)| run_execute(conn, sql, params))
                .collect::<Result<Vec<u64>>>()
        })
        .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        with_conn(&self.conn, |conn| {
            conn.execute_batch("COMMIT").map_err(transaction_error)
        })
        .await?;
        self.committed.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        with_conn(&self.conn, |conn| {
            conn.execute_batch("ROLLBACK").map_err(transaction_error)
        })
        .await?;
        self.rolled_back.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.committed.load(Ordering::Relaxed) && !self.rolled_back.load(Ordering::Relaxed) {
            let Ok(conn) = self.conn.lock() else {
                tracing::warn!("Auto-rollback on SqliteTransaction drop skipped: mutex poisoned");
                return;
            };
            if conn.is_autocommit() {
                return;
            }
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("Auto-rollback on SqliteTransaction drop failed: {}", e);
            } else {
                tracing::debug!("SqliteTransaction auto-rolled back on drop");
            }
        }
    }
}

/// SQLite connection factory
#[derive(Debug, Clone, Default)]
pub struct SqliteConnectionFactory;

impl SqliteConnectionFactory {
    /// Database location named by a connection URL
    pub fn database_path(url: &str) -> Result<PathBuf> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if path.is_empty() {
            return Err(Error::config(format!(
                "sqlite URL '{}' does not name a database",
                url
            )));
        }
        Ok(PathBuf::from(path))
    }

    fn is_memory(path: &std::path::Path) -> bool {
        path.as_os_str() == MEMORY_PATH
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let path = Self::database_path(&config.url)?;
        let busy_timeout = config
            .property::<u64>(BUSY_TIMEOUT_PROPERTY)?
            .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);

        let open = tokio::task::spawn_blocking(move || {
            let conn = if Self::is_memory(&path) {
                rusqlite::Connection::open_in_memory()
            } else {
                rusqlite::Connection::open(&path)
            }
            .map_err(|e| Error::connection_with_source("failed to open sqlite database", e))?;
            conn.busy_timeout(Duration::from_millis(busy_timeout))
                .map_err(|e| Error::connection_with_source("failed to set busy timeout", e))?;
            Ok::<_, Error>(conn)
        });

        let conn = tokio::time::timeout(config.connect_timeout, open)
            .await
            .map_err(|_| Error::connection("timed out opening sqlite database"))?
            .map_err(|e| Error::internal(format!("sqlite join error: {}", e)))??;

        Ok(Box::new(SqliteConnection::new(conn)))
    }

    fn check_shared_access(&self, config: &ConnectionConfig) -> Result<()> {
        if Self::is_memory(&Self::database_path(&config.url)?) {
            return Err(Error::config(format!(
                "'{}' opens a private database per connection; use a file path",
                config.url
            )));
        }
        Ok(())
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }
}
