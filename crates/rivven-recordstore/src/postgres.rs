//! PostgreSQL backend implementation for rivven-recordstore
//!
//! Statements arrive with `?` bind markers and are rewritten to `$1..$n`
//! before they reach the server. Unquoted identifiers fold to lowercase in
//! PostgreSQL, so catalog names come back as `anx_<cat>_<table>`; the store
//! compares them case-insensitively.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, DatabaseType, Transaction};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

type PgParam = Box<dyn tokio_postgres::types::ToSql + Sync + Send>;

/// Convert a Value to a tokio-postgres compatible parameter
fn value_to_sql(value: &Value) -> PgParam {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Int32(n) => Box::new(*n),
        Value::Int64(n) => Box::new(*n),
        Value::Float32(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
    }
}

/// Convert a tokio-postgres row to a Row
fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Row {
    let columns: Vec<String> = pg_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let values: Vec<Value> = pg_row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| pg_value_to_value(pg_row, i, col.type_()))
        .collect();

    Row::new(columns, values)
}

/// Convert a PostgreSQL value to a Value
fn pg_value_to_value(
    row: &tokio_postgres::Row,
    idx: usize,
    pg_type: &tokio_postgres::types::Type,
) -> Value {
    use tokio_postgres::types::Type;

    match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|n| Value::Int32(i32::from(n)))
            .unwrap_or(Value::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(Value::Int32)
            .unwrap_or(Value::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int64)
            .unwrap_or(Value::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(Value::Float32)
            .unwrap_or(Value::Null),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Rewrite `?` bind markers to `$1..$n`, leaving quoted text untouched
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut in_string = false;
    let mut in_identifier = false;

    for c in sql.chars() {
        match c {
            '\'' if !in_identifier => {
                in_string = !in_string;
                out.push(c);
            }
            '"' if !in_string => {
                in_identifier = !in_identifier;
                out.push(c);
            }
            '?' if !in_string && !in_identifier => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

async fn run_query(client: &tokio_postgres::Client, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let sql = rewrite_placeholders(sql);
    let boxed_params: Vec<PgParam> = params.iter().map(value_to_sql).collect();
    let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = boxed_params
        .iter()
        .map(|b| b.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect();

    let pg_rows = client
        .query(sql.as_str(), &param_refs)
        .await
        .map_err(|e| query_error(e, &sql))?;

    Ok(pg_rows.iter().map(pg_row_to_row).collect())
}

async fn run_execute(client: &tokio_postgres::Client, sql: &str, params: &[Value]) -> Result<u64> {
    let sql = rewrite_placeholders(sql);
    let boxed_params: Vec<PgParam> = params.iter().map(value_to_sql).collect();
    let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = boxed_params
        .iter()
        .map(|b| b.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect();

    client
        .execute(sql.as_str(), &param_refs)
        .await
        .map_err(|e| query_error(e, &sql))
}

fn query_error(e: tokio_postgres::Error, sql: &str) -> Error {
    if e.is_closed() {
        return Error::connection_with_source("connection closed", e);
    }
    Error::Query {
        message: e.to_string(),
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

fn transaction_error(e: tokio_postgres::Error) -> Error {
    Error::Transaction {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

/// PostgreSQL connection
pub struct PgConnection {
    client: Arc<tokio_postgres::Client>,
}

impl PgConnection {
    /// Create a new connection from a tokio-postgres client
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        run_query(&self.client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        run_execute(&self.client, sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(transaction_error)?;

        Ok(Box::new(PgTransaction {
            client: Arc::clone(&self.client),
            committed: AtomicBool::new(false),
            rolled_back: AtomicBool::new(false),
        }))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).and_then(|v| v.as_str()).map(String::from))
            .collect())
    }
}

/// PostgreSQL transaction
pub struct PgTransaction {
    client: Arc<tokio_postgres::Client>,
    committed: AtomicBool,
    rolled_back: AtomicBool,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        run_execute(&self.client, sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(transaction_error)?;
        self.committed.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(transaction_error)?;
        self.rolled_back.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if !self.committed.load(Ordering::Relaxed) && !self.rolled_back.load(Ordering::Relaxed) {
            let client = Arc::clone(&self.client);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = client.batch_execute("ROLLBACK").await {
                            tracing::warn!("Auto-rollback on PgTransaction drop failed: {}", e);
                        } else {
                            tracing::debug!("PgTransaction auto-rolled back on drop");
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!("PgTransaction dropped outside a runtime, rollback skipped");
                }
            }
        }
    }
}

/// PostgreSQL connection factory
#[derive(Debug, Clone, Default)]
pub struct PgConnectionFactory;

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let mut pg_config: tokio_postgres::Config = config
            .url
            .parse()
            .map_err(|e| Error::config(format!("invalid PostgreSQL URL: {}", e)))?;
        let timeout = config.connect_timeout;
        pg_config.connect_timeout(timeout);
        if let Some(name) = &config.application_name {
            pg_config.application_name(name);
        }

        let (client, connection) =
            tokio::time::timeout(timeout, pg_config.connect(tokio_postgres::NoTls))
                .await
                .map_err(|_| Error::connection("timed out connecting to PostgreSQL"))?
                .map_err(|e| Error::connection_with_source("failed to connect", e))?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Box::new(PgConnection::new(client)))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}
