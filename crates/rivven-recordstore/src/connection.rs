//! Backend seam for the record store
//!
//! The engine only ever talks to a database through three traits:
//! [`Connection`] for single statements and the catalog scan,
//! [`Transaction`] for the grouped writes of a mutating operation, and
//! [`ConnectionFactory`] for opening connections from a [`ConnectionConfig`].
//!
//! Statements carry JDBC-style `?` bind markers. A backend whose driver
//! expects another marker syntax rewrites them before execution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Property key for the connect timeout in milliseconds
pub const CONNECT_TIMEOUT_PROPERTY: &str = "connect_timeout_ms";

/// Property key for the session application name
pub const APPLICATION_NAME_PROPERTY: &str = "application_name";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An open database session.
///
/// A session ends when it is dropped.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a statement and collect every row it produces
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of rows it touched
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Start a transaction on this session
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Names of every table the session can see, as the catalog spells them
    async fn list_tables(&self) -> Result<Vec<String>>;
}

/// One unit of work.
///
/// A transaction ends through exactly one of [`commit`](Transaction::commit)
/// or [`rollback`](Transaction::rollback). Backends roll back a transaction
/// that is dropped without either.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Run a statement inside the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run statements in order, stopping at the first failure.
    ///
    /// Returns the affected row count of each statement.
    async fn execute_batch(&self, statements: &[(&str, &[Value])]) -> Result<Vec<u64>> {
        let mut counts = Vec::with_capacity(statements.len());
        for (sql, params) in statements {
            counts.push(self.execute(sql, params).await?);
        }
        Ok(counts)
    }

    /// Make the transaction's writes durable
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the transaction's writes
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Where and how to open connections
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Database URL, e.g. `postgres://anx@db/analytics` or `sqlite:///var/lib/anx.db`
    pub url: String,
    /// Upper bound on opening one connection
    pub connect_timeout: Duration,
    /// Session name reported to servers that track one
    pub application_name: Option<String>,
    /// Backend-specific settings
    pub properties: HashMap<String, String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.redacted_url())
            .field("connect_timeout", &self.connect_timeout)
            .field("application_name", &self.application_name)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            application_name: Some("rivven-recordstore".into()),
            properties: HashMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Configuration for `url` with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from flat string properties.
    ///
    /// `connect_timeout_ms` and `application_name` are lifted into their
    /// fields; every other key is kept as a backend property.
    pub fn from_properties(url: impl Into<String>, properties: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::new(url);
        for (key, value) in properties {
            match key.as_str() {
                CONNECT_TIMEOUT_PROPERTY => {
                    let ms = value.parse::<u64>().map_err(|_| {
                        Error::config(format!("invalid {} '{}'", CONNECT_TIMEOUT_PROPERTY, value))
                    })?;
                    config.connect_timeout = Duration::from_millis(ms);
                }
                APPLICATION_NAME_PROPERTY => config.application_name = Some(value.clone()),
                _ => {
                    config.properties.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(config)
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the application name
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Add a backend property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Parse a backend property, `None` when it is absent
    pub fn property<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.properties
            .get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| Error::config(format!("invalid {} '{}'", key, raw)))
            })
            .transpose()
    }

    /// URL with any password masked, safe for logs
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("***"));
                parsed.to_string()
            }
            Ok(_) => self.url.clone(),
            Err(_) => "***".to_string(),
        }
    }

    /// Database type implied by the URL scheme
    pub fn database_type(&self) -> DatabaseType {
        DatabaseType::from_url(&self.url)
    }
}

/// Opens connections for one backend
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Check that connections opened separately for `config` see the same
    /// database. Data sources that open a connection per operation rely on it.
    fn check_shared_access(&self, _config: &ConnectionConfig) -> Result<()> {
        Ok(())
    }

    /// Backend this factory speaks to
    fn database_type(&self) -> DatabaseType;
}

/// Database product behind a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// PostgreSQL
    PostgreSQL,
    /// MySQL/MariaDB
    MySQL,
    /// SQL Server
    SqlServer,
    /// SQLite
    SQLite,
    /// H2
    H2,
    /// Anything else
    Unknown,
}

impl DatabaseType {
    /// Guess the product from a URL scheme
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split_once(':').map_or(url, |(scheme, _)| scheme);
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Self::PostgreSQL,
            "mysql" | "mariadb" => Self::MySQL,
            "sqlserver" | "mssql" => Self::SqlServer,
            "sqlite" | "file" => Self::SQLite,
            "h2" => Self::H2,
            _ => Self::Unknown,
        }
    }

    /// Human-readable product name
    pub const fn name(self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SqlServer => "SQL Server",
            Self::SQLite => "SQLite",
            Self::H2 => "H2",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
