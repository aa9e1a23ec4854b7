//! Named connection sources
//!
//! The record store never opens connections itself. It is handed a
//! [`DataSource`] at initialization (usually resolved by name from a
//! [`DataSourceRegistry`] owned by the surrounding system) and borrows one
//! [`ScopedConnection`] per operation.
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_recordstore::prelude::*;
//! use rivven_recordstore::sqlite::SqliteConnectionFactory;
//!
//! let mut registry = DataSourceRegistry::new();
//! registry.register(FactoryDataSource::new(
//!     "analytics",
//!     ConnectionConfig::new("sqlite:///var/lib/anx/records.db"),
//!     Arc::new(SqliteConnectionFactory),
//! ));
//!
//! let source = registry.resolve("analytics")?;
//! let conn = source.connection().await?;
//! // Connection is released when `conn` is dropped
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, DatabaseType};
use crate::error::{Error, Result};

/// A named source of database connections
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Name the source is registered under
    fn name(&self) -> &str;

    /// Database type behind this source
    fn database_type(&self) -> DatabaseType;

    /// Acquire a connection scoped to the caller
    async fn connection(&self) -> Result<ScopedConnection>;
}

/// A connection owned for the duration of one operation.
///
/// The connection is released when the guard is dropped, on success and
/// error paths alike.
pub struct ScopedConnection {
    conn: Option<Box<dyn Connection>>,
    source: String,
}

impl ScopedConnection {
    /// Wrap a connection acquired from `source`
    pub fn new(conn: Box<dyn Connection>, source: impl Into<String>) -> Self {
        Self {
            conn: Some(conn),
            source: source.into(),
        }
    }

    /// Name of the data source this connection came from
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::ops::Deref for ScopedConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("connection already released")
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::trace!(source = %self.source, "releasing connection");
            drop(conn);
        }
    }
}

/// Data source that opens a fresh connection per acquisition.
///
/// Acquisition fails with a configuration error when the factory reports
/// that separate connections would not share a database, as with
/// `sqlite::memory:`.
pub struct FactoryDataSource {
    name: String,
    config: ConnectionConfig,
    factory: Arc<dyn ConnectionFactory>,
}

impl FactoryDataSource {
    /// Create a data source from a connection config and factory
    pub fn new(
        name: impl Into<String>,
        config: ConnectionConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            factory,
        }
    }

    /// Connection configuration used for every acquisition
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl DataSource for FactoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn database_type(&self) -> DatabaseType {
        self.factory.database_type()
    }

    async fn connection(&self) -> Result<ScopedConnection> {
        self.factory.check_shared_access(&self.config)?;
        tracing::debug!(
            source = %self.name,
            url = %self.config.redacted_url(),
            "opening connection"
        );
        let conn = self.factory.connect(&self.config).await?;
        Ok(ScopedConnection::new(conn, self.name.clone()))
    }
}

/// Registry of named data sources, owned by the embedding application
#[derive(Default, Clone)]
pub struct DataSourceRegistry {
    sources: HashMap<String, Arc<dyn DataSource>>,
}

impl DataSourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data source under its own name, replacing any previous one
    pub fn register(&mut self, source: impl DataSource + 'static) -> &mut Self {
        let source: Arc<dyn DataSource> = Arc::new(source);
        self.sources.insert(source.name().to_string(), source);
        self
    }

    /// Register an already shared data source
    pub fn register_shared(&mut self, source: Arc<dyn DataSource>) -> &mut Self {
        self.sources.insert(source.name().to_string(), source);
        self
    }

    /// Resolve a data source by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DataSource>> {
        self.sources.get(name).cloned().ok_or_else(|| {
            Error::config(format!("Error in looking up data source: '{}' is not registered", name))
        })
    }

    /// Registered source names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
