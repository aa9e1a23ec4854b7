//! # rivven-recordstore
//!
//! Dialect-agnostic relational storage for time-stamped analytics records.
//!
//! Records are schema-less: an id, a timestamp and an ordered set of named
//! values, grouped into logical tables that are partitioned by a numeric
//! category. Each logical table lives in one physical table named
//! `ANX_<category>_<table>`. The values travel as one opaque blob.
//!
//! ## Features
//!
//! - **Dialect Descriptors**: query templates and pagination conventions as data, loadable from YAML
//! - **Query Translation**: table name substitution, dynamic id lists, pagination normalization
//! - **Record Store Engine**: one connection and one transaction per operation, rollback on failure
//! - **Pluggable Codec**: postcard-encoded value blobs with column projection on read
//! - **Injected Data Sources**: named connection sources resolved from a caller-owned registry
//!
//! ## Quick Start
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
//! let properties = HashMap::from([("datasource".to_string(), "analytics".to_string())]);
//! let store = RdbmsRecordStore::init(properties, &registry)?;
//! store.bootstrap().await?;
//!
//! store.create_table(1, "events").await?;
//! store
//!     .put(&[Record::new("r1", 1, "events", 1000, vec![Column::new("x", 1)])])
//!     .await?;
//!
//! let page = store.get_records(1, "events", None, -1, -1, 0, 10).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` - SQLite support via rusqlite (default)
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `full` - All features enabled

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod connection;
pub mod datasource;
pub mod dialect;
pub mod error;
pub mod security;
pub mod store;
pub mod translator;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and record model
    pub use crate::types::{Column, Record, Row, Value};

    // Connection traits and config
    pub use crate::connection::{
        Connection, ConnectionConfig, ConnectionFactory, DatabaseType, Transaction,
    };

    // Data sources
    pub use crate::datasource::{
        DataSource, DataSourceRegistry, FactoryDataSource, ScopedConnection,
    };

    // Dialect types
    pub use crate::dialect::{dialect_for, DialectConfig, DialectDescriptor, PaginationSemantics};

    // Translation helpers
    pub use crate::translator::{
        normalize_pagination, normalize_time_range, physical_table_name, TableIdentity,
        UNBOUNDED, UNBOUNDED_COUNT,
    };

    // Store
    pub use crate::codec::{PostcardCodec, RecordCodec};
    pub use crate::config::{EmptyIdLookup, StoreConfig};
    pub use crate::store::{LockProvider, RdbmsRecordStore, RecordStore};

    pub use std::collections::HashMap;
    pub use std::sync::Arc;
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use store::{RdbmsRecordStore, RecordStore};
pub use types::{Column, Record, Value};

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _value = Value::Int32(42);
        let _config = ConnectionConfig::new("sqlite::memory:");
        let _store_config = StoreConfig::new("analytics");
        let _mode = EmptyIdLookup::default();
    }

    #[test]
    fn test_error_types() {
        let err = Error::connection("test error");
        assert!(err.is_retriable());
        assert_eq!(err.category(), ErrorCategory::Connection);
    }

    #[test]
    fn test_dialect_selection() {
        assert_eq!(dialect_for("postgres").unwrap().name(), "PostgreSQL");
        assert_eq!(dialect_for("mysql").unwrap().name(), "MySQL");
        assert_eq!(dialect_for("sqlserver").unwrap().name(), "SQL Server");
    }

    #[test]
    fn test_record_identity() {
        let record = Record::new("r1", 2, "clicks", 5, vec![Column::new("n", 1_i64)]);
        let identity = TableIdentity::new(record.category_id(), record.table_name());
        assert_eq!(identity.physical_name().unwrap(), "ANX_2_clicks");
    }
}
