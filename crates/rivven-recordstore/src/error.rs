//! Error types for rivven-recordstore
//!
//! Every public store operation fails with exactly one [`Error`]. Backend
//! failures are wrapped in [`Error::Operation`] so callers can see which
//! operation and table failed without inspecting driver errors.
//!
//! Retries are never attempted at this layer; [`Error::is_retriable`] is a
//! hint for callers that want to retry on their own.

use std::fmt;
use thiserror::Error;

/// Result type for rivven-recordstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-related errors (retriable)
    Connection,
    /// Statement execution errors
    Query,
    /// Transaction begin/commit/rollback errors
    Transaction,
    /// Invalid or missing configuration
    Configuration,
    /// Caller supplied an argument the operation cannot accept
    InvalidArgument,
    /// Value blob could not be encoded or decoded
    Codec,
    /// Operation not available on this store
    Unsupported,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection)
    }
}

/// Main error type for rivven-recordstore
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection could not be opened or was lost
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction control failed
    #[error("transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Invalid caller input
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Record value encoding failed
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Unsupported operation for this store
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },

    /// A public store operation failed
    #[error("{operation} failed{}: {source}", table_suffix(.table))]
    Operation {
        operation: &'static str,
        table: Option<String>,
        #[source]
        source: Box<Error>,
    },
}

fn table_suffix(table: &Option<String>) -> String {
    match table {
        Some(t) => format!(" for table '{}'", t),
        None => String::new(),
    }
}

impl Error {
    /// Get the error category
    ///
    /// [`Error::Operation`] reports the category of the error it wraps.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::InvalidArgument { .. } => ErrorCategory::InvalidArgument,
            Self::Codec { .. } => ErrorCategory::Codec,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Internal { .. } => ErrorCategory::Other,
            Self::Operation { source, .. } => source.category(),
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Name of the failed store operation, if this error came from one
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Operation { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Wrap this error with the store operation and table it occurred in
    pub fn in_operation(self, operation: &'static str, table: Option<String>) -> Self {
        Self::Operation {
            operation,
            table,
            source: Box::new(self),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Self::codec(e.to_string())
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Transaction => write!(f, "transaction"),
            Self::Configuration => write!(f, "configuration"),
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::Codec => write!(f, "codec"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Other => write!(f, "other"),
        }
    }
}
