//! Value and record types for rivven-recordstore
//!
//! - [`Value`]: typed value stored inside a record or bound to a statement
//! - [`Row`]: a backend result row
//! - [`Column`] / [`Record`]: the analytics record model

use serde::{Deserialize, Serialize};

/// Typed value held by a record column or bound as a statement parameter
///
/// **WARNING**: Variant order must remain stable for postcard serialization compatibility.
/// Adding new variants should only be done at the end of the enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Text string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Int64(n) => Some(*n as f64),
            Self::Float32(n) => Some(f64::from(*n)),
            Self::Float64(n) => Some(*n),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to convert to bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b.as_slice()),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Take ownership of the values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A named value inside a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column value
    pub value: Value,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A time-stamped analytics record.
///
/// Identity is `(category_id, table_name, id)`. Records are immutable once
/// built; the store only ever creates them from rows it reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: String,
    category_id: i64,
    table_name: String,
    timestamp: i64,
    values: Vec<Column>,
}

impl Record {
    /// Create a record
    pub fn new(
        id: impl Into<String>,
        category_id: i64,
        table_name: impl Into<String>,
        timestamp: i64,
        values: Vec<Column>,
    ) -> Self {
        Self {
            id: id.into(),
            category_id,
            table_name: table_name.into(),
            timestamp,
            values,
        }
    }

    /// Caller-assigned record id
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Category (tenant/namespace) the record's table belongs to
    #[inline]
    pub fn category_id(&self) -> i64 {
        self.category_id
    }

    /// Logical table name
    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Epoch milliseconds
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Record values in insertion order
    #[inline]
    pub fn values(&self) -> &[Column] {
        &self.values
    }

    /// Get a value by column name
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.value)
    }
}
