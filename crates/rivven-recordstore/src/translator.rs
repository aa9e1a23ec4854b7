//! Query translation
//!
//! Turns dialect templates into executable statements and maps the store's
//! pagination contract onto the backend's.

use crate::dialect::{PaginationSemantics, RECORD_IDS_PLACEHOLDER, TABLE_NAME_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::security::validate_sql_identifier;

/// Prefix every managed table carries
pub const TABLE_PREFIX: &str = "ANX";

/// Row count used when the caller asks for "all remaining rows"
pub const UNBOUNDED_COUNT: i64 = i32::MAX as i64;

/// Caller sentinel for "unbounded" in time and pagination arguments
pub const UNBOUNDED: i64 = -1;

/// A logical table within a category.
///
/// Not stored anywhere; the physical name is derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    /// Category (tenant/namespace)
    pub category_id: i64,
    /// Logical table name
    pub table_name: String,
}

impl TableIdentity {
    /// Create a table identity
    pub fn new(category_id: i64, table_name: impl Into<String>) -> Self {
        Self {
            category_id,
            table_name: table_name.into(),
        }
    }

    /// Validated physical table name
    pub fn physical_name(&self) -> Result<String> {
        physical_table_name(self.category_id, &self.table_name)
    }
}

/// Prefix shared by every physical table of a category, e.g. `ANX_3_`
pub fn table_prefix(category_id: i64) -> String {
    format!("{}_{}_", TABLE_PREFIX, category_id)
}

/// Physical name for a logical table, validated as a SQL identifier.
///
/// The name is spliced into templates as text, so anything that is not a
/// plain identifier is rejected here.
pub fn physical_table_name(category_id: i64, table_name: &str) -> Result<String> {
    if table_name.is_empty() {
        return Err(Error::invalid_argument("table name cannot be empty"));
    }
    let name = format!("{}{}", table_prefix(category_id), table_name);
    validate_sql_identifier(&name)?;
    Ok(name)
}

/// Logical name of a physical table if it belongs to `category_id`.
///
/// Comparison is case-insensitive; the result is uppercased.
pub fn logical_table_name(physical: &str, category_id: i64) -> Option<String> {
    let upper = physical.to_uppercase();
    let prefix = table_prefix(category_id).to_uppercase();
    match upper.strip_prefix(&prefix) {
        Some(rest) if !rest.is_empty() => Some(rest.to_string()),
        _ => None,
    }
}

/// Replace `{{TABLE_NAME}}` with the validated physical table name
pub fn with_table_name(template: &str, category_id: i64, table_name: &str) -> Result<String> {
    let physical = physical_table_name(category_id, table_name)?;
    Ok(template.replace(TABLE_NAME_PLACEHOLDER, &physical))
}

/// Replace `{{RECORD_IDS}}` with `count` comma-separated bind markers
pub fn with_id_params(template: &str, count: usize) -> Result<String> {
    if count == 0 {
        return Err(Error::invalid_argument(
            "id list must contain at least one id",
        ));
    }
    let markers = vec!["?"; count].join(",");
    Ok(template.replace(RECORD_IDS_PLACEHOLDER, &markers))
}

/// Map a `(records_from, records_count)` request onto the backend's
/// pagination convention.
///
/// The request is zero-indexed, inclusive of `from`, and counts rows; `-1`
/// in either position means unbounded.
pub fn normalize_pagination(semantics: PaginationSemantics, from: i64, count: i64) -> (i64, i64) {
    let mut from = if from == UNBOUNDED { 0 } else { from };
    let mut count = if count == UNBOUNDED {
        UNBOUNDED_COUNT
    } else {
        count
    };

    from = from
        .saturating_add(i64::from(!semantics.first_zero_indexed))
        .saturating_add(i64::from(!semantics.first_inclusive));

    if count != UNBOUNDED_COUNT && !semantics.second_length {
        count = count
            .saturating_add(i64::from(!semantics.second_zero_indexed))
            .saturating_add(i64::from(!semantics.second_inclusive));
    }

    (from, count)
}

/// Map `-1` time bounds onto the full `i64` range
pub fn normalize_time_range(from: i64, to: i64) -> (i64, i64) {
    let from = if from == UNBOUNDED { i64::MIN } else { from };
    let to = if to == UNBOUNDED { i64::MAX } else { to };
    (from, to)
}
