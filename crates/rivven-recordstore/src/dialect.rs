//! SQL dialect descriptors for rivven-recordstore
//!
//! A [`DialectDescriptor`] is pure data: the query templates a backend uses
//! for record storage and the pagination convention its range query expects.
//! The store engine is the same for every backend; only the descriptor
//! changes.
//!
//! Templates may contain exactly two tokens:
//! - `{{TABLE_NAME}}`: replaced with the physical table name
//! - `{{RECORD_IDS}}`: replaced with `?,?,...`, one marker per id
//!
//! Parameters are bound in a fixed order per template:
//!
//! | template | parameters |
//! |---|---|
//! | `record_insert_query` | id, timestamp, data |
//! | `record_retrieval_query` | time from, time to, pagination first, pagination second |
//! | `record_retrieval_with_ids_query` | ids |
//! | `record_deletion_query` | time from, time to |
//! | `record_deletion_with_ids_query` | ids |
//!
//! Both retrieval templates must select `record_id, record_timestamp, record_data`
//! in that order.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use crate::connection::DatabaseType;
use crate::error::{Error, Result};

/// Token replaced with the physical table name
pub const TABLE_NAME_PLACEHOLDER: &str = "{{TABLE_NAME}}";

/// Token replaced with the dynamic `?,?,...` id list
pub const RECORD_IDS_PLACEHOLDER: &str = "{{RECORD_IDS}}";

/// Matches any `{{...}}` token in a template
static TOKEN_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\{\{[^{}]*\}\}").expect("template token regex is invalid - this is a bug")
});

/// How a backend interprets the two parameters of its paginated range query.
///
/// The store's own contract is zero-indexed, inclusive, count-of-rows; these
/// flags describe what the backend expects instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaginationSemantics {
    /// The start parameter is 0-based
    pub first_zero_indexed: bool,
    /// The start parameter is inclusive
    pub first_inclusive: bool,
    /// The second parameter is a row count rather than an absolute end position
    pub second_length: bool,
    /// The end parameter is 0-based (only when `second_length` is false)
    pub second_zero_indexed: bool,
    /// The end parameter is inclusive (only when `second_length` is false)
    pub second_inclusive: bool,
}

impl PaginationSemantics {
    /// `OFFSET n LIMIT m` style: zero-indexed inclusive offset plus a row count
    pub const OFFSET_LIMIT: Self = Self {
        first_zero_indexed: true,
        first_inclusive: true,
        second_length: true,
        second_zero_indexed: true,
        second_inclusive: true,
    };
}

impl Default for PaginationSemantics {
    fn default() -> Self {
        Self::OFFSET_LIMIT
    }
}

/// Raw dialect configuration, as written in YAML or built in code.
///
/// Turn it into a [`DialectDescriptor`] with [`DialectDescriptor::new`],
/// which validates every template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialectConfig {
    /// Dialect name, used in logs
    pub name: String,
    /// DDL creating the store's bookkeeping tables, run in order
    pub system_table_init_queries: Vec<String>,
    /// Probe that succeeds only when the bookkeeping tables exist
    pub system_table_check_query: String,
    /// DDL creating one record table, run in order
    pub record_table_init_queries: Vec<String>,
    /// DDL dropping one record table, run in order
    pub record_table_delete_queries: Vec<String>,
    /// Insert (or upsert) of a single record
    pub record_insert_query: String,
    /// Paginated time-range select
    pub record_retrieval_query: String,
    /// Select by id list
    pub record_retrieval_with_ids_query: String,
    /// Time-range delete
    pub record_deletion_query: String,
    /// Delete by id list
    pub record_deletion_with_ids_query: String,
    /// Pagination convention of `record_retrieval_query`
    #[serde(default)]
    pub pagination: PaginationSemantics,
}

/// Validated, immutable SQL dialect descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectDescriptor {
    config: DialectConfig,
}

impl DialectDescriptor {
    /// Validate a dialect configuration.
    ///
    /// Fails with a configuration error if a template is empty, uses an
    /// unknown `{{...}}` token, uses `{{RECORD_IDS}}` outside the by-ids
    /// templates, or omits a token it needs.
    pub fn new(config: DialectConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(Error::config("dialect name cannot be empty"));
        }

        let name = config.name.as_str();
        non_empty_list(name, "system_table_init_queries", &config.system_table_init_queries)?;
        non_empty_list(name, "record_table_init_queries", &config.record_table_init_queries)?;
        non_empty_list(name, "record_table_delete_queries", &config.record_table_delete_queries)?;

        for query in &config.system_table_init_queries {
            check_template(name, "system_table_init_queries", query, Needs::Nothing)?;
        }
        check_template(
            name,
            "system_table_check_query",
            &config.system_table_check_query,
            Needs::Nothing,
        )?;
        for query in &config.record_table_init_queries {
            check_template(name, "record_table_init_queries", query, Needs::TableName)?;
        }
        for query in &config.record_table_delete_queries {
            check_template(name, "record_table_delete_queries", query, Needs::TableName)?;
        }
        check_template(
            name,
            "record_insert_query",
            &config.record_insert_query,
            Needs::TableName,
        )?;
        check_template(
            name,
            "record_retrieval_query",
            &config.record_retrieval_query,
            Needs::TableName,
        )?;
        check_template(
            name,
            "record_retrieval_with_ids_query",
            &config.record_retrieval_with_ids_query,
            Needs::TableNameAndIds,
        )?;
        check_template(
            name,
            "record_deletion_query",
            &config.record_deletion_query,
            Needs::TableName,
        )?;
        check_template(
            name,
            "record_deletion_with_ids_query",
            &config.record_deletion_with_ids_query,
            Needs::TableNameAndIds,
        )?;

        Ok(Self { config })
    }

    /// Parse and validate a dialect from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: DialectConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse dialect: {}", e)))?;
        Self::new(config)
    }

    /// Load and validate a dialect from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read dialect file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// The underlying configuration
    pub fn config(&self) -> &DialectConfig {
        &self.config
    }

    /// Dialect name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Bookkeeping table DDL
    pub fn system_table_init_queries(&self) -> &[String] {
        &self.config.system_table_init_queries
    }

    /// Bookkeeping table probe
    pub fn system_table_check_query(&self) -> &str {
        &self.config.system_table_check_query
    }

    /// Record table DDL templates
    pub fn record_table_init_queries(&self) -> &[String] {
        &self.config.record_table_init_queries
    }

    /// Record table drop templates
    pub fn record_table_delete_queries(&self) -> &[String] {
        &self.config.record_table_delete_queries
    }

    /// Record insert template
    pub fn record_insert_query(&self) -> &str {
        &self.config.record_insert_query
    }

    /// Paginated range select template
    pub fn record_retrieval_query(&self) -> &str {
        &self.config.record_retrieval_query
    }

    /// Select-by-ids template
    pub fn record_retrieval_with_ids_query(&self) -> &str {
        &self.config.record_retrieval_with_ids_query
    }

    /// Range delete template
    pub fn record_deletion_query(&self) -> &str {
        &self.config.record_deletion_query
    }

    /// Delete-by-ids template
    pub fn record_deletion_with_ids_query(&self) -> &str {
        &self.config.record_deletion_with_ids_query
    }

    /// Pagination convention of the range select
    pub fn pagination(&self) -> PaginationSemantics {
        self.config.pagination
    }

    /// SQLite: `LIMIT offset, count`, `INSERT OR REPLACE`
    pub fn sqlite() -> Self {
        Self {
            config: DialectConfig {
                name: "SQLite".into(),
                system_table_init_queries: vec![
                    "CREATE TABLE ANX_META (meta_key VARCHAR(256) NOT NULL PRIMARY KEY, meta_value BLOB)".into(),
                ],
                system_table_check_query: "SELECT meta_key FROM ANX_META WHERE 1 = 0".into(),
                record_table_init_queries: vec![
                    "CREATE TABLE {{TABLE_NAME}} (record_id VARCHAR(50) NOT NULL PRIMARY KEY, record_timestamp INTEGER NOT NULL, record_data BLOB)".into(),
                    "CREATE INDEX {{TABLE_NAME}}_TS ON {{TABLE_NAME}} (record_timestamp)".into(),
                ],
                record_table_delete_queries: vec!["DROP TABLE {{TABLE_NAME}}".into()],
                record_insert_query: "INSERT OR REPLACE INTO {{TABLE_NAME}} (record_id, record_timestamp, record_data) VALUES (?, ?, ?)".into(),
                record_retrieval_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ? ORDER BY record_timestamp, record_id LIMIT ?, ?".into(),
                record_retrieval_with_ids_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                record_deletion_query: "DELETE FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ?".into(),
                record_deletion_with_ids_query: "DELETE FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                pagination: PaginationSemantics::OFFSET_LIMIT,
            },
        }
    }

    /// PostgreSQL: `OFFSET n LIMIT m`, `ON CONFLICT` upsert
    pub fn postgresql() -> Self {
        Self {
            config: DialectConfig {
                name: "PostgreSQL".into(),
                system_table_init_queries: vec![
                    "CREATE TABLE ANX_META (meta_key VARCHAR(256) NOT NULL PRIMARY KEY, meta_value BYTEA)".into(),
                ],
                system_table_check_query: "SELECT meta_key FROM ANX_META WHERE 1 = 0".into(),
                record_table_init_queries: vec![
                    "CREATE TABLE {{TABLE_NAME}} (record_id VARCHAR(50) NOT NULL PRIMARY KEY, record_timestamp BIGINT NOT NULL, record_data BYTEA)".into(),
                    "CREATE INDEX {{TABLE_NAME}}_TS ON {{TABLE_NAME}} (record_timestamp)".into(),
                ],
                record_table_delete_queries: vec!["DROP TABLE {{TABLE_NAME}}".into()],
                record_insert_query: "INSERT INTO {{TABLE_NAME}} (record_id, record_timestamp, record_data) VALUES (?, ?, ?) ON CONFLICT (record_id) DO UPDATE SET record_timestamp = EXCLUDED.record_timestamp, record_data = EXCLUDED.record_data".into(),
                record_retrieval_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ? ORDER BY record_timestamp, record_id OFFSET ? LIMIT ?".into(),
                record_retrieval_with_ids_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                record_deletion_query: "DELETE FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ?".into(),
                record_deletion_with_ids_query: "DELETE FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                pagination: PaginationSemantics::OFFSET_LIMIT,
            },
        }
    }

    /// MySQL/MariaDB: `LIMIT offset, count`, `ON DUPLICATE KEY` upsert
    pub fn mysql() -> Self {
        Self {
            config: DialectConfig {
                name: "MySQL".into(),
                system_table_init_queries: vec![
                    "CREATE TABLE ANX_META (meta_key VARCHAR(256) NOT NULL PRIMARY KEY, meta_value LONGBLOB)".into(),
                ],
                system_table_check_query: "SELECT meta_key FROM ANX_META WHERE 1 = 0".into(),
                record_table_init_queries: vec![
                    "CREATE TABLE {{TABLE_NAME}} (record_id VARCHAR(50) NOT NULL PRIMARY KEY, record_timestamp BIGINT NOT NULL, record_data LONGBLOB)".into(),
                    "CREATE INDEX {{TABLE_NAME}}_TS ON {{TABLE_NAME}} (record_timestamp)".into(),
                ],
                record_table_delete_queries: vec!["DROP TABLE {{TABLE_NAME}}".into()],
                record_insert_query: "INSERT INTO {{TABLE_NAME}} (record_id, record_timestamp, record_data) VALUES (?, ?, ?) ON DUPLICATE KEY UPDATE record_timestamp = VALUES(record_timestamp), record_data = VALUES(record_data)".into(),
                record_retrieval_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ? ORDER BY record_timestamp, record_id LIMIT ?, ?".into(),
                record_retrieval_with_ids_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                record_deletion_query: "DELETE FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ?".into(),
                record_deletion_with_ids_query: "DELETE FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                pagination: PaginationSemantics::OFFSET_LIMIT,
            },
        }
    }

    /// SQL Server: `OFFSET n ROWS FETCH NEXT m ROWS ONLY`, `MERGE` upsert
    pub fn sqlserver() -> Self {
        Self {
            config: DialectConfig {
                name: "SQL Server".into(),
                system_table_init_queries: vec![
                    "CREATE TABLE ANX_META (meta_key VARCHAR(256) NOT NULL PRIMARY KEY, meta_value VARBINARY(MAX))".into(),
                ],
                system_table_check_query: "SELECT meta_key FROM ANX_META WHERE 1 = 0".into(),
                record_table_init_queries: vec![
                    "CREATE TABLE {{TABLE_NAME}} (record_id VARCHAR(50) NOT NULL PRIMARY KEY, record_timestamp BIGINT NOT NULL, record_data VARBINARY(MAX))".into(),
                    "CREATE INDEX {{TABLE_NAME}}_TS ON {{TABLE_NAME}} (record_timestamp)".into(),
                ],
                record_table_delete_queries: vec!["DROP TABLE {{TABLE_NAME}}".into()],
                record_insert_query: "MERGE {{TABLE_NAME}} AS t USING (SELECT ? AS record_id, ? AS record_timestamp, ? AS record_data) AS s ON t.record_id = s.record_id WHEN MATCHED THEN UPDATE SET t.record_timestamp = s.record_timestamp, t.record_data = s.record_data WHEN NOT MATCHED THEN INSERT (record_id, record_timestamp, record_data) VALUES (s.record_id, s.record_timestamp, s.record_data);".into(),
                record_retrieval_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ? ORDER BY record_timestamp, record_id OFFSET ? ROWS FETCH NEXT ? ROWS ONLY".into(),
                record_retrieval_with_ids_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                record_deletion_query: "DELETE FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ?".into(),
                record_deletion_with_ids_query: "DELETE FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                pagination: PaginationSemantics::OFFSET_LIMIT,
            },
        }
    }

    /// H2: `OFFSET n ROWS FETCH NEXT m ROWS ONLY`, `MERGE ... KEY` upsert
    pub fn h2() -> Self {
        Self {
            config: DialectConfig {
                name: "H2".into(),
                system_table_init_queries: vec![
                    "CREATE TABLE ANX_META (meta_key VARCHAR(256) NOT NULL PRIMARY KEY, meta_value BINARY)".into(),
                ],
                system_table_check_query: "SELECT meta_key FROM ANX_META WHERE 1 = 0".into(),
                record_table_init_queries: vec![
                    "CREATE TABLE {{TABLE_NAME}} (record_id VARCHAR(50) NOT NULL PRIMARY KEY, record_timestamp BIGINT NOT NULL, record_data BINARY)".into(),
                    "CREATE INDEX {{TABLE_NAME}}_TS ON {{TABLE_NAME}} (record_timestamp)".into(),
                ],
                record_table_delete_queries: vec!["DROP TABLE {{TABLE_NAME}}".into()],
                record_insert_query: "MERGE INTO {{TABLE_NAME}} (record_id, record_timestamp, record_data) KEY (record_id) VALUES (?, ?, ?)".into(),
                record_retrieval_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ? ORDER BY record_timestamp, record_id OFFSET ? ROWS FETCH NEXT ? ROWS ONLY".into(),
                record_retrieval_with_ids_query: "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                record_deletion_query: "DELETE FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ?".into(),
                record_deletion_with_ids_query: "DELETE FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into(),
                pagination: PaginationSemantics::OFFSET_LIMIT,
            },
        }
    }

    /// Built-in descriptor for a database type, if one ships with the crate
    pub fn for_database(database: DatabaseType) -> Option<Self> {
        match database {
            DatabaseType::PostgreSQL => Some(Self::postgresql()),
            DatabaseType::MySQL => Some(Self::mysql()),
            DatabaseType::SqlServer => Some(Self::sqlserver()),
            DatabaseType::SQLite => Some(Self::sqlite()),
            DatabaseType::H2 => Some(Self::h2()),
            DatabaseType::Unknown => None,
        }
    }
}

/// Look up a built-in dialect by name
pub fn dialect_for(name: &str) -> Result<DialectDescriptor> {
    match name.to_lowercase().as_str() {
        "sqlite" => Ok(DialectDescriptor::sqlite()),
        "postgres" | "postgresql" => Ok(DialectDescriptor::postgresql()),
        "mysql" | "mariadb" => Ok(DialectDescriptor::mysql()),
        "sqlserver" | "mssql" => Ok(DialectDescriptor::sqlserver()),
        "h2" => Ok(DialectDescriptor::h2()),
        other => Err(Error::config(format!("unknown SQL dialect '{}'", other))),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Needs {
    Nothing,
    TableName,
    TableNameAndIds,
}

fn non_empty_list(dialect: &str, field: &str, queries: &[String]) -> Result<()> {
    if queries.is_empty() {
        return Err(Error::config(format!(
            "dialect '{}': {} must contain at least one query",
            dialect, field
        )));
    }
    Ok(())
}

fn check_template(dialect: &str, field: &str, template: &str, needs: Needs) -> Result<()> {
    if template.trim().is_empty() {
        return Err(Error::config(format!(
            "dialect '{}': {} cannot be empty",
            dialect, field
        )));
    }

    for token in TOKEN_REGEX.find_iter(template) {
        match token.as_str() {
            TABLE_NAME_PLACEHOLDER => {}
            RECORD_IDS_PLACEHOLDER if needs == Needs::TableNameAndIds => {}
            RECORD_IDS_PLACEHOLDER => {
                return Err(Error::config(format!(
                    "dialect '{}': {} may not use {}",
                    dialect, field, RECORD_IDS_PLACEHOLDER
                )));
            }
            other => {
                return Err(Error::config(format!(
                    "dialect '{}': {} uses unknown placeholder {}",
                    dialect, field, other
                )));
            }
        }
    }

    let stripped = TOKEN_REGEX.replace_all(template, "");
    if stripped.contains("{{") || stripped.contains("}}") {
        return Err(Error::config(format!(
            "dialect '{}': {} contains an unterminated placeholder",
            dialect, field
        )));
    }

    if needs != Needs::Nothing && !template.contains(TABLE_NAME_PLACEHOLDER) {
        return Err(Error::config(format!(
            "dialect '{}': {} must reference {}",
            dialect, field, TABLE_NAME_PLACEHOLDER
        )));
    }
    if needs == Needs::TableNameAndIds && !template.contains(RECORD_IDS_PLACEHOLDER) {
        return Err(Error::config(format!(
            "dialect '{}': {} must reference {}",
            dialect, field, RECORD_IDS_PLACEHOLDER
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_builtin_dialects_validate() {
        for dialect in [
            DialectDescriptor::sqlite(),
            DialectDescriptor::postgresql(),
            DialectDescriptor::mysql(),
            DialectDescriptor::sqlserver(),
            DialectDescriptor::h2(),
        ] {
            let revalidated = DialectDescriptor::new(dialect.config().clone());
            assert!(revalidated.is_ok(), "{} failed validation", dialect.name());
        }
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let mut config = DialectDescriptor::sqlite().config().clone();
        config.record_deletion_query =
            "DELETE FROM {{TABLE_NAME}} WHERE tenant = {{TENANT}}".into();

        let err = DialectDescriptor::new(config).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("{{TENANT}}"));
    }

    #[test]
    fn test_unterminated_placeholder_rejected() {
        let mut config = DialectDescriptor::sqlite().config().clone();
        config.record_insert_query = "INSERT INTO {{TABLE_NAME (a) VALUES (?)".into();
        assert!(DialectDescriptor::new(config).is_err());
    }

    #[test]
    fn test_record_ids_only_in_id_templates() {
        let mut config = DialectDescriptor::sqlite().config().clone();
        config.record_deletion_query =
            "DELETE FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})".into();
        assert!(DialectDescriptor::new(config).is_err());
    }

    #[test]
    fn test_missing_required_tokens_rejected() {
        let mut config = DialectDescriptor::sqlite().config().clone();
        config.record_retrieval_with_ids_query =
            "SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}}".into();
        assert!(DialectDescriptor::new(config).is_err());

        let mut config = DialectDescriptor::sqlite().config().clone();
        config.record_table_init_queries = vec!["CREATE TABLE events (id INT)".into()];
        assert!(DialectDescriptor::new(config).is_err());

        let mut config = DialectDescriptor::sqlite().config().clone();
        config.record_table_delete_queries.clear();
        assert!(DialectDescriptor::new(config).is_err());
    }

    #[test]
    fn test_dialect_selection() {
        assert_eq!(dialect_for("postgres").unwrap().name(), "PostgreSQL");
        assert_eq!(dialect_for("SQLite").unwrap().name(), "SQLite");
        assert_eq!(dialect_for("mssql").unwrap().name(), "SQL Server");
        assert!(dialect_for("oracle").is_err());

        assert_eq!(
            DialectDescriptor::for_database(DatabaseType::MySQL)
                .unwrap()
                .name(),
            "MySQL"
        );
        assert!(DialectDescriptor::for_database(DatabaseType::Unknown).is_none());
    }
}
