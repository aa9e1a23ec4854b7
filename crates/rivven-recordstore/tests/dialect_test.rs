//! Unit tests for rivven-recordstore dialect module

use rivven_recordstore::connection::DatabaseType;
use rivven_recordstore::dialect::{
    dialect_for, DialectDescriptor, PaginationSemantics, RECORD_IDS_PLACEHOLDER,
    TABLE_NAME_PLACEHOLDER,
};
use rivven_recordstore::error::ErrorCategory;
use std::io::Write;

const ORACLE_LIKE: &str = r#"
name: RowNum
system_table_init_queries:
  - CREATE TABLE ANX_META (meta_key VARCHAR2(256) PRIMARY KEY, meta_value BLOB)
system_table_check_query: SELECT meta_key FROM ANX_META WHERE 1 = 0
record_table_init_queries:
  - CREATE TABLE {{TABLE_NAME}} (record_id VARCHAR2(50) PRIMARY KEY, record_timestamp NUMBER(19), record_data BLOB)
record_table_delete_queries:
  - DROP TABLE {{TABLE_NAME}}
record_insert_query: INSERT INTO {{TABLE_NAME}} (record_id, record_timestamp, record_data) VALUES (?, ?, ?)
record_retrieval_query: >-
  SELECT record_id, record_timestamp, record_data FROM (SELECT t.*, ROWNUM rn FROM {{TABLE_NAME}} t
  WHERE record_timestamp >= ? AND record_timestamp < ?) WHERE rn > ? AND rn < ?
record_retrieval_with_ids_query: SELECT record_id, record_timestamp, record_data FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})
record_deletion_query: DELETE FROM {{TABLE_NAME}} WHERE record_timestamp >= ? AND record_timestamp < ?
record_deletion_with_ids_query: DELETE FROM {{TABLE_NAME}} WHERE record_id IN ({{RECORD_IDS}})
pagination:
  first_zero_indexed: false
  first_inclusive: false
  second_length: false
  second_zero_indexed: false
  second_inclusive: false
"#;

// ==================== Built-in Dialect Tests ====================

#[test]
fn test_builtin_dialects_are_offset_limit() {
    for name in ["sqlite", "postgresql", "mysql", "sqlserver", "h2"] {
        let dialect = dialect_for(name).unwrap();
        assert_eq!(dialect.pagination(), PaginationSemantics::OFFSET_LIMIT, "{}", name);
    }
}

#[test]
fn test_builtin_templates_use_placeholders() {
    let dialect = dialect_for("postgres").unwrap();

    assert!(dialect.record_insert_query().contains(TABLE_NAME_PLACEHOLDER));
    assert!(dialect
        .record_retrieval_with_ids_query()
        .contains(RECORD_IDS_PLACEHOLDER));
    assert!(dialect
        .record_deletion_with_ids_query()
        .contains(RECORD_IDS_PLACEHOLDER));
    assert!(!dialect.record_retrieval_query().contains(RECORD_IDS_PLACEHOLDER));
    assert_eq!(dialect.record_retrieval_query().matches('?').count(), 4);
    assert_eq!(dialect.record_deletion_query().matches('?').count(), 2);
    assert_eq!(dialect.record_insert_query().matches('?').count(), 3);
}

#[test]
fn test_dialect_aliases() {
    assert_eq!(dialect_for("mariadb").unwrap().name(), "MySQL");
    assert_eq!(dialect_for("PostgreSQL").unwrap().name(), "PostgreSQL");
    assert_eq!(
        DialectDescriptor::for_database(DatabaseType::H2).unwrap().name(),
        "H2"
    );

    let err = dialect_for("db2").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

// ==================== YAML Loading Tests ====================

#[test]
fn test_yaml_dialect_with_custom_pagination() {
    let dialect = DialectDescriptor::from_yaml_str(ORACLE_LIKE).unwrap();

    assert_eq!(dialect.name(), "RowNum");
    assert!(!dialect.pagination().first_zero_indexed);
    assert!(!dialect.pagination().second_length);
    assert_eq!(dialect.record_table_init_queries().len(), 1);
}

#[test]
fn test_yaml_pagination_defaults_to_offset_limit() {
    let yaml = ORACLE_LIKE
        .split("pagination:")
        .next()
        .unwrap()
        .to_string();
    let dialect = DialectDescriptor::from_yaml_str(&yaml).unwrap();
    assert_eq!(dialect.pagination(), PaginationSemantics::OFFSET_LIMIT);
}

#[test]
fn test_yaml_rejects_unknown_fields_and_tokens() {
    let yaml = format!("{}\nextra_query: SELECT 1\n", ORACLE_LIKE);
    assert!(DialectDescriptor::from_yaml_str(&yaml).is_err());

    let yaml = ORACLE_LIKE.replace("DROP TABLE {{TABLE_NAME}}", "DROP TABLE {{TABLE}}");
    let err = DialectDescriptor::from_yaml_str(&yaml).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("{{TABLE}}"));
}

#[test]
fn test_dialect_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(ORACLE_LIKE.as_bytes()).unwrap();

    let dialect = DialectDescriptor::from_file(file.path()).unwrap();
    assert_eq!(dialect.name(), "RowNum");

    assert!(DialectDescriptor::from_file("/nonexistent/dialect.yaml").is_err());
}

// ==================== Validation Tests ====================

#[test]
fn test_empty_name_rejected() {
    let mut config = dialect_for("sqlite").unwrap().config().clone();
    config.name = "  ".into();
    assert!(DialectDescriptor::new(config).is_err());
}

#[test]
fn test_empty_template_rejected() {
    let mut config = dialect_for("sqlite").unwrap().config().clone();
    config.system_table_check_query = String::new();
    assert!(DialectDescriptor::new(config).is_err());

    let mut config = dialect_for("sqlite").unwrap().config().clone();
    config.system_table_init_queries.clear();
    assert!(DialectDescriptor::new(config).is_err());
}

#[test]
fn test_record_ids_in_insert_rejected() {
    let mut config = dialect_for("sqlite").unwrap().config().clone();
    config.record_insert_query =
        "INSERT INTO {{TABLE_NAME}} (record_id) VALUES ({{RECORD_IDS}})".into();

    let err = DialectDescriptor::new(config).unwrap_err();
    assert!(err.to_string().contains("record_insert_query"));
}
