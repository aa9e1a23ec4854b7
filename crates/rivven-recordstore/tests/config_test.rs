//! Unit tests for rivven-recordstore config module

use rivven_recordstore::config::{EmptyIdLookup, StoreConfig, DATASOURCE_KEY, DIALECT_FILE_KEY};
use rivven_recordstore::connection::DatabaseType;
use rivven_recordstore::error::ErrorCategory;
use std::collections::HashMap;
use std::io::Write;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_store_config_defaults() {
    let config = StoreConfig::new("analytics");

    assert_eq!(config.datasource, "analytics");
    assert!(config.dialect.is_none());
    assert!(config.dialect_file.is_none());
    assert_eq!(config.empty_id_lookup, EmptyIdLookup::Empty);
    assert!(config.validate().is_ok());
}

#[test]
fn test_store_config_builder() {
    let config = StoreConfig::new("analytics")
        .with_dialect("mysql")
        .with_empty_id_lookup(EmptyIdLookup::Reject);

    assert_eq!(config.dialect.as_deref(), Some("mysql"));
    assert_eq!(config.empty_id_lookup, EmptyIdLookup::Reject);
    assert_eq!(
        config.resolve_dialect(DatabaseType::PostgreSQL).unwrap().name(),
        "MySQL"
    );
}

#[test]
fn test_empty_id_lookup_parse() {
    assert_eq!("empty".parse::<EmptyIdLookup>().unwrap(), EmptyIdLookup::Empty);
    assert_eq!(" REJECT ".parse::<EmptyIdLookup>().unwrap(), EmptyIdLookup::Reject);
    assert!("ignore".parse::<EmptyIdLookup>().is_err());
}

#[test]
fn test_properties_keep_unknown_keys() {
    let mut props = HashMap::new();
    props.insert(DATASOURCE_KEY.to_string(), "analytics".to_string());
    props.insert("owner".to_string(), "reporting".to_string());

    let config = StoreConfig::from_properties(props).unwrap();
    assert_eq!(config.properties.get("owner"), Some(&"reporting".to_string()));
}

#[test]
fn test_blank_dialect_property_ignored() {
    let mut props = HashMap::new();
    props.insert(DATASOURCE_KEY.to_string(), "analytics".to_string());
    props.insert("dialect".to_string(), "   ".to_string());

    let config = StoreConfig::from_properties(props).unwrap();
    assert!(config.dialect.is_none());
}

#[test]
fn test_config_from_yaml_file() {
    let file = write_temp(
        r#"
datasource: analytics
dialect: postgres
empty_id_lookup: reject
properties:
  owner: reporting
"#,
    );

    let config = StoreConfig::from_file(file.path()).unwrap();
    assert_eq!(config.datasource, "analytics");
    assert_eq!(config.dialect.as_deref(), Some("postgres"));
    assert_eq!(config.empty_id_lookup, EmptyIdLookup::Reject);
    assert_eq!(config.properties.get("owner"), Some(&"reporting".to_string()));
}

#[test]
fn test_config_yaml_missing_datasource() {
    let err = StoreConfig::from_yaml_str("dialect: sqlite\n").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[test]
fn test_config_yaml_env_expansion() {
    std::env::set_var("RIVVEN_RECORDSTORE_TEST_DS", "from-env");
    let config =
        StoreConfig::from_yaml_str("datasource: ${RIVVEN_RECORDSTORE_TEST_DS:-unused}\n").unwrap();
    assert_eq!(config.datasource, "from-env");
    std::env::remove_var("RIVVEN_RECORDSTORE_TEST_DS");
}

#[test]
fn test_dialect_file_resolution() {
    let dialect_yaml = serde_yaml::to_string(
        rivven_recordstore::dialect::dialect_for("h2")
            .unwrap()
            .config(),
    )
    .unwrap();
    let dialect_file = write_temp(&dialect_yaml);

    let mut props = HashMap::new();
    props.insert(DATASOURCE_KEY.to_string(), "analytics".to_string());
    props.insert(
        DIALECT_FILE_KEY.to_string(),
        dialect_file.path().display().to_string(),
    );

    let config = StoreConfig::from_properties(props).unwrap();
    let dialect = config.resolve_dialect(DatabaseType::Unknown).unwrap();
    assert_eq!(dialect.name(), "H2");
}

#[test]
fn test_missing_dialect_file() {
    let config = StoreConfig::new("analytics").with_dialect_file("/nonexistent/dialect.yaml");
    let err = config.resolve_dialect(DatabaseType::SQLite).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}
