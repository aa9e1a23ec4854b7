//! Store configuration
//!
//! A record store is configured from a flat properties map (the form the
//! embedding analytics system hands over) or from a YAML file:
//!
//! ```yaml
//! datasource: analytics
//! dialect: ${ANX_DIALECT:-sqlite}
//! empty_id_lookup: reject
//! properties:
//!   owner: reporting
//! ```
//!
//! | key | required | meaning |
//! |---|---|---|
//! | `datasource` | yes | name resolved through the data source registry |
//! | `dialect` | no | built-in dialect name (`sqlite`, `postgresql`, `mysql`, `sqlserver`, `h2`) |
//! | `dialect.file` | no | YAML dialect descriptor, takes the place of `dialect` |
//! | `empty_id_lookup` | no | `empty` (default) or `reject` |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::connection::DatabaseType;
use crate::dialect::{dialect_for, DialectDescriptor};
use crate::error::{Error, Result};

/// Property key naming the data source
pub const DATASOURCE_KEY: &str = "datasource";
/// Property key naming a built-in dialect
pub const DIALECT_KEY: &str = "dialect";
/// Property key pointing at a YAML dialect file
pub const DIALECT_FILE_KEY: &str = "dialect.file";
/// Property key selecting [`EmptyIdLookup`]
pub const EMPTY_ID_LOOKUP_KEY: &str = "empty_id_lookup";

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// What a by-ids read does when handed an empty id list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyIdLookup {
    /// Return no records without touching the database
    #[default]
    Empty,
    /// Fail with an invalid-argument error
    Reject,
}

impl FromStr for EmptyIdLookup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "reject" => Ok(Self::Reject),
            other => Err(Error::config(format!(
                "invalid {} '{}': expected 'empty' or 'reject'",
                EMPTY_ID_LOOKUP_KEY, other
            ))),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Name of the data source to resolve
    pub datasource: String,

    /// Built-in dialect name; derived from the data source when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,

    /// Path of a YAML dialect descriptor
    #[serde(default, alias = "dialect.file", skip_serializing_if = "Option::is_none")]
    pub dialect_file: Option<String>,

    /// Empty id list behaviour for by-ids reads
    #[serde(default)]
    pub empty_id_lookup: EmptyIdLookup,

    /// Raw properties, exposed unchanged by the store
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl StoreConfig {
    /// Create a configuration for a data source with all defaults
    pub fn new(datasource: impl Into<String>) -> Self {
        Self {
            datasource: datasource.into(),
            dialect: None,
            dialect_file: None,
            empty_id_lookup: EmptyIdLookup::default(),
            properties: HashMap::new(),
        }
    }

    /// Select a built-in dialect
    pub fn with_dialect(mut self, name: impl Into<String>) -> Self {
        self.dialect = Some(name.into());
        self
    }

    /// Load the dialect from a YAML file
    pub fn with_dialect_file(mut self, path: impl Into<String>) -> Self {
        self.dialect_file = Some(path.into());
        self
    }

    /// Set the empty id lookup behaviour
    pub fn with_empty_id_lookup(mut self, mode: EmptyIdLookup) -> Self {
        self.empty_id_lookup = mode;
        self
    }

    /// Build a configuration from a flat properties map
    pub fn from_properties(properties: HashMap<String, String>) -> Result<Self> {
        let datasource = properties
            .get(DATASOURCE_KEY)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let empty_id_lookup = match properties.get(EMPTY_ID_LOOKUP_KEY) {
            Some(value) => value.parse()?,
            None => EmptyIdLookup::default(),
        };

        let config = Self {
            datasource,
            dialect: non_blank(properties.get(DIALECT_KEY)),
            dialect_file: non_blank(properties.get(DIALECT_FILE_KEY)),
            empty_id_lookup,
            properties,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML, expanding environment variables first
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(yaml);

        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.datasource.trim().is_empty() {
            return Err(Error::config(format!(
                "Error in looking up data source: '{}' property is not set",
                DATASOURCE_KEY
            )));
        }
        if self.dialect.is_some() && self.dialect_file.is_some() {
            return Err(Error::config(format!(
                "'{}' and '{}' cannot both be set",
                DIALECT_KEY, DIALECT_FILE_KEY
            )));
        }
        if let Some(name) = &self.dialect {
            dialect_for(name)?;
        }
        Ok(())
    }

    /// Resolve the dialect descriptor.
    ///
    /// A dialect file wins, then a named dialect, then the built-in dialect
    /// for the data source's database type.
    pub fn resolve_dialect(&self, database: DatabaseType) -> Result<DialectDescriptor> {
        if let Some(path) = &self.dialect_file {
            return DialectDescriptor::from_file(path);
        }
        if let Some(name) = &self.dialect {
            return dialect_for(name);
        }
        DialectDescriptor::for_database(database).ok_or_else(|| {
            Error::config(format!(
                "no built-in dialect for data source '{}' ({}); set '{}' or '{}'",
                self.datasource, database, DIALECT_KEY, DIALECT_FILE_KEY
            ))
        })
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_properties() {
        let config = StoreConfig::from_properties(props(&[
            ("datasource", "analytics"),
            ("dialect", "postgres"),
            ("empty_id_lookup", "Reject"),
        ]))
        .unwrap();

        assert_eq!(config.datasource, "analytics");
        assert_eq!(config.dialect.as_deref(), Some("postgres"));
        assert_eq!(config.empty_id_lookup, EmptyIdLookup::Reject);
        assert_eq!(config.properties.len(), 3);
    }

    #[test]
    fn test_missing_datasource() {
        let err = StoreConfig::from_properties(props(&[("dialect", "sqlite")])).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("datasource"));

        assert!(StoreConfig::from_properties(props(&[("datasource", "  ")])).is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(StoreConfig::from_properties(props(&[
            ("datasource", "a"),
            ("empty_id_lookup", "maybe"),
        ]))
        .is_err());
        assert!(StoreConfig::from_properties(props(&[
            ("datasource", "a"),
            ("dialect", "oracle"),
        ]))
        .is_err());
        assert!(StoreConfig::from_properties(props(&[
            ("datasource", "a"),
            ("dialect", "sqlite"),
            ("dialect.file", "/etc/anx/dialect.yaml"),
        ]))
        .is_err());
    }

    #[test]
    fn test_resolve_dialect_falls_back_to_database_type() {
        let config = StoreConfig::new("a");
        assert_eq!(
            config.resolve_dialect(DatabaseType::SQLite).unwrap().name(),
            "SQLite"
        );
        assert!(config.resolve_dialect(DatabaseType::Unknown).is_err());

        let config = StoreConfig::new("a").with_dialect("h2");
        assert_eq!(
            config.resolve_dialect(DatabaseType::SQLite).unwrap().name(),
            "H2"
        );
    }

    #[test]
    fn test_env_var_expansion_default() {
        let yaml = "datasource: ${RIVVEN_RECORDSTORE_TEST_UNSET_DS:-fallback}\n";
        let config = StoreConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.datasource, "fallback");
    }
}
