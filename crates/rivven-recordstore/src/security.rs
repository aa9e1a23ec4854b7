//! Identifier checks for text spliced into SQL.
//!
//! Physical table names replace `{{TABLE_NAME}}` in dialect templates as raw
//! text and can never be bound as parameters. Every name passes
//! [`validate_sql_identifier`] before it reaches a statement.

use crate::error::Error;

/// Longest identifier accepted
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Check that `name` is a plain, unquoted SQL identifier.
///
/// Accepted: 1 to 255 ASCII characters, a letter or underscore first, then
/// letters, digits and underscores.
///
/// # Examples
///
/// ```
/// use rivven_recordstore::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("ANX_1_events").is_ok());
/// assert!(validate_sql_identifier("ANX_1_x; DROP TABLE ANX_META").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("SQL identifier cannot be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::invalid_argument(format!(
            "SQL identifier too long: {} bytes (max {})",
            name.len(),
            MAX_IDENTIFIER_LEN
        )));
    }

    let offending = name.char_indices().find(|&(pos, c)| {
        let allowed = c.is_ascii_alphabetic() || c == '_' || (pos > 0 && c.is_ascii_digit());
        !allowed
    });

    match offending {
        None => Ok(()),
        Some((0, c)) => Err(Error::invalid_argument(format!(
            "invalid table name '{}': cannot start with '{}'",
            name, c
        ))),
        Some((pos, c)) => Err(Error::invalid_argument(format!(
            "invalid table name '{}': character '{}' at offset {}",
            name,
            c.escape_default(),
            pos
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_physical_names() {
        for name in ["ANX_1_events", "ANX_META", "_staging", "a"] {
            assert!(validate_sql_identifier(name).is_ok(), "{}", name);
        }
        assert!(validate_sql_identifier(&"t".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert!(validate_sql_identifier("").is_err());
        assert!(validate_sql_identifier(&"t".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
        assert!(validate_sql_identifier("1_events").is_err());
        assert!(validate_sql_identifier("ANX_-1_events").is_err());
        assert!(validate_sql_identifier("ANX_1_évents").is_err());
    }

    #[test]
    fn test_rejects_injection() {
        for name in [
            "ANX_1_x; DROP TABLE ANX_META",
            "ANX_1_x' OR '1'='1",
            "ANX_1_a b",
            "ANX_1_x\nDELETE",
            "public.ANX_1_x",
            "ANX_1_x--",
        ] {
            assert!(validate_sql_identifier(name).is_err(), "{}", name);
        }
    }

    #[test]
    fn test_error_names_offset() {
        let err = validate_sql_identifier("ANX_1_a-b").unwrap_err();
        assert!(err.to_string().contains("offset 7"));
    }
}
