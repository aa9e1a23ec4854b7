//! Record value encoding
//!
//! The store moves a record's values to and from a single blob column. The
//! [`RecordCodec`] decides what the bytes look like; the SQL layer never
//! inspects them. Column projection happens here, after decoding.

use std::collections::HashSet;

use crate::error::Result;
use crate::types::Column;

/// Encodes and decodes the value set of a record
pub trait RecordCodec: Send + Sync {
    /// Encode record values into an opaque blob
    fn encode(&self, values: &[Column]) -> Result<Vec<u8>>;

    /// Decode a blob, keeping only the named columns when `columns` is given
    fn decode(&self, data: &[u8], columns: Option<&HashSet<String>>) -> Result<Vec<Column>>;
}

/// Default codec backed by postcard
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl RecordCodec for PostcardCodec {
    #[inline]
    fn encode(&self, values: &[Column]) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(values)?)
    }

    fn decode(&self, data: &[u8], columns: Option<&HashSet<String>>) -> Result<Vec<Column>> {
        let values: Vec<Column> = postcard::from_bytes(data)?;
        Ok(match columns {
            Some(selected) => values
                .into_iter()
                .filter(|c| selected.contains(&c.name))
                .collect(),
            None => values,
        })
    }
}

/// Build the projection set used by [`RecordCodec::decode`].
///
/// `None` and an empty list both mean "all columns".
pub fn column_selector(columns: Option<&[String]>) -> Option<HashSet<String>> {
    match columns {
        Some(cols) if !cols.is_empty() => Some(cols.iter().cloned().collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn sample() -> Vec<Column> {
        vec![
            Column::new("x", 1),
            Column::new("name", "alice"),
            Column::new("score", 0.5_f64),
            Column::new("raw", vec![0u8, 255]),
            Column::new("gone", Value::Null),
        ]
    }

    #[test]
    fn test_decode_all_columns() {
        let codec = PostcardCodec;
        let blob = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode(&blob, None).unwrap(), sample());
    }

    #[test]
    fn test_decode_projection_keeps_order() {
        let codec = PostcardCodec;
        let blob = codec.encode(&sample()).unwrap();
        let wanted = vec!["score".to_string(), "x".to_string()];
        let selector = column_selector(Some(wanted.as_slice()));

        let decoded = codec.decode(&blob, selector.as_ref()).unwrap();
        assert_eq!(
            decoded,
            vec![Column::new("x", 1), Column::new("score", 0.5_f64)]
        );
    }

    #[test]
    fn test_empty_selector_means_all() {
        assert!(column_selector(None).is_none());
        assert!(column_selector(Some(&[][..])).is_none());
    }

    #[test]
    fn test_corrupt_blob_is_codec_error() {
        let err = PostcardCodec.decode(&[0xff, 0xff, 0xff], None).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Codec);
    }
}
