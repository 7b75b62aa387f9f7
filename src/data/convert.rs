//! Conversions from upstream text encodings to column types.
//!
//! The Performance API encodes every number as a JSON string. A value that fails to parse
//! fails the whole insert batch.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} {value:?}: expected {expected}")]
pub struct ConversionError {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ConversionError {
    fn new(field: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            field,
            value: value.to_owned(),
            expected,
        }
    }
}

/// `"1"` is one direction, any other integer the other.
pub fn direction(field: &'static str, raw: &str) -> Result<bool, ConversionError> {
    raw.trim()
        .parse::<i64>()
        .map(|value| value == 1)
        .map_err(|_| ConversionError::new(field, raw, "an integer direction id"))
}

pub fn epoch_seconds(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ConversionError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ConversionError::new(field, raw, "unix epoch seconds"))
}

pub fn seconds(field: &'static str, raw: &str) -> Result<i32, ConversionError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| ConversionError::new(field, raw, "whole seconds"))
}

/// Absent and empty both map to `None`.
pub fn optional_seconds(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<i32>, ConversionError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => seconds(field, value).map(Some),
    }
}

/// Absent and empty both map to `None`.
pub fn optional_epoch_seconds(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ConversionError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => epoch_seconds(field, value).map(Some),
    }
}
