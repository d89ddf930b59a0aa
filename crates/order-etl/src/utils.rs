//! Shared utilities for the ETL pipeline.
//!
//! Dtype checks and strict value parsers used by the schema enforcer,
//! the quality gate and the outlier engine.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check whether a DataFrame has a column with the given name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Owned column names of a DataFrame, in order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

/// Non-null values of a numeric series as `f64`, skipping NaN.
pub fn finite_values(series: &Series) -> PolarsResult<Vec<f64>> {
    let float_series = series.cast(&DataType::Float64)?;
    Ok(float_series
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect())
}

// =============================================================================
// Value Parsing Utilities
// =============================================================================

/// Parse a trimmed string as a finite `f64`.
///
/// Empty strings, text, NaN and infinities yield `None`. No currency or
/// thousands-separator stripping is attempted.
///
/// # Example
///
/// ```rust,ignore
/// use order_etl::utils::parse_numeric_value;
///
/// assert_eq!(parse_numeric_value(" 12.5 "), Some(12.5));
/// assert_eq!(parse_numeric_value("abc"), None);
/// assert_eq!(parse_numeric_value("NaN"), None);
/// ```
pub fn parse_numeric_value(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

const NAIVE_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a timestamp string to milliseconds since the Unix epoch (UTC).
///
/// Values with an explicit offset (RFC 3339) are converted to UTC; naive
/// values are interpreted as UTC. Returns `None` for anything unparsable.
pub fn parse_timestamp_millis(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis());
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc().timestamp_millis());
        }
    }

    None
}
