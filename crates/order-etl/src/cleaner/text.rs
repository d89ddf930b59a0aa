//! Categorical text normalization.

use anyhow::Result;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex: whitespace run"));

/// Trim, lowercase and collapse internal whitespace runs to a single space.
///
/// Lowercasing is `str::to_lowercase`, not full Unicode case folding: `"ß"`
/// stays `"ß"` rather than becoming `"ss"`. Token content is otherwise never
/// altered. Nulls stay null.
pub fn normalize_text(series: &Series) -> Result<Series> {
    let str_series = series.cast(&DataType::String)?;
    let values: Vec<Option<String>> = str_series
        .str()?
        .into_iter()
        .map(|opt_val| opt_val.map(normalize_value))
        .collect();

    Ok(Series::new(series.name().clone(), values))
}

fn normalize_value(value: &str) -> String {
    WHITESPACE_RUN
        .replace_all(value.trim(), " ")
        .to_lowercase()
}

/// Replace values found in `mapping` with their mapped value.
///
/// Values without an entry pass through unchanged, so an incomplete mapping
/// never fails. Nulls stay null.
pub fn apply_mapping(series: &Series, mapping: &BTreeMap<String, String>) -> Result<Series> {
    let str_series = series.cast(&DataType::String)?;
    let values: Vec<Option<String>> = str_series
        .str()?
        .into_iter()
        .map(|opt_val| {
            opt_val.map(|val| {
                mapping
                    .get(val)
                    .cloned()
                    .unwrap_or_else(|| val.to_string())
            })
        })
        .collect();

    Ok(Series::new(series.name().clone(), values))
}
