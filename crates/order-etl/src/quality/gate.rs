use crate::error::{EtlError, Result};
use crate::utils::{finite_values, has_column};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Maximum number of duplicated key values quoted in a `DuplicateKey` error.
const MAX_DUPLICATE_EXAMPLES: usize = 5;

const NULL_KEY: &str = "<null>";

pub struct QualityGate;

impl QualityGate {
    /// Fail with `MissingColumns` listing every absent name, in the order given.
    pub fn require_columns(table: &str, df: &DataFrame, names: &[&str]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !has_column(df, name))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::MissingColumns {
                table: table.to_string(),
                columns: missing,
            })
        }
    }

    pub fn assert_non_empty(table: &str, df: &DataFrame) -> Result<()> {
        if df.height() == 0 {
            return Err(EtlError::EmptyDataset {
                table: table.to_string(),
            });
        }
        Ok(())
    }

    /// Fail with `DuplicateKey` if any value of `key` occurs more than once.
    ///
    /// Nulls are compared as a value of their own, so two null keys collide.
    /// `duplicate_count` is the number of rows repeating an earlier key.
    pub fn assert_unique_key(table: &str, df: &DataFrame, key: &str) -> Result<()> {
        Self::require_columns(table, df, &[key])?;

        let keys = df.column(key)?.as_materialized_series().cast(&DataType::String)?;
        let mut seen: HashMap<Option<&str>, usize> = HashMap::with_capacity(keys.len());
        let mut duplicate_count = 0;
        let mut examples: Vec<String> = Vec::new();

        for value in keys.str()?.into_iter() {
            let count = seen.entry(value).or_insert(0);
            *count += 1;
            if *count > 1 {
                duplicate_count += 1;
                // first repeat of each value
                if *count == 2 && examples.len() < MAX_DUPLICATE_EXAMPLES {
                    examples.push(value.unwrap_or(NULL_KEY).to_string());
                }
            }
        }

        if duplicate_count > 0 {
            return Err(EtlError::DuplicateKey {
                table: table.to_string(),
                column: key.to_string(),
                duplicate_count,
                examples,
            });
        }

        debug!("{}.{} is unique over {} rows", table, key, keys.len());
        Ok(())
    }

    /// Fail with `RangeViolation` if any non-null value is below `lower_bound`.
    pub fn assert_in_range(table: &str, series: &Series, lower_bound: f64) -> Result<()> {
        let values = finite_values(series)?;
        let below: Vec<f64> = values.into_iter().filter(|v| *v < lower_bound).collect();

        if below.is_empty() {
            return Ok(());
        }

        let min_value = below.iter().copied().fold(f64::INFINITY, f64::min);
        Err(EtlError::RangeViolation {
            table: table.to_string(),
            column: series.name().to_string(),
            lower_bound,
            violations: below.len(),
            min_value,
        })
    }

    /// Structural checks on a raw table: column presence, then non-emptiness.
    pub fn check_structure(table: &str, df: &DataFrame, required: &[&str]) -> Result<()> {
        Self::require_columns(table, df, required)?;
        Self::assert_non_empty(table, df)
    }

    /// Semantic checks on typed orders: unique `order_id`, non-negative
    /// `amount` and `quantity`.
    pub fn check_orders(df: &DataFrame) -> Result<()> {
        Self::assert_unique_key("orders", df, "order_id")?;
        for name in ["amount", "quantity"] {
            let column = df.column(name)?.as_materialized_series();
            Self::assert_in_range("orders", column, 0.0)?;
        }
        Ok(())
    }

    /// Semantic checks on typed users: unique `user_id`.
    pub fn check_users(df: &DataFrame) -> Result<()> {
        Self::assert_unique_key("users", df, "user_id")
    }
}
