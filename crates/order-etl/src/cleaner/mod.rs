//! Schema enforcement and field normalization.
//!
//! This module provides functionality for:
//! - Coercing raw order and user columns to their typed, canonical form
//! - Missingness flags for nullable numeric columns
//! - Categorical text normalization and status mapping
//! - Calendar decomposition of timestamps
//!
//! Unparsable values become nulls rather than errors; how many values were
//! coerced per column is reported as [`CoercionWarning`]s.

mod converters;
pub mod text;
pub mod time_parts;

pub use text::{apply_mapping, normalize_text};
pub use time_parts::{TIME_PART_COLUMNS, add_time_parts};

use crate::error::{EtlError, Result};
use crate::quality::QualityGate;
use converters::{CaseRule, coerce_numeric, coerce_string, coerce_timestamp};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Raw columns every orders batch must carry.
pub const ORDER_COLUMNS: [&str; 6] = [
    "order_id",
    "user_id",
    "amount",
    "quantity",
    "created_at",
    "status",
];

/// Raw columns every users batch must carry.
pub const USER_COLUMNS: [&str; 3] = ["user_id", "country", "signup_date"];

/// Target form of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRule {
    Identifier,
    Numeric,
    Timestamp,
    Text(CaseRule),
}

const ORDER_SCHEMA: [(&str, ColumnRule); 6] = [
    ("order_id", ColumnRule::Identifier),
    ("user_id", ColumnRule::Identifier),
    ("amount", ColumnRule::Numeric),
    ("quantity", ColumnRule::Numeric),
    ("created_at", ColumnRule::Timestamp),
    ("status", ColumnRule::Text(CaseRule::Lower)),
];

const USER_SCHEMA: [(&str, ColumnRule); 3] = [
    ("user_id", ColumnRule::Identifier),
    ("country", ColumnRule::Text(CaseRule::Upper)),
    ("signup_date", ColumnRule::Timestamp),
];

/// Values of one column that were present but could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionWarning {
    pub table: String,
    pub column: String,
    pub count: usize,
}

/// Coerces raw tables into their typed schema.
pub struct SchemaEnforcer;

impl SchemaEnforcer {
    /// Enforce the orders schema.
    ///
    /// `order_id`/`user_id` → trimmed String, `amount`/`quantity` → Float64,
    /// `created_at` → UTC millisecond Datetime, `status` → trimmed lower-case.
    /// Other columns are carried over untouched. Never drops rows.
    pub fn enforce_orders(df: &DataFrame) -> Result<(DataFrame, Vec<CoercionWarning>)> {
        Self::enforce("orders", df, &ORDER_SCHEMA)
    }

    /// Enforce the users schema.
    ///
    /// `user_id` → trimmed String, `country` → trimmed upper-case,
    /// `signup_date` → UTC millisecond Datetime.
    pub fn enforce_users(df: &DataFrame) -> Result<(DataFrame, Vec<CoercionWarning>)> {
        Self::enforce("users", df, &USER_SCHEMA)
    }

    fn enforce(
        table: &str,
        df: &DataFrame,
        schema: &[(&str, ColumnRule)],
    ) -> Result<(DataFrame, Vec<CoercionWarning>)> {
        let required: Vec<&str> = schema.iter().map(|(name, _)| *name).collect();
        QualityGate::require_columns(table, df, &required)?;

        let mut out = df.clone();
        let mut warnings = Vec::new();

        for (name, rule) in schema {
            let original = df.column(name)?.as_materialized_series();
            let coerced = match rule {
                ColumnRule::Identifier => coerce_string(original, CaseRule::Keep),
                ColumnRule::Numeric => coerce_numeric(original),
                ColumnRule::Timestamp => coerce_timestamp(original),
                ColumnRule::Text(case) => coerce_string(original, *case),
            }
            .map_err(|e| EtlError::SchemaEnforcementFailed {
                table: table.to_string(),
                reason: format!("column '{}': {}", name, e),
            })?;

            // coercion never fills a null, so the difference is the parse failures
            let newly_null = coerced.null_count().saturating_sub(original.null_count());
            if newly_null > 0 {
                warn!(
                    "{}.{}: {} unparsable value(s) coerced to null",
                    table, name, newly_null
                );
                warnings.push(CoercionWarning {
                    table: table.to_string(),
                    column: name.to_string(),
                    count: newly_null,
                });
            }

            out.with_column(coerced)?;
        }

        debug!(
            "Enforced {} schema: {} rows, {} coercion warnings",
            table,
            out.height(),
            warnings.len()
        );

        Ok((out, warnings))
    }
}

/// Append a Boolean `<col>__isna` flag for each named column of `table`.
pub fn add_missing_flags(table: &str, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    QualityGate::require_columns(table, df, columns)?;

    let mut out = df.clone();
    for name in columns {
        let flag = df
            .column(name)?
            .as_materialized_series()
            .is_null()
            .with_name(format!("{}__isna", name).into())
            .into_series();
        out.with_column(flag)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_orders() -> DataFrame {
        df![
            "order_id" => [" A1", "A2", "A3"],
            "user_id" => ["u1", "u2 ", "u3"],
            "amount" => [Some("10.5"), Some("abc"), None],
            "quantity" => [Some("1"), Some("2"), Some("x")],
            "created_at" => [Some("2025-12-01T10:00:00Z"), Some("not a date"), None],
            "status" => ["  PAID", "Refunded", "refund "],
        ]
        .unwrap()
    }

    #[test]
    fn test_enforce_orders_types() {
        let (df, _) = SchemaEnforcer::enforce_orders(&raw_orders()).unwrap();

        assert_eq!(df.column("amount").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("quantity").unwrap().dtype(), &DataType::Float64);
        assert_eq!(
            df.column("created_at").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(df.column("order_id").unwrap().str().unwrap().get(0), Some("A1"));
        assert_eq!(df.column("user_id").unwrap().str().unwrap().get(1), Some("u2"));
        assert_eq!(df.column("status").unwrap().str().unwrap().get(0), Some("paid"));
        assert_eq!(df.column("status").unwrap().str().unwrap().get(1), Some("refunded"));
    }

    #[test]
    fn test_enforce_orders_never_drops_rows() {
        let raw = raw_orders();
        let (df, _) = SchemaEnforcer::enforce_orders(&raw).unwrap();
        assert_eq!(df.height(), raw.height());
        // input untouched
        assert_eq!(raw.column("amount").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_enforce_orders_reports_coercions() {
        let (_, warnings) = SchemaEnforcer::enforce_orders(&raw_orders()).unwrap();

        let by_column = |name: &str| warnings.iter().find(|w| w.column == name).map(|w| w.count);
        assert_eq!(by_column("amount"), Some(1));
        assert_eq!(by_column("quantity"), Some(1));
        assert_eq!(by_column("created_at"), Some(1));
        assert_eq!(by_column("status"), None);
    }

    #[test]
    fn test_enforce_orders_is_fixed_point() {
        let (once, _) = SchemaEnforcer::enforce_orders(&raw_orders()).unwrap();
        let (twice, warnings) = SchemaEnforcer::enforce_orders(&once).unwrap();

        assert!(once.equals_missing(&twice));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_enforce_users_uppercases_country() {
        let users = df![
            "user_id" => ["u1", "u2"],
            "country" => [" sa", "Ae "],
            "signup_date" => [Some("2025-01-01"), None],
        ]
        .unwrap();

        let (df, warnings) = SchemaEnforcer::enforce_users(&users).unwrap();
        let country = df.column("country").unwrap().str().unwrap();
        assert_eq!(country.get(0), Some("SA"));
        assert_eq!(country.get(1), Some("AE"));
        assert!(warnings.is_empty());

        let (twice, _) = SchemaEnforcer::enforce_users(&df).unwrap();
        assert!(df.equals_missing(&twice));
    }

    #[test]
    fn test_enforce_missing_column_is_reported() {
        let users = df!["user_id" => ["u1"], "country" => ["SA"]].unwrap();
        let err = SchemaEnforcer::enforce_users(&users).unwrap_err();
        assert!(matches!(err, EtlError::MissingColumns { ref columns, .. } if columns == &vec!["signup_date".to_string()]));
    }

    #[test]
    fn test_missing_flags_name_the_table() {
        let df = df!["amount" => [1.0, 2.0]].unwrap();
        let err = add_missing_flags("orders", &df, &["amount", "quantity"]).unwrap_err();
        match err {
            EtlError::MissingColumns { table, columns } => {
                assert_eq!(table, "orders");
                assert_eq!(columns, vec!["quantity".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_flag_marks_only_unparsable_row() {
        let (df, _) = SchemaEnforcer::enforce_orders(&raw_orders()).unwrap();
        let df = add_missing_flags("orders", &df, &["amount", "quantity"]).unwrap();

        let amount_isna: Vec<Option<bool>> = df
            .column("amount__isna")
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(amount_isna, vec![Some(false), Some(true), Some(true)]);

        let quantity_isna: Vec<Option<bool>> = df
            .column("quantity__isna")
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(quantity_isna, vec![Some(false), Some(false), Some(true)]);
    }
}
