//! Many-to-one left join with row-count validation.
//!
//! The join is validated before it runs: any repeated non-null key on the
//! right side would fan out left rows, so it is rejected up front. The
//! post-condition check exists for callers that join by other means.

use crate::error::{EtlError, Result};
use crate::quality::QualityGate;
use crate::utils::has_column;
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

/// Suffix given to right-side columns whose name already exists on the left.
pub const RIGHT_SUFFIX: &str = "_user";

/// Left outer join of `right` onto `left` by `key`.
///
/// Every left row appears exactly once, in its original order. Left rows
/// without a match, including rows whose key is null, get null in every
/// right column. The right key column is not repeated in the output.
///
/// # Errors
///
/// `JoinExplosion` if `right` holds the same non-null key more than once;
/// `MissingColumns` if either side lacks `key`.
pub fn safe_left_join(left: &DataFrame, right: &DataFrame, key: &str) -> Result<DataFrame> {
    QualityGate::require_columns("left", left, &[key])?;
    QualityGate::require_columns("right", right, &[key])?;

    let right_keys = right.column(key)?.as_materialized_series().cast(&DataType::String)?;
    let right_keys = right_keys.str()?;

    let mut positions: HashMap<&str, IdxSize> = HashMap::with_capacity(right_keys.len());
    let mut duplicated: Vec<&str> = Vec::new();
    for (row, value) in right_keys.into_iter().enumerate() {
        let Some(value) = value else { continue };
        if positions.insert(value, row as IdxSize).is_some() && !duplicated.contains(&value) {
            duplicated.push(value);
        }
    }

    if !duplicated.is_empty() {
        return Err(EtlError::JoinExplosion {
            key: key.to_string(),
            reason: format!(
                "{} key value(s) repeat on the right side (e.g. {})",
                duplicated.len(),
                duplicated.iter().take(5).copied().collect::<Vec<_>>().join(", ")
            ),
        });
    }

    let left_keys = left.column(key)?.as_materialized_series().cast(&DataType::String)?;
    let take_idx = IdxCa::from_iter_options(
        "take_idx".into(),
        left_keys
            .str()?
            .into_iter()
            .map(|value| value.and_then(|v| positions.get(v).copied())),
    );
    let matched = take_idx.len() - take_idx.null_count();

    let mut joined = left.clone();
    for column in right.get_columns() {
        let name = column.name().as_str();
        if name == key {
            continue;
        }
        let mut gathered = column.as_materialized_series().take(&take_idx)?;
        if has_column(left, name) {
            gathered.rename(format!("{}{}", name, RIGHT_SUFFIX).into());
        }
        joined.with_column(gathered)?;
    }

    info!(
        "Joined on '{}': {} of {} left rows matched",
        key,
        matched,
        left.height()
    );

    Ok(joined)
}

/// Fail with `JoinExplosion` unless `joined` has exactly as many rows as `left`.
pub fn assert_row_count_preserved(left: &DataFrame, joined: &DataFrame) -> Result<()> {
    if left.height() != joined.height() {
        return Err(EtlError::JoinExplosion {
            key: "row_count".to_string(),
            reason: format!(
                "expected {} rows after join, got {}",
                left.height(),
                joined.height()
            ),
        });
    }
    debug!("Row count preserved across join: {}", joined.height());
    Ok(())
}
