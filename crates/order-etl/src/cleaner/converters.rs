//! Column coercion functions used by the schema enforcer.
//!
//! Every converter returns a new series with the same name and length.
//! Values that cannot be coerced become null; nothing here fails on bad data.

use crate::utils::{is_numeric_dtype, parse_numeric_value, parse_timestamp_millis};
use anyhow::Result;
use polars::prelude::*;

/// Case policy applied to a trimmed string column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaseRule {
    Keep,
    Lower,
    Upper,
}

/// Cast to String and trim, applying the case policy.
pub(crate) fn coerce_string(series: &Series, case: CaseRule) -> Result<Series> {
    let str_series = series.cast(&DataType::String)?;
    let values: Vec<Option<String>> = str_series
        .str()?
        .into_iter()
        .map(|opt_val| {
            opt_val.map(|val| {
                let trimmed = val.trim();
                match case {
                    CaseRule::Keep => trimmed.to_string(),
                    CaseRule::Lower => trimmed.to_lowercase(),
                    CaseRule::Upper => trimmed.to_uppercase(),
                }
            })
        })
        .collect();

    Ok(Series::new(series.name().clone(), values))
}

/// Convert a column to Float64.
///
/// Numeric dtypes are cast directly; anything else is parsed value by value.
/// NaN and infinities are treated as missing.
pub(crate) fn coerce_numeric(series: &Series) -> Result<Series> {
    let values: Vec<Option<f64>> = if is_numeric_dtype(series.dtype()) {
        let float_series = series.cast(&DataType::Float64)?;
        float_series
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect()
    } else {
        let str_series = series.cast(&DataType::String)?;
        str_series
            .str()?
            .into_iter()
            .map(|opt_val| opt_val.and_then(parse_numeric_value))
            .collect()
    };

    Ok(Series::new(series.name().clone(), values))
}

/// Convert a column to `Datetime(Milliseconds)` without a time zone, in UTC.
pub(crate) fn coerce_timestamp(series: &Series) -> Result<Series> {
    let target = DataType::Datetime(TimeUnit::Milliseconds, None);

    let millis: Vec<Option<i64>> = match series.dtype() {
        DataType::Datetime(_, tz) => {
            let ms = series.cast(&DataType::Datetime(TimeUnit::Milliseconds, tz.clone()))?;
            let physical = ms.cast(&DataType::Int64)?;
            physical.i64()?.into_iter().collect()
        }
        DataType::Date => {
            let ms = series.cast(&target)?;
            let physical = ms.cast(&DataType::Int64)?;
            physical.i64()?.into_iter().collect()
        }
        _ => {
            let str_series = series.cast(&DataType::String)?;
            str_series
                .str()?
                .into_iter()
                .map(|opt_val| opt_val.and_then(parse_timestamp_millis))
                .collect()
        }
    };

    let timestamp_series = Series::new(series.name().clone(), millis);
    Ok(timestamp_series.cast(&target)?)
}
