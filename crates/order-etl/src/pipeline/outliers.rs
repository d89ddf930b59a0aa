//! Outlier handling module.
//!
//! IQR-based detection and winsorization for numeric columns. Quartiles use
//! linear interpolation between order statistics (`pos = (n - 1) * q`), so
//! results depend only on the multiset of values, never on row order.

use crate::error::{EtlError, Result};
use crate::utils::finite_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Quartiles and fences of one numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub low: f64,
    pub high: f64,
}

impl IqrBounds {
    /// Compute bounds from the non-null values of `series`.
    ///
    /// Returns `Ok(None)` when the column holds no values at all.
    pub fn from_series(series: &Series, k: f64) -> Result<Option<Self>> {
        if !k.is_finite() || k < 0.0 {
            return Err(EtlError::OutlierTreatmentFailed {
                column: series.name().to_string(),
                reason: format!("IQR multiplier must be finite and non-negative, got {}", k),
            });
        }

        let mut values = finite_values(series).map_err(|e| EtlError::OutlierTreatmentFailed {
            column: series.name().to_string(),
            reason: e.to_string(),
        })?;
        if values.is_empty() {
            return Ok(None);
        }
        values.sort_by(f64::total_cmp);

        let q1 = quantile_sorted(&values, 0.25);
        let q3 = quantile_sorted(&values, 0.75);
        let iqr = q3 - q1;
        let (low, high) = (q1 - k * iqr, q3 + k * iqr);

        // Infinite fences are usable; NaN ones are not.
        if low.is_nan() || high.is_nan() {
            return Err(EtlError::OutlierTreatmentFailed {
                column: series.name().to_string(),
                reason: format!("IQR fences are undefined (q1 {}, q3 {}, k {})", q1, q3, k),
            });
        }

        Ok(Some(Self {
            q1,
            q3,
            iqr,
            low,
            high,
        }))
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Linear-interpolated quantile of already sorted, non-empty values.
///
/// Weighted as a convex combination so values near `f64::MAX` of opposite
/// sign never overflow.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let fraction = pos - lower as f64;
    if fraction == 0.0 {
        return sorted[lower];
    }
    sorted[lower] * (1.0 - fraction) + sorted[upper] * fraction
}

/// Boolean series, true where a value lies outside the IQR fences.
///
/// Nulls are never outliers. An all-null column gives all `false`.
pub fn flag_outliers(series: &Series, k: f64) -> Result<Series> {
    let name = series.name().clone();
    let Some(bounds) = IqrBounds::from_series(series, k)? else {
        return Ok(BooleanChunked::full(name, false, series.len()).into_series());
    };

    let float_series = series.cast(&DataType::Float64)?;
    let flags: Vec<bool> = float_series
        .f64()?
        .into_iter()
        .map(|v| v.is_some_and(|val| !bounds.contains(val)))
        .collect();

    let flagged = flags.iter().filter(|f| **f).count();
    debug!(
        "Flagged {} outliers in {} outside [{}, {}]",
        flagged, name, bounds.low, bounds.high
    );

    Ok(Series::new(name, flags))
}

/// Winsorize a numeric series to its IQR fences. Nulls pass through.
///
/// An all-null column is returned unchanged.
pub fn clip_outliers(series: &Series, k: f64) -> Result<Series> {
    let Some(bounds) = IqrBounds::from_series(series, k)? else {
        return Ok(series.clone());
    };

    let float_series = series.cast(&DataType::Float64)?;
    let clipped = float_series
        .f64()?
        .apply(|v| v.map(|val| val.max(bounds.low).min(bounds.high)));

    Ok(clipped.into_series())
}
