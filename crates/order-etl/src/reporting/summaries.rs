use crate::utils::{column_names, has_column};
use anyhow::{Result, bail};
use polars::prelude::*;
use std::collections::BTreeMap;

/// Per-column null counts and shares, most incomplete column first.
///
/// Output columns: `column`, `n_missing`, `p_missing`. Columns with equal
/// counts keep their table order.
pub fn missingness_report(df: &DataFrame) -> Result<DataFrame> {
    let height = df.height();
    let mut rows: Vec<(String, u64)> = column_names(df)
        .into_iter()
        .zip(df.get_columns().iter().map(|c| c.null_count() as u64))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));

    let share = |n: u64| {
        if height == 0 {
            0.0
        } else {
            n as f64 / height as f64
        }
    };

    let names: Vec<&str> = rows.iter().map(|(name, _)| name.as_str()).collect();
    let counts: Vec<u64> = rows.iter().map(|(_, n)| *n).collect();
    let shares: Vec<f64> = counts.iter().map(|n| share(*n)).collect();

    Ok(df![
        "column" => names,
        "n_missing" => counts,
        "p_missing" => shares,
    ]?)
}

/// Order count and summed amount per country, highest revenue first.
///
/// Orders without a matched country are grouped under a null country.
/// Null amounts count towards `n` but add nothing to `revenue`.
pub fn revenue_by_country(df: &DataFrame) -> Result<DataFrame> {
    for name in ["country", "amount"] {
        if !has_column(df, name) {
            bail!("revenue summary needs column '{}'", name);
        }
    }

    let countries = df.column("country")?.as_materialized_series().cast(&DataType::String)?;
    let amounts = df.column("amount")?.as_materialized_series().cast(&DataType::Float64)?;

    let mut groups: BTreeMap<Option<&str>, (u64, f64)> = BTreeMap::new();
    for (country, amount) in countries.str()?.into_iter().zip(amounts.f64()?.into_iter()) {
        let entry = groups.entry(country).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += amount.unwrap_or(0.0);
    }

    let mut rows: Vec<(Option<&str>, u64, f64)> =
        groups.into_iter().map(|(k, (n, rev))| (k, n, rev)).collect();
    rows.sort_by(|a, b| b.2.total_cmp(&a.2));

    let country: Vec<Option<&str>> = rows.iter().map(|r| r.0).collect();
    let n: Vec<u64> = rows.iter().map(|r| r.1).collect();
    let revenue: Vec<f64> = rows.iter().map(|r| r.2).collect();

    Ok(df![
        "country" => country,
        "n" => n,
        "revenue" => revenue,
    ]?)
}
