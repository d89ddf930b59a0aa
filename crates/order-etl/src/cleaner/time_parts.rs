//! Calendar decomposition of a timestamp column.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use polars::prelude::*;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Names of the columns appended by [`add_time_parts`].
pub const TIME_PART_COLUMNS: [&str; 5] = ["date", "year", "month", "day_of_week", "hour"];

/// Append `date`, `year`, `month` (`YYYY-MM`), `day_of_week` and `hour`
/// derived from a UTC timestamp column. Null timestamps give null parts.
pub fn add_time_parts(df: &DataFrame, ts_col: &str) -> Result<DataFrame> {
    let column = df
        .column(ts_col)
        .with_context(|| format!("timestamp column '{}' not found", ts_col))?;
    let millis = column
        .as_materialized_series()
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        .cast(&DataType::Int64)?;

    let height = millis.len();
    let mut dates: Vec<Option<i32>> = Vec::with_capacity(height);
    let mut years: Vec<Option<i32>> = Vec::with_capacity(height);
    let mut months: Vec<Option<String>> = Vec::with_capacity(height);
    let mut weekdays: Vec<Option<String>> = Vec::with_capacity(height);
    let mut hours: Vec<Option<i32>> = Vec::with_capacity(height);

    for opt_ms in millis.i64()?.into_iter() {
        match opt_ms.and_then(DateTime::<Utc>::from_timestamp_millis) {
            Some(ts) => {
                let ms = ts.timestamp_millis();
                dates.push(Some(ms.div_euclid(MILLIS_PER_DAY) as i32));
                years.push(Some(ts.year()));
                months.push(Some(format!("{:04}-{:02}", ts.year(), ts.month())));
                weekdays.push(Some(ts.format("%A").to_string()));
                hours.push(Some(ts.hour() as i32));
            }
            None => {
                dates.push(None);
                years.push(None);
                months.push(None);
                weekdays.push(None);
                hours.push(None);
            }
        }
    }

    let mut out = df.clone();
    out.with_column(Series::new("date".into(), dates).cast(&DataType::Date)?)?;
    out.with_column(Series::new("year".into(), years))?;
    out.with_column(Series::new("month".into(), months))?;
    out.with_column(Series::new("day_of_week".into(), weekdays))?;
    out.with_column(Series::new("hour".into(), hours))?;

    Ok(out)
}
