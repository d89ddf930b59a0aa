//! Run metadata and tabular reports.
//!
//! [`RunMetadata`] is the JSON document written beside the analytics table.
//! The missingness report and revenue summary are optional CSV side outputs,
//! written only when a reports directory is configured.

mod metadata;
mod summaries;

pub use metadata::RunMetadata;
pub use summaries::{missingness_report, revenue_by_country};

use crate::error::{EtlError, Result};
use crate::io::write_csv;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MISSINGNESS_REPORT_FILE: &str = "missingness_orders.csv";
pub const REVENUE_REPORT_FILE: &str = "revenue_by_country.csv";

/// Write the missingness report for cleaned orders and the revenue summary
/// for the analytics table into `dir`.
pub fn write_reports(
    orders_clean: &DataFrame,
    analytics: &DataFrame,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let to_error = |artifact: &str, e: anyhow::Error| EtlError::PersistenceFailed {
        artifact: artifact.to_string(),
        reason: e.to_string(),
    };

    let missingness =
        missingness_report(orders_clean).map_err(|e| to_error(MISSINGNESS_REPORT_FILE, e))?;
    let revenue =
        revenue_by_country(analytics).map_err(|e| to_error(REVENUE_REPORT_FILE, e))?;

    let missingness_path = dir.join(MISSINGNESS_REPORT_FILE);
    let revenue_path = dir.join(REVENUE_REPORT_FILE);
    write_csv(&missingness, &missingness_path)?;
    write_csv(&revenue, &revenue_path)?;

    info!("Reports saved to {}", dir.display());
    Ok(vec![missingness_path, revenue_path])
}
