//! Order Analytics ETL Library
//!
//! A batch Extract → Transform → Load pipeline for order and user records,
//! built with Rust and Polars.
//!
//! # Overview
//!
//! - **Schema Enforcement**: Typed, trimmed, case-normalized columns; unparsable values become nulls
//! - **Quality Gates**: Fail-fast checks for required columns, emptiness, key uniqueness and ranges
//! - **Safe Joins**: Many-to-one left join that never changes the order count
//! - **Outlier Treatment**: IQR fences, winsorized amounts and outlier flags
//! - **All-or-Nothing Outputs**: Parquet tables and run metadata committed together
//! - **Progress Reporting**: One update per stage of the run state machine
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use order_etl::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .root("/srv/etl")
//!     .iqr_k(1.5)
//!     .reports_dir("/srv/etl/reports")
//!     .build()?;
//!
//! let outcome = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| println!("[{}] {}", update.stage, update.message))
//!     .build()?
//!     .run()?;
//!
//! println!("rows_out = {}", outcome.metadata.rows_out);
//! ```
//!
//! # Transform Only
//!
//! [`Pipeline::transform`] runs every stage up to outlier treatment on
//! in-memory tables and touches no files:
//!
//! ```rust,ignore
//! let output = Pipeline::builder().build()?.transform(&orders_raw, &users_raw)?;
//! assert_eq!(output.analytics.height(), orders_raw.height());
//! ```

pub mod cleaner;
pub mod config;
pub mod error;
pub mod io;
pub mod join;
pub mod pipeline;
pub mod quality;
pub mod reporting;
pub mod utils;

// Re-exports for convenient access
pub use cleaner::{
    CoercionWarning, SchemaEnforcer, add_missing_flags, apply_mapping, normalize_text,
};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{EtlError, Result as EtlResult, ResultExt};
pub use join::{assert_row_count_preserved, safe_left_join};
pub use pipeline::{
    ClosureProgressReporter, IqrBounds, Pipeline, PipelineBuilder, PipelineStage,
    ProgressReporter, RunOutcome, RunState, StageUpdate, TransformOutput, clip_outliers,
    flag_outliers,
};
pub use quality::QualityGate;
pub use reporting::{RunMetadata, missingness_report, revenue_by_country};
