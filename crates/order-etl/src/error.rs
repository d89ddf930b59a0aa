//! Error types for the ETL pipeline.
//!
//! Quality-gate and join failures each get their own variant so a failed run
//! names the violated rule together with the offending table and column.
//!
//! Errors are serializable as `{code, message}` so the run outcome can be
//! emitted as JSON by the CLI.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the ETL pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Required columns are absent from an input table.
    #[error("Table '{table}' is missing required columns: {}", .columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// An input table has no rows.
    #[error("Table '{table}' is empty")]
    EmptyDataset { table: String },

    /// A key column contains repeated values.
    #[error(
        "Table '{table}' has {duplicate_count} duplicate value(s) in key column '{column}' (e.g. {})",
        .examples.join(", ")
    )]
    DuplicateKey {
        table: String,
        column: String,
        duplicate_count: usize,
        examples: Vec<String>,
    },

    /// A numeric column holds values below its lower bound.
    #[error(
        "Column '{column}' of table '{table}' has {violations} value(s) below {lower_bound} (min {min_value})"
    )]
    RangeViolation {
        table: String,
        column: String,
        lower_bound: f64,
        violations: usize,
        min_value: f64,
    },

    /// A join would change the number of left rows.
    #[error("Join on '{key}' is not many-to-one: {reason}")]
    JoinExplosion { key: String, reason: String },

    /// Schema coercion failed for a reason other than unparsable values.
    #[error("Failed to enforce schema for table '{table}': {reason}")]
    SchemaEnforcementFailed { table: String, reason: String },

    /// Outlier bounds or treatment could not be computed.
    #[error("Failed to treat outliers in column '{column}': {reason}")]
    OutlierTreatmentFailed { column: String, reason: String },

    /// Writing an output artifact failed.
    #[error("Failed to persist '{artifact}': {reason}")]
    PersistenceFailed { artifact: String, reason: String },

    /// The run state machine was asked to skip or repeat a stage.
    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EtlError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code used in JSON output and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingColumns { .. } => "MISSING_COLUMNS",
            Self::EmptyDataset { .. } => "EMPTY_DATASET",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::RangeViolation { .. } => "RANGE_VIOLATION",
            Self::JoinExplosion { .. } => "JOIN_EXPLOSION",
            Self::SchemaEnforcementFailed { .. } => "SCHEMA_ENFORCEMENT_FAILED",
            Self::OutlierTreatmentFailed { .. } => "OUTLIER_TREATMENT_FAILED",
            Self::PersistenceFailed { .. } => "PERSISTENCE_FAILED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error is a data-quality or referential-integrity violation.
    pub fn is_quality_violation(&self) -> bool {
        match self {
            Self::MissingColumns { .. }
            | Self::EmptyDataset { .. }
            | Self::DuplicateKey { .. }
            | Self::RangeViolation { .. }
            | Self::JoinExplosion { .. } => true,
            Self::WithContext { source, .. } => source.is_quality_violation(),
            _ => false,
        }
    }

    /// Check if rerunning on the same input could succeed.
    ///
    /// Bad input data never heals on retry; only I/O failures may.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Io(_) | Self::PersistenceFailed { .. } => true,
            Self::WithContext { source, .. } => source.is_retriable(),
            _ => false,
        }
    }
}

impl Serialize for EtlError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("EtlError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl From<crate::config::ConfigValidationError> for EtlError {
    fn from(error: crate::config::ConfigValidationError) -> Self {
        EtlError::InvalidConfig(error.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EtlError::Polars(e).with_context(context))
    }
}
