//! Configuration types for the ETL pipeline.
//!
//! This module provides the run configuration using the builder pattern.
//! Paths default to the project layout used by the batch job
//! (`data/raw`, `data/processed`, `reports`) relative to a root directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default IQR multiplier for outlier bounds.
pub const DEFAULT_IQR_K: f64 = 1.5;

/// Allow-list used to canonicalize order status variants.
pub fn default_status_mapping() -> BTreeMap<String, String> {
    [("paid", "paid"), ("refund", "refund"), ("refunded", "refund")]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

/// Configuration for one pipeline run.
///
/// Use [`PipelineConfig::builder()`] to create a configuration with the
/// fluent API, or [`PipelineConfig::from_root`] for the default layout.
///
/// # Example
///
/// ```rust,ignore
/// use order_etl::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .root("/srv/etl")
///     .iqr_k(3.0)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project root the default paths are derived from.
    pub root: PathBuf,

    /// Raw orders CSV.
    pub raw_orders: PathBuf,

    /// Raw users CSV.
    pub raw_users: PathBuf,

    /// Cleaned orders table (Parquet).
    pub out_orders_clean: PathBuf,

    /// Cleaned users table (Parquet).
    pub out_users: PathBuf,

    /// Joined analytics table (Parquet).
    pub out_analytics: PathBuf,

    /// Run metadata document (JSON).
    pub run_meta: PathBuf,

    /// Directory for the missingness report and revenue summary.
    /// When None, no reports are written.
    /// Default: None
    pub reports_dir: Option<PathBuf>,

    /// Multiplier applied to the IQR when computing outlier bounds.
    /// Default: 1.5
    pub iqr_k: f64,

    /// Status variants mapped to their canonical value.
    /// Default: paid→paid, refund→refund, refunded→refund
    pub status_mapping: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_root(".")
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Derive every path from a project root.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let raw = root.join("data").join("raw");
        let processed = root.join("data").join("processed");
        Self {
            raw_orders: raw.join("orders.csv"),
            raw_users: raw.join("users.csv"),
            out_orders_clean: processed.join("orders_clean.parquet"),
            out_users: processed.join("users.parquet"),
            out_analytics: processed.join("analytics_table.parquet"),
            run_meta: processed.join("_run_meta.json"),
            reports_dir: None,
            iqr_k: DEFAULT_IQR_K,
            status_mapping: default_status_mapping(),
            root,
        }
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.iqr_k.is_finite() || self.iqr_k < 0.0 {
            return Err(ConfigValidationError::InvalidIqrK(self.iqr_k));
        }

        let outputs = [
            ("out_orders_clean", &self.out_orders_clean),
            ("out_users", &self.out_users),
            ("out_analytics", &self.out_analytics),
            ("run_meta", &self.run_meta),
        ];
        for (i, (field, path)) in outputs.iter().enumerate() {
            if path.as_os_str().is_empty() {
                return Err(ConfigValidationError::EmptyPath(field.to_string()));
            }
            if outputs[..i].iter().any(|(_, other)| other == path) {
                return Err(ConfigValidationError::DuplicateOutputPath(
                    path.display().to_string(),
                ));
            }
        }

        if self.status_mapping.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigValidationError::EmptyStatusKey);
        }

        Ok(())
    }

    /// Every configuration value rendered as a string, keyed by field name.
    ///
    /// This is the configuration echo stored in the run metadata.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            out.insert(key.to_string(), value);
        };

        put("root", self.root.display().to_string());
        put("raw_orders", self.raw_orders.display().to_string());
        put("raw_users", self.raw_users.display().to_string());
        put("out_orders_clean", self.out_orders_clean.display().to_string());
        put("out_users", self.out_users.display().to_string());
        put("out_analytics", self.out_analytics.display().to_string());
        put("run_meta", self.run_meta.display().to_string());
        put(
            "reports_dir",
            self.reports_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "None".to_string()),
        );
        put("iqr_k", self.iqr_k.to_string());
        put(
            "status_mapping",
            self.status_mapping
                .iter()
                .map(|(from, to)| format!("{from}={to}"))
                .collect::<Vec<_>>()
                .join(","),
        );

        out
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid IQR multiplier: {0} (must be finite and >= 0)")]
    InvalidIqrK(f64),

    #[error("Output path '{0}' must not be empty")]
    EmptyPath(String),

    #[error("Output path '{0}' is used for more than one artifact")]
    DuplicateOutputPath(String),

    #[error("Status mapping contains an empty key")]
    EmptyStatusKey,
}

/// Builder for [`PipelineConfig`] with fluent API.
///
/// Paths not set explicitly are derived from the root (default ".").
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    root: Option<PathBuf>,
    raw_orders: Option<PathBuf>,
    raw_users: Option<PathBuf>,
    out_orders_clean: Option<PathBuf>,
    out_users: Option<PathBuf>,
    out_analytics: Option<PathBuf>,
    run_meta: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
    iqr_k: Option<f64>,
    status_mapping: Option<BTreeMap<String, String>>,
}

impl PipelineConfigBuilder {
    /// Set the project root used to derive default paths.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Override the raw orders CSV path.
    pub fn raw_orders(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_orders = Some(path.into());
        self
    }

    /// Override the raw users CSV path.
    pub fn raw_users(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_users = Some(path.into());
        self
    }

    pub fn out_orders_clean(mut self, path: impl Into<PathBuf>) -> Self {
        self.out_orders_clean = Some(path.into());
        self
    }

    pub fn out_users(mut self, path: impl Into<PathBuf>) -> Self {
        self.out_users = Some(path.into());
        self
    }

    pub fn out_analytics(mut self, path: impl Into<PathBuf>) -> Self {
        self.out_analytics = Some(path.into());
        self
    }

    pub fn run_meta(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_meta = Some(path.into());
        self
    }

    /// Write the missingness report and revenue summary into this directory.
    pub fn reports_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(path.into());
        self
    }

    /// Set the IQR multiplier for outlier bounds.
    ///
    /// # Arguments
    /// * `k` - Finite, non-negative multiplier (1.5 = Tukey fences)
    pub fn iqr_k(mut self, k: f64) -> Self {
        self.iqr_k = Some(k);
        self
    }

    /// Replace the status allow-list.
    pub fn status_mapping(mut self, mapping: BTreeMap<String, String>) -> Self {
        self.status_mapping = Some(mapping);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::from_root(self.root.unwrap_or_else(|| PathBuf::from(".")));

        let config = PipelineConfig {
            raw_orders: self.raw_orders.unwrap_or(defaults.raw_orders),
            raw_users: self.raw_users.unwrap_or(defaults.raw_users),
            out_orders_clean: self.out_orders_clean.unwrap_or(defaults.out_orders_clean),
            out_users: self.out_users.unwrap_or(defaults.out_users),
            out_analytics: self.out_analytics.unwrap_or(defaults.out_analytics),
            run_meta: self.run_meta.unwrap_or(defaults.run_meta),
            reports_dir: self.reports_dir,
            iqr_k: self.iqr_k.unwrap_or(DEFAULT_IQR_K),
            status_mapping: self.status_mapping.unwrap_or(defaults.status_mapping),
            root: defaults.root,
        };

        config.validate()?;
        Ok(config)
    }
}
