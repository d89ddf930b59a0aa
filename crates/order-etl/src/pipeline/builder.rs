//! Main ETL pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating one run: extract, enforce schema, gate, join, treat
//! outliers, persist and write run metadata.

use crate::cleaner::{
    CoercionWarning, ORDER_COLUMNS, SchemaEnforcer, USER_COLUMNS, add_missing_flags,
    add_time_parts, apply_mapping, normalize_text,
};
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::error::{EtlError, Result};
use crate::io::{StagedOutputs, read_orders_csv, read_users_csv};
use crate::join::{assert_row_count_preserved, safe_left_join};
use crate::pipeline::outliers::{clip_outliers, flag_outliers};
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, RunState, StageUpdate,
};
use crate::quality::QualityGate;
use crate::reporting::{RunMetadata, write_reports};
use polars::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Tables produced by [`Pipeline::transform`].
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Typed orders with `status_clean`, missing flags and time parts.
    pub orders_clean: DataFrame,
    /// Typed users.
    pub users_clean: DataFrame,
    /// Orders left-joined with users, plus `amount_winsor` and `amount_outlier`.
    pub analytics: DataFrame,
    /// Values coerced to null during schema enforcement.
    pub coercion_warnings: Vec<CoercionWarning>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub metadata: RunMetadata,
    pub analytics_rows: usize,
    pub final_stage: PipelineStage,
    pub coercion_warnings: Vec<CoercionWarning>,
    /// Files committed by this run, reports included.
    pub artifacts: Vec<PathBuf>,
}

/// The batch ETL pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use order_etl::{Pipeline, PipelineConfig};
///
/// let outcome = Pipeline::builder()
///     .config(PipelineConfig::from_root("/srv/etl"))
///     .on_progress(|update| println!("{}: {}", update.stage, update.message))
///     .build()?
///     .run()?;
///
/// println!("{} rows written", outcome.analytics_rows);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

// Ensure Pipeline is Send (can be moved to a worker thread)
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract both CSV inputs named in the configuration, then [`process`](Self::process) them.
    pub fn run(&self) -> Result<RunOutcome> {
        self.execute(|| {
            let orders = read_orders_csv(&self.config.raw_orders)?;
            let users = read_users_csv(&self.config.raw_users)?;
            Ok((orders, users))
        })
    }

    /// Transform already loaded raw tables and persist every output.
    ///
    /// Outputs are committed together: on any failure no output file is
    /// left behind.
    pub fn process(&self, orders_raw: DataFrame, users_raw: DataFrame) -> Result<RunOutcome> {
        self.execute(move || Ok((orders_raw, users_raw)))
    }

    /// Run every transform stage without touching the filesystem.
    pub fn transform(
        &self,
        orders_raw: &DataFrame,
        users_raw: &DataFrame,
    ) -> Result<TransformOutput> {
        let mut state = RunState::new();
        let result = self
            .enter(
                &mut state,
                StageUpdate::with_rows(
                    PipelineStage::Extracted,
                    orders_raw.height(),
                    "Raw tables supplied by caller",
                ),
            )
            .and_then(|_| self.transform_stages(&mut state, orders_raw, users_raw));
        self.finish(&mut state, result)
    }

    fn execute<F>(&self, extract: F) -> Result<RunOutcome>
    where
        F: FnOnce() -> Result<(DataFrame, DataFrame)>,
    {
        let span = info_span!("etl_run", root = %self.config.root.display());
        let _guard = span.enter();
        let start_time = Instant::now();

        info!("Starting ETL run...");
        let mut state = RunState::new();
        let result = self.execute_stages(&mut state, extract);
        let result = self.finish(&mut state, result);

        if let Ok(outcome) = &result {
            info!(
                "ETL run complete: {} rows in {:.2?}",
                outcome.analytics_rows,
                start_time.elapsed()
            );
        }
        result
    }

    fn execute_stages<F>(&self, state: &mut RunState, extract: F) -> Result<RunOutcome>
    where
        F: FnOnce() -> Result<(DataFrame, DataFrame)>,
    {
        let (orders_raw, users_raw) = extract()?;
        self.enter(
            state,
            StageUpdate::with_rows(
                PipelineStage::Extracted,
                orders_raw.height(),
                format!(
                    "Extracted {} orders and {} users",
                    orders_raw.height(),
                    users_raw.height()
                ),
            ),
        )?;

        let output = self.transform_stages(state, &orders_raw, &users_raw)?;

        let mut staged = StagedOutputs::new();
        staged.stage_parquet(&output.orders_clean, &self.config.out_orders_clean)?;
        staged.stage_parquet(&output.users_clean, &self.config.out_users)?;
        staged.stage_parquet(&output.analytics, &self.config.out_analytics)?;
        self.enter(
            state,
            StageUpdate::new(
                PipelineStage::Persisted,
                format!("Staged {} output tables", staged.len()),
            ),
        )?;

        let metadata = RunMetadata::from_analytics(&output.analytics, &self.config)?;
        staged.stage_json(&metadata, &self.config.run_meta)?;
        let mut artifacts = staged.commit()?;
        self.enter(
            state,
            StageUpdate::new(
                PipelineStage::MetadataWritten,
                format!("Run metadata written to {}", self.config.run_meta.display()),
            ),
        )?;

        if let Some(dir) = &self.config.reports_dir {
            // reports are side outputs; a failure here does not undo the run
            match write_reports(&output.orders_clean, &output.analytics, dir) {
                Ok(paths) => artifacts.extend(paths),
                Err(e) => warn!("Failed to write reports: {}", e),
            }
        }

        Ok(RunOutcome {
            analytics_rows: output.analytics.height(),
            metadata,
            final_stage: state.stage(),
            coercion_warnings: output.coercion_warnings,
            artifacts,
        })
    }

    fn transform_stages(
        &self,
        state: &mut RunState,
        orders_raw: &DataFrame,
        users_raw: &DataFrame,
    ) -> Result<TransformOutput> {
        // Structural gate before any coercion
        QualityGate::check_structure("orders", orders_raw, &ORDER_COLUMNS)?;
        QualityGate::check_structure("users", users_raw, &USER_COLUMNS)?;

        let (orders, mut coercion_warnings) = SchemaEnforcer::enforce_orders(orders_raw)?;
        let (users, user_warnings) = SchemaEnforcer::enforce_users(users_raw)?;
        coercion_warnings.extend(user_warnings);
        self.enter(
            state,
            StageUpdate::with_rows(
                PipelineStage::SchemaEnforced,
                orders.height(),
                format!(
                    "Schema enforced ({} coercion warnings)",
                    coercion_warnings.len()
                ),
            ),
        )?;

        QualityGate::check_users(&users)?;
        QualityGate::check_orders(&orders)?;
        self.enter(
            state,
            StageUpdate::with_rows(
                PipelineStage::QualityChecked,
                orders.height(),
                "Quality gates passed",
            ),
        )?;

        let orders_clean = self.derive_order_columns(&orders)?;

        let joined = safe_left_join(&orders_clean, &users, "user_id")?;
        assert_row_count_preserved(&orders_clean, &joined)?;
        self.enter(
            state,
            StageUpdate::with_rows(
                PipelineStage::Joined,
                joined.height(),
                "Joined orders with users",
            ),
        )?;

        let analytics = self.treat_outliers(&joined)?;
        self.enter(
            state,
            StageUpdate::with_rows(
                PipelineStage::OutlierTreated,
                analytics.height(),
                "Winsorized amount and flagged outliers",
            ),
        )?;

        Ok(TransformOutput {
            orders_clean,
            users_clean: users,
            analytics,
            coercion_warnings,
        })
    }

    /// Append `status_clean`, missing flags and time parts to typed orders.
    fn derive_order_columns(&self, orders: &DataFrame) -> Result<DataFrame> {
        let to_error = |e: anyhow::Error| EtlError::SchemaEnforcementFailed {
            table: "orders".to_string(),
            reason: e.to_string(),
        };

        let status = orders.column("status")?.as_materialized_series();
        let status_clean = normalize_text(status)
            .and_then(|s| apply_mapping(&s, &self.config.status_mapping))
            .map_err(to_error)?
            .with_name("status_clean".into());

        let mut derived = orders.clone();
        derived.with_column(status_clean)?;

        let derived = add_missing_flags("orders", &derived, &["amount", "quantity"])?;
        let derived = add_time_parts(&derived, "created_at").map_err(to_error)?;

        debug!("Derived order columns: {:?}", derived.get_column_names());
        Ok(derived)
    }

    /// Append `amount_winsor` and `amount_outlier`.
    fn treat_outliers(&self, joined: &DataFrame) -> Result<DataFrame> {
        let amount = joined.column("amount")?.as_materialized_series();
        let winsor = clip_outliers(amount, self.config.iqr_k)?.with_name("amount_winsor".into());
        let flags = flag_outliers(amount, self.config.iqr_k)?.with_name("amount_outlier".into());

        let flagged = flags.bool()?.sum().unwrap_or(0);
        info!("Flagged {} amount outliers (k = {})", flagged, self.config.iqr_k);

        let mut treated = joined.clone();
        treated.with_column(winsor)?;
        treated.with_column(flags)?;
        Ok(treated)
    }

    /// Advance the state machine and report the transition.
    fn enter(&self, state: &mut RunState, update: StageUpdate) -> Result<()> {
        state.advance(update.stage)?;
        info!("[{}] {}", update.stage.display_name(), update.message);
        self.report_progress(update);
        Ok(())
    }

    /// Move a failed run to `Failed` and report it. Successful results pass through.
    fn finish<T>(&self, state: &mut RunState, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if let Err(transition) = state.fail() {
                warn!("{}", transition);
            }
            error!(code = e.error_code(), "ETL run failed: {}", e);
            self.report_progress(StageUpdate::failed(e));
        }
        result
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: StageUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Builder for creating a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving stage updates.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(StageUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
        })
    }
}
