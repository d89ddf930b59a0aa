//! Run state machine and progress reporting for the ETL pipeline.
//!
//! A run moves through a fixed sequence of stages. [`RunState`] enforces the
//! order: a stage can only be entered from its immediate predecessor, and
//! any non-terminal stage may fall into [`PipelineStage::Failed`].
//!
//! # Example
//!
//! ```rust,ignore
//! use order_etl::Pipeline;
//!
//! let outcome = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{}] {}", update.stage.display_name(), update.message);
//!     })
//!     .build()?
//!     .run()?;
//! ```

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of an ETL run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Nothing has run yet
    Idle,
    /// Raw tables are loaded
    Extracted,
    /// Both tables carry their typed schema
    SchemaEnforced,
    /// Structural and semantic gates passed
    QualityChecked,
    /// Orders joined with users
    Joined,
    /// Outlier flags and winsorized amounts appended
    OutlierTreated,
    /// Output tables written
    Persisted,
    /// Run metadata written; the run is complete
    MetadataWritten,
    /// The run aborted
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Extracted => "Extracting",
            Self::SchemaEnforced => "Enforcing Schema",
            Self::QualityChecked => "Checking Quality",
            Self::Joined => "Joining Tables",
            Self::OutlierTreated => "Treating Outliers",
            Self::Persisted => "Persisting Outputs",
            Self::MetadataWritten => "Writing Metadata",
            Self::Failed => "Failed",
        }
    }

    /// The stage that legally follows this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Extracted),
            Self::Extracted => Some(Self::SchemaEnforced),
            Self::SchemaEnforced => Some(Self::QualityChecked),
            Self::QualityChecked => Some(Self::Joined),
            Self::Joined => Some(Self::OutlierTreated),
            Self::OutlierTreated => Some(Self::Persisted),
            Self::Persisted => Some(Self::MetadataWritten),
            Self::MetadataWritten | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MetadataWritten | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Extracted => "extracted",
            Self::SchemaEnforced => "schema_enforced",
            Self::QualityChecked => "quality_checked",
            Self::Joined => "joined",
            Self::OutlierTreated => "outlier_treated",
            Self::Persisted => "persisted",
            Self::MetadataWritten => "metadata_written",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current position of one run in the stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunState {
    stage: PipelineStage,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Move to `next`, which must be the immediate successor of the current stage.
    pub fn advance(&mut self, next: PipelineStage) -> Result<()> {
        if self.stage.next() != Some(next) {
            return Err(EtlError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Move to `Failed`. A finished or already failed run cannot fail again.
    pub fn fail(&mut self) -> Result<()> {
        if self.stage.is_terminal() {
            return Err(EtlError::InvalidTransition {
                from: self.stage.to_string(),
                to: PipelineStage::Failed.to_string(),
            });
        }
        self.stage = PipelineStage::Failed;
        Ok(())
    }
}

/// Notification emitted on every stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageUpdate {
    /// Stage just entered
    pub stage: PipelineStage,

    /// Human-readable message describing the transition
    pub message: String,

    /// Rows in the table the stage produced, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,

    /// Error code when `stage` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl StageUpdate {
    pub fn new(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            rows: None,
            error_code: None,
        }
    }

    pub fn with_rows(stage: PipelineStage, rows: usize, message: impl Into<String>) -> Self {
        Self {
            rows: Some(rows),
            ..Self::new(stage, message)
        }
    }

    /// Creates a failed update from the error that aborted the run.
    pub fn failed(error: &EtlError) -> Self {
        Self {
            error_code: Some(error.error_code().to_string()),
            ..Self::new(PipelineStage::Failed, error.to_string())
        }
    }
}

/// Trait for receiving stage updates during a run.
///
/// Implementations must be `Send + Sync` so a pipeline can be moved to a
/// worker thread together with its reporter.
pub trait ProgressReporter: Send + Sync {
    /// Called once per stage transition. Should not block.
    fn report(&self, update: StageUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(StageUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(StageUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(StageUpdate) + Send + Sync,
{
    fn report(&self, update: StageUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(StageUpdate: Send, Sync);
static_assertions::assert_impl_all!(RunState: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HAPPY_PATH: [PipelineStage; 7] = [
        PipelineStage::Extracted,
        PipelineStage::SchemaEnforced,
        PipelineStage::QualityChecked,
        PipelineStage::Joined,
        PipelineStage::OutlierTreated,
        PipelineStage::Persisted,
        PipelineStage::MetadataWritten,
    ];

    #[test]
    fn test_run_state_walks_happy_path() {
        let mut state = RunState::new();
        assert_eq!(state.stage(), PipelineStage::Idle);

        for stage in HAPPY_PATH {
            state.advance(stage).unwrap();
            assert_eq!(state.stage(), stage);
        }
        assert!(state.stage().is_terminal());
    }

    #[test]
    fn test_run_state_rejects_skipped_stage() {
        let mut state = RunState::new();
        state.advance(PipelineStage::Extracted).unwrap();

        let err = state.advance(PipelineStage::Joined).unwrap_err();
        assert!(matches!(
            err,
            EtlError::InvalidTransition { ref from, ref to } if from == "extracted" && to == "joined"
        ));
        // state unchanged after a rejected transition
        assert_eq!(state.stage(), PipelineStage::Extracted);
    }

    #[test]
    fn test_run_state_rejects_repeat() {
        let mut state = RunState::new();
        state.advance(PipelineStage::Extracted).unwrap();
        assert!(state.advance(PipelineStage::Extracted).is_err());
    }

    #[test]
    fn test_fail_from_any_non_terminal_stage() {
        for steps in 0..HAPPY_PATH.len() {
            let mut state = RunState::new();
            for stage in &HAPPY_PATH[..steps] {
                state.advance(*stage).unwrap();
            }
            state.fail().unwrap();
            assert_eq!(state.stage(), PipelineStage::Failed);
            assert!(state.advance(PipelineStage::Extracted).is_err());
        }
    }

    #[test]
    fn test_fail_after_completion_is_rejected() {
        let mut state = RunState::new();
        for stage in HAPPY_PATH {
            state.advance(stage).unwrap();
        }
        assert!(state.fail().is_err());
        assert_eq!(state.stage(), PipelineStage::MetadataWritten);
    }

    #[test]
    fn test_stage_update_failed_carries_code() {
        let error = EtlError::EmptyDataset {
            table: "orders".to_string(),
        };
        let update = StageUpdate::failed(&error);
        assert_eq!(update.stage, PipelineStage::Failed);
        assert_eq!(update.error_code.as_deref(), Some("EMPTY_DATASET"));
        assert!(update.message.contains("orders"));
    }

    #[test]
    fn test_stage_update_json() {
        let update = StageUpdate::with_rows(PipelineStage::Joined, 5, "Joined orders with users");
        let json = serde_json::to_string(&update).expect("Should serialize");

        assert!(json.contains("\"stage\":\"joined\""), "Stage should be snake_case");
        assert!(json.contains("\"rows\":5"));
        assert!(!json.contains("error_code"));
    }

    #[test]
    fn test_closure_progress_reporter() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(StageUpdate::new(PipelineStage::Extracted, "Test"));
        reporter.report(StageUpdate::new(PipelineStage::SchemaEnforced, "Test"));

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stage_display_name() {
        assert_eq!(PipelineStage::Joined.display_name(), "Joining Tables");
        assert_eq!(PipelineStage::Failed.display_name(), "Failed");
    }
}
