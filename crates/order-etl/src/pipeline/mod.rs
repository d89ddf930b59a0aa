//! Pipeline module.
//!
//! This module provides the ETL orchestrator, its run state machine and
//! the IQR outlier engine.

mod builder;
pub mod outliers;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder, RunOutcome, TransformOutput};
pub use outliers::{IqrBounds, clip_outliers, flag_outliers};
pub use progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, RunState, StageUpdate,
};
