//! Data quality gate.
//!
//! Precondition checks that abort a run instead of repairing data. Each
//! violation is a distinct [`EtlError`](crate::error::EtlError) variant naming
//! the table and column at fault.

mod gate;

pub use gate::QualityGate;
