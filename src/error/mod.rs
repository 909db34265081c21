use thiserror::Error;

use crate::grid::GridError;
use crate::model::ConstraintError;
use crate::pipeline::StageError;
use crate::treatment::{IntakeError, TreatmentError};
use crate::units::UnitError;

/// Top-level error type aggregating every module's failures
#[derive(Error, Debug)]
pub enum DosewiseError {
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),
    #[error("Treatment error: {0}")]
    Treatment(#[from] TreatmentError),
    #[error("Intake extraction error: {0}")]
    Intake(#[from] IntakeError),
    #[error("Constraint evaluation error: {0}")]
    Constraint(#[from] ConstraintError),
    #[error("Percentile grid error: {0}")]
    Grid(#[from] GridError),
    #[error("Pipeline error: {0}")]
    Stage(#[from] StageError),
}
