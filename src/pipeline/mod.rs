//! The per-request decision pipeline
//!
//! Each drug request runs through four stages in a fixed order: drug-model
//! selection, dose validation, adjustment planning, and sample location.
//! Stages communicate through a [RequestContext]; the first stage error is
//! recorded on the context and every later stage refuses to run. A failed
//! request never affects its siblings, so [evaluate_requests] fans the
//! contexts of one query out over a thread pool.

pub mod adjustment;
pub mod doses;
pub mod results;
pub mod samples;
pub mod selector;

pub use adjustment::AdjustmentPlanner;
pub use doses::DoseValidator;
pub use results::{CovariateMatch, CovariateSource, DoseCheck, SampleMatch, WarningLevel};
pub use samples::SampleLocator;
pub use selector::ModelSelector;

use chrono::{DateTime, Utc};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::GridProvider;
use crate::model::{DrugModel, ModelRepository};
use crate::request::{AdjustmentPlan, AdjustmentRequest};
use crate::treatment::{IntakeEvent, Treatment};
use crate::units::UnitError;

/// Errors that terminate a single request
///
/// Every variant maps to a human-readable message recorded on the
/// [RequestContext]; none of them crosses the pipeline boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("No treatment set")]
    MissingTreatment,
    #[error("No drug model set")]
    MissingDrugModel,
    #[error("All formulations and routes must be equal")]
    MixedFormulations,
    #[error("No valid drug model found")]
    NoValidModel,
    #[error("Drug model {model} does not define the formulation and route used by the treatment")]
    UnknownFormulation { model: String },
    #[error("Half-life of drug model {model} cannot be converted to hours: {source}")]
    HalfLifeConversion { model: String, source: UnitError },
    #[error("Half-life of drug model {model} must be positive")]
    NonPositiveHalfLife { model: String },
    #[error("Standard treatment duration of drug model {model} cannot be converted to days: {source}")]
    DurationConversion { model: String, source: UnitError },
    #[error(
        "Based on the standard treatment in drug model {model}, the treatment is already over"
    )]
    TreatmentAlreadyOver { model: String },
    #[error("Dose of the range starting {start} cannot be converted: {source}")]
    DoseConversion {
        start: DateTime<Utc>,
        source: UnitError,
    },
    #[error("Samples found but dosage history is empty")]
    SamplesWithoutDosage,
    #[error("Percentiles computation failed for the sample taken at {date}: {detail}")]
    PercentilesFailed { date: DateTime<Utc>, detail: String },
    #[error("No percentile segment contains the sample taken at {date}")]
    SampleNotCovered { date: DateTime<Utc> },
    #[error("Unit conversion failed for the sample taken at {date}: {source}")]
    SampleConversion {
        date: DateTime<Utc>,
        source: UnitError,
    },
}

/// The mutable record threaded through the stages of one request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestContext {
    request: AdjustmentRequest,
    treatment: Option<Treatment>,
    computation_time: DateTime<Utc>,
    drug_model: Option<DrugModel>,
    covariate_matches: Vec<CovariateMatch>,
    dose_checks: Vec<DoseCheck>,
    sample_matches: Vec<SampleMatch>,
    last_intake: Option<IntakeEvent>,
    adjustment_plan: Option<AdjustmentPlan>,
    error: Option<String>,
}

impl RequestContext {
    /// Create the context for one request
    ///
    /// `computation_time` is the fixed reference instant every temporal
    /// decision of the pipeline is made against.
    pub fn new(
        request: AdjustmentRequest,
        treatment: Treatment,
        computation_time: DateTime<Utc>,
    ) -> Self {
        RequestContext {
            request,
            treatment: Some(treatment),
            computation_time,
            drug_model: None,
            covariate_matches: Vec::new(),
            dose_checks: Vec::new(),
            sample_matches: Vec::new(),
            last_intake: None,
            adjustment_plan: None,
            error: None,
        }
    }

    /// Create a context for a request whose treatment extraction failed
    pub fn failed(
        request: AdjustmentRequest,
        computation_time: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        RequestContext {
            request,
            treatment: None,
            computation_time,
            drug_model: None,
            covariate_matches: Vec::new(),
            dose_checks: Vec::new(),
            sample_matches: Vec::new(),
            last_intake: None,
            adjustment_plan: None,
            error: Some(message.into()),
        }
    }

    /// Get the request being processed
    pub fn request(&self) -> &AdjustmentRequest {
        &self.request
    }

    /// Get the extracted treatment, if extraction succeeded
    pub fn treatment(&self) -> Option<&Treatment> {
        self.treatment.as_ref()
    }

    /// Get the fixed reference instant of the request
    pub fn computation_time(&self) -> DateTime<Utc> {
        self.computation_time
    }

    /// Get the selected drug model, if selection has run
    pub fn drug_model(&self) -> Option<&DrugModel> {
        self.drug_model.as_ref()
    }

    /// Get the covariate match results of the selected model
    pub fn covariate_matches(&self) -> &[CovariateMatch] {
        &self.covariate_matches
    }

    /// Get the dose check results
    pub fn dose_checks(&self) -> &[DoseCheck] {
        &self.dose_checks
    }

    /// Get the sample location results
    pub fn sample_matches(&self) -> &[SampleMatch] {
        &self.sample_matches
    }

    /// Get the latest past intake, if the planner found one
    pub fn last_intake(&self) -> Option<&IntakeEvent> {
        self.last_intake.as_ref()
    }

    /// Get the computation plan, if planning has run
    pub fn adjustment_plan(&self) -> Option<&AdjustmentPlan> {
        self.adjustment_plan.as_ref()
    }

    /// Get the error that terminated the request, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn set_drug_model(&mut self, model: DrugModel) {
        self.drug_model = Some(model);
    }

    pub(crate) fn set_covariate_matches(&mut self, matches: Vec<CovariateMatch>) {
        self.covariate_matches = matches;
    }

    pub(crate) fn set_dose_checks(&mut self, checks: Vec<DoseCheck>) {
        self.dose_checks = checks;
    }

    pub(crate) fn set_sample_matches(&mut self, matches: Vec<SampleMatch>) {
        self.sample_matches = matches;
    }

    pub(crate) fn set_last_intake(&mut self, intake: Option<IntakeEvent>) {
        self.last_intake = intake;
    }

    pub(crate) fn set_adjustment_plan(&mut self, plan: AdjustmentPlan) {
        self.adjustment_plan = Some(plan);
    }

    fn record_error(&mut self, error: StageError) {
        self.error = Some(error.to_string());
    }
}

/// One stage of the decision pipeline
pub trait PipelineStage {
    /// Get the stage name used in logs
    fn name(&self) -> &'static str;

    /// Run the stage against the context
    fn run(&self, ctx: &mut RequestContext) -> Result<(), StageError>;
}

/// Run the stages in order, stopping at the first recorded error
pub fn run_pipeline(ctx: &mut RequestContext, stages: &[&dyn PipelineStage]) {
    for stage in stages {
        if ctx.error().is_some() {
            return;
        }
        if let Err(error) = stage.run(ctx) {
            debug!("stage {} stopped the request: {}", stage.name(), error);
            ctx.record_error(error);
        }
    }
}

/// Evaluate the independent requests of one query
///
/// Each context runs its own pipeline; the model catalogue and the grid
/// provider are shared read-only. Contexts are returned in input order.
pub fn evaluate_requests(
    contexts: Vec<RequestContext>,
    repository: &ModelRepository,
    provider: &(dyn GridProvider + Sync),
) -> Vec<RequestContext> {
    contexts
        .into_par_iter()
        .map(|mut ctx| {
            let selector = ModelSelector::new(repository);
            let doses = DoseValidator;
            let planner = AdjustmentPlanner;
            let locator = SampleLocator::new(provider);
            let stages: [&dyn PipelineStage; 4] = [&selector, &doses, &planner, &locator];
            run_pipeline(&mut ctx, &stages);
            ctx
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treatment::Treatment;
    use chrono::TimeZone;

    struct Succeeding;
    impl PipelineStage for Succeeding {
        fn name(&self) -> &'static str {
            "succeeding"
        }
        fn run(&self, ctx: &mut RequestContext) -> Result<(), StageError> {
            ctx.set_covariate_matches(Vec::new());
            Ok(())
        }
    }

    struct Failing;
    impl PipelineStage for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn run(&self, _ctx: &mut RequestContext) -> Result<(), StageError> {
            Err(StageError::MissingDrugModel)
        }
    }

    struct MustNotRun;
    impl PipelineStage for MustNotRun {
        fn name(&self) -> &'static str {
            "must_not_run"
        }
        fn run(&self, _ctx: &mut RequestContext) -> Result<(), StageError> {
            panic!("stage ran after an error was recorded");
        }
    }

    fn context() -> RequestContext {
        RequestContext::new(
            AdjustmentRequest::new("imatinib"),
            Treatment::builder().patient_id("p").build().unwrap(),
            Utc.with_ymd_and_hms(2018, 7, 10, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_pipeline_short_circuits_after_error() {
        let mut ctx = context();
        run_pipeline(&mut ctx, &[&Succeeding, &Failing, &MustNotRun]);
        assert_eq!(ctx.error(), Some("No drug model set"));
    }

    #[test]
    fn test_failed_context_runs_no_stage() {
        let mut ctx = RequestContext::failed(
            AdjustmentRequest::new("imatinib"),
            Utc.with_ymd_and_hms(2018, 7, 10, 8, 0, 0).unwrap(),
            "Treatment extraction failed",
        );
        run_pipeline(&mut ctx, &[&MustNotRun]);
        assert_eq!(ctx.error(), Some("Treatment extraction failed"));
    }
}
