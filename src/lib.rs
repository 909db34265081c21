//! Dosewise selects the pharmacokinetic drug model best matching a
//! patient's treatment record and prepares the computation request for a
//! dosage-adjustment simulation.
//!
//! The crate is organized around a per-request decision pipeline:
//!
//! 1. [pipeline::ModelSelector] picks the registered [model::DrugModel]
//!    whose covariate definitions the patient's observations satisfy best.
//! 2. [pipeline::DoseValidator] checks the prescribed doses against the
//!    model's recommendations.
//! 3. [pipeline::AdjustmentPlanner] resolves the adjustment instant and
//!    the simulation window into an [request::AdjustmentPlan].
//! 4. [pipeline::SampleLocator] places each measured blood sample on the
//!    percentile curves simulated by the external computation engine.
//!
//! Every stage reads and writes one [pipeline::RequestContext]; the first
//! error terminates that request without affecting the other requests of
//! the query.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use dosewise::model::{
//!     DrugModel, FormulationAndRoute, FullFormulationAndRoute, HalfLife, ModelRepository,
//! };
//! use dosewise::pipeline::{run_pipeline, ModelSelector, PipelineStage, RequestContext};
//! use dosewise::request::AdjustmentRequest;
//! use dosewise::treatment::Treatment;
//! use dosewise::units::Unit;
//!
//! let mut repository = ModelRepository::new();
//! repository.add_model(
//!     DrugModel::new("ch.dosewise.imatinib", "imatinib", HalfLife::new(12.0, Unit::new("h")))
//!         .with_formulation(FullFormulationAndRoute::new(
//!             FormulationAndRoute::new("tablet", "oral"),
//!             Unit::new("mg"),
//!             100.0,
//!             800.0,
//!         )),
//! );
//!
//! let treatment = Treatment::builder().patient_id("patient_001").build().unwrap();
//! let mut ctx = RequestContext::new(
//!     AdjustmentRequest::new("imatinib"),
//!     treatment,
//!     Utc.with_ymd_and_hms(2018, 7, 10, 8, 0, 0).unwrap(),
//! );
//!
//! let selector = ModelSelector::new(&repository);
//! run_pipeline(&mut ctx, &[&selector]);
//! assert_eq!(ctx.drug_model().unwrap().id(), "ch.dosewise.imatinib");
//! ```

pub mod error;
pub mod grid;
pub mod model;
pub mod pipeline;
pub mod request;
pub mod treatment;
pub mod units;

pub use error::DosewiseError;

pub mod prelude {
    pub use crate::error::DosewiseError;
    pub use crate::grid::{GridProvider, PercentileCurve, PercentileGrid, TimeSegment};
    pub use crate::model::{
        CovariateDefinition, CovariateKind, DrugModel, FormulationAndRoute,
        FullFormulationAndRoute, HalfLife, ModelRepository, StandardTreatment, ValidationRule,
    };
    pub use crate::pipeline::{
        evaluate_requests, run_pipeline, AdjustmentPlanner, DoseValidator, ModelSelector,
        PipelineStage, RequestContext, SampleLocator,
    };
    pub use crate::request::{AdjustmentPlan, AdjustmentRequest, PredictionMode};
    pub use crate::treatment::{DataType, Treatment, TreatmentBuilder};
    pub use crate::units::Unit;
}
