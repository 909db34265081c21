//! Drug model catalogue
//!
//! A [DrugModel] is a read-only description of one pharmacokinetic model:
//! the covariates it is parameterized by, the domain constraints limiting
//! the patients it applies to, the formulations and administration routes
//! it supports, and its elimination half-life. Models are registered in a
//! [ModelRepository] and looked up by drug identifier.

pub mod constraints;
pub mod covariate;

pub use constraints::{
    evaluate_constraints, ConstraintDetail, ConstraintError, ConstraintEvaluation, ConstraintKind,
    ConstraintVerdict, DomainConstraint,
};
pub use covariate::{CovariateDefinition, CovariateKind, ValidationRule};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::treatment::DosageHistory;
use crate::units::Unit;

/// A drug formulation paired with an administration route
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormulationAndRoute {
    formulation: String,
    route: String,
}

impl FormulationAndRoute {
    pub fn new(formulation: impl Into<String>, route: impl Into<String>) -> Self {
        FormulationAndRoute {
            formulation: formulation.into(),
            route: route.into(),
        }
    }

    /// Get the formulation identifier
    pub fn formulation(&self) -> &str {
        &self.formulation
    }

    /// Get the administration route identifier
    pub fn route(&self) -> &str {
        &self.route
    }
}

impl fmt::Display for FormulationAndRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.formulation, self.route)
    }
}

/// A fixed-duration standard treatment prescribed by a formulation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StandardTreatment {
    duration: f64,
    unit: Unit,
}

impl StandardTreatment {
    pub fn new(duration: f64, unit: Unit) -> Self {
        StandardTreatment { duration, unit }
    }

    /// Get the fixed treatment duration
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Get the unit of the duration
    pub fn unit(&self) -> &Unit {
        &self.unit
    }
}

/// A supported formulation/route with its dosing recommendations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullFormulationAndRoute {
    formulation_and_route: FormulationAndRoute,
    dose_unit: Unit,
    min_dose: f64,
    max_dose: f64,
    standard_treatment: Option<StandardTreatment>,
    loading_dose_recommended: bool,
    rest_period_recommended: bool,
}

impl FullFormulationAndRoute {
    pub fn new(
        formulation_and_route: FormulationAndRoute,
        dose_unit: Unit,
        min_dose: f64,
        max_dose: f64,
    ) -> Self {
        FullFormulationAndRoute {
            formulation_and_route,
            dose_unit,
            min_dose,
            max_dose,
            standard_treatment: None,
            loading_dose_recommended: false,
            rest_period_recommended: false,
        }
    }

    /// Attach a fixed-duration standard treatment
    pub fn with_standard_treatment(mut self, standard: StandardTreatment) -> Self {
        self.standard_treatment = Some(standard);
        self
    }

    /// Mark a loading dose as recommended for this formulation
    pub fn with_loading_dose_recommended(mut self) -> Self {
        self.loading_dose_recommended = true;
        self
    }

    /// Mark a rest period as recommended for this formulation
    pub fn with_rest_period_recommended(mut self) -> Self {
        self.rest_period_recommended = true;
        self
    }

    /// Get the formulation/route pair
    pub fn formulation_and_route(&self) -> &FormulationAndRoute {
        &self.formulation_and_route
    }

    /// Get the unit doses are expressed in
    pub fn dose_unit(&self) -> &Unit {
        &self.dose_unit
    }

    /// Get the minimum recommended dose
    pub fn min_dose(&self) -> f64 {
        self.min_dose
    }

    /// Get the maximum recommended dose
    pub fn max_dose(&self) -> f64 {
        self.max_dose
    }

    /// Get the standard treatment, if this formulation prescribes one
    pub fn standard_treatment(&self) -> Option<&StandardTreatment> {
        self.standard_treatment.as_ref()
    }

    /// Check whether a loading dose is recommended
    pub fn loading_dose_recommended(&self) -> bool {
        self.loading_dose_recommended
    }

    /// Check whether a rest period is recommended
    pub fn rest_period_recommended(&self) -> bool {
        self.rest_period_recommended
    }
}

/// Elimination half-life of the modeled drug
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HalfLife {
    value: f64,
    unit: Unit,
}

impl HalfLife {
    pub fn new(value: f64, unit: Unit) -> Self {
        HalfLife { value, unit }
    }

    /// Get the half-life value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Get the unit of the half-life value
    pub fn unit(&self) -> &Unit {
        &self.unit
    }
}

/// One pharmacokinetic drug model of the catalogue
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrugModel {
    id: String,
    drug_id: String,
    half_life: HalfLife,
    covariates: Vec<CovariateDefinition>,
    constraints: Vec<DomainConstraint>,
    formulations: Vec<FullFormulationAndRoute>,
}

impl DrugModel {
    pub fn new(id: impl Into<String>, drug_id: impl Into<String>, half_life: HalfLife) -> Self {
        DrugModel {
            id: id.into(),
            drug_id: drug_id.into(),
            half_life,
            covariates: Vec::new(),
            constraints: Vec::new(),
            formulations: Vec::new(),
        }
    }

    /// Add a covariate definition
    pub fn with_covariate(mut self, definition: CovariateDefinition) -> Self {
        self.covariates.push(definition);
        self
    }

    /// Add a domain constraint
    pub fn with_constraint(mut self, constraint: DomainConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Add a supported formulation/route
    pub fn with_formulation(mut self, formulation: FullFormulationAndRoute) -> Self {
        self.formulations.push(formulation);
        self
    }

    /// Get the model identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the identifier of the modeled drug
    pub fn drug_id(&self) -> &str {
        &self.drug_id
    }

    /// Get the elimination half-life
    pub fn half_life(&self) -> &HalfLife {
        &self.half_life
    }

    /// Get the covariate definitions
    pub fn covariates(&self) -> &[CovariateDefinition] {
        &self.covariates
    }

    /// Get the domain constraints
    pub fn constraints(&self) -> &[DomainConstraint] {
        &self.constraints
    }

    /// Get the supported formulations
    pub fn formulations(&self) -> &[FullFormulationAndRoute] {
        &self.formulations
    }

    /// Find the full formulation matching a formulation/route pair
    pub fn formulation_for(
        &self,
        pair: &FormulationAndRoute,
    ) -> Option<&FullFormulationAndRoute> {
        self.formulations
            .iter()
            .find(|f| f.formulation_and_route() == pair)
    }

    /// Get the model's default formulation (the first declared)
    pub fn default_formulation(&self) -> Option<&FullFormulationAndRoute> {
        self.formulations.first()
    }

    /// Check whether every formulation/route used by a dosage history is
    /// supported by this model
    ///
    /// An empty history is compatible with every model.
    pub fn supports_history(&self, history: &DosageHistory) -> bool {
        history
            .formulation_and_routes()
            .iter()
            .all(|used| self.formulation_for(used).is_some())
    }
}

impl fmt::Display for DrugModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Drug model '{}' for {} ({} covariate(s), {} formulation(s))",
            self.id,
            self.drug_id,
            self.covariates.len(),
            self.formulations.len()
        )
    }
}

/// The read-only catalogue of registered drug models
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelRepository {
    models: Vec<DrugModel>,
}

impl ModelRepository {
    pub fn new() -> Self {
        ModelRepository { models: Vec::new() }
    }

    /// Register a model
    pub fn add_model(&mut self, model: DrugModel) {
        self.models.push(model);
    }

    /// Get every model registered for a drug, in registration order
    pub fn models_for_drug(&self, drug_id: &str) -> Vec<&DrugModel> {
        self.models
            .iter()
            .filter(|m| m.drug_id() == drug_id)
            .collect()
    }

    /// Get the number of registered models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check whether the catalogue is empty
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treatment::{Dosage, DosageTimeRange};
    use chrono::{TimeZone, Utc};

    fn oral() -> FormulationAndRoute {
        FormulationAndRoute::new("tablet", "oral")
    }

    fn model_supporting(pair: FormulationAndRoute) -> DrugModel {
        DrugModel::new("m1", "imatinib", HalfLife::new(12.0, Unit::new("h"))).with_formulation(
            FullFormulationAndRoute::new(pair, Unit::new("mg"), 100.0, 800.0),
        )
    }

    #[test]
    fn test_repository_lookup_by_drug() {
        let mut repository = ModelRepository::new();
        repository.add_model(model_supporting(oral()));
        repository.add_model(DrugModel::new(
            "m2",
            "rifampicin",
            HalfLife::new(3.0, Unit::new("h")),
        ));

        assert_eq!(repository.models_for_drug("imatinib").len(), 1);
        assert_eq!(repository.models_for_drug("unknown").len(), 0);
    }

    #[test]
    fn test_supports_history() {
        let model = model_supporting(oral());

        let mut history = DosageHistory::new();
        assert!(model.supports_history(&history));

        history
            .add_range(DosageTimeRange::new(
                Utc.with_ymd_and_hms(2018, 7, 1, 8, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2018, 7, 5, 8, 0, 0).unwrap(),
                Dosage::new(400.0, Unit::new("mg"), 24.0),
                oral(),
            ))
            .unwrap();
        assert!(model.supports_history(&history));

        history
            .add_range(DosageTimeRange::new(
                Utc.with_ymd_and_hms(2018, 7, 6, 8, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2018, 7, 8, 8, 0, 0).unwrap(),
                Dosage::new(400.0, Unit::new("mg"), 24.0),
                FormulationAndRoute::new("solution", "intravenous"),
            ))
            .unwrap();
        assert!(!model.supports_history(&history));
    }

    #[test]
    fn test_formulation_lookup() {
        let model = model_supporting(oral());
        assert!(model.formulation_for(&oral()).is_some());
        assert!(model
            .formulation_for(&FormulationAndRoute::new("solution", "intravenous"))
            .is_none());
        assert_eq!(
            model.default_formulation().unwrap().formulation_and_route(),
            &oral()
        );
    }
}
