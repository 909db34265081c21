//! Adjustment requests and the computation plan sent to the engine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of curve points per hour requested from the computation engine
pub const POINTS_PER_HOUR: f64 = 20.0;

/// Whether a loading dose may be proposed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingOption {
    /// Leave the decision to the computation engine
    #[default]
    Unspecified,
    LoadingDoseAllowed,
    NoLoadingDose,
}

/// Whether a rest period may be proposed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestPeriodOption {
    /// Leave the decision to the computation engine
    #[default]
    Unspecified,
    RestPeriodAllowed,
    NoRestPeriod,
}

/// How the engine extracts the therapeutic targets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetExtractionOption {
    #[default]
    DefinitionIfNoIndividualTarget,
    IndividualTargets,
    DefinitionTargets,
}

/// Which formulations the engine may propose candidates for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulationAndRouteSelectionOption {
    #[default]
    LastFormulationAndRoute,
    DefaultFormulationAndRoute,
    AllFormulationAndRoutes,
}

/// How the engine should evaluate targets against steady state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SteadyStateTargetOption {
    AtSteadyState,
    WithinTreatmentTimeRange,
}

/// Parameterization the engine predicts concentrations with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMode {
    /// Typical population parameters (no dosage history)
    Population,
    /// Population parameters adjusted by covariates
    Apriori,
    /// Parameters individualized from measured samples
    Aposteriori,
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PredictionMode::Population => "population",
            PredictionMode::Apriori => "a priori",
            PredictionMode::Aposteriori => "a posteriori",
        };
        write!(f, "{label}")
    }
}

/// One dosage-adjustment request for a drug
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    drug_id: String,
    adjustment_time: Option<DateTime<Utc>>,
    loading_option: LoadingOption,
    rest_period_option: RestPeriodOption,
    target_extraction: Option<TargetExtractionOption>,
    formulation_selection: Option<FormulationAndRouteSelectionOption>,
}

impl AdjustmentRequest {
    pub fn new(drug_id: impl Into<String>) -> Self {
        AdjustmentRequest {
            drug_id: drug_id.into(),
            adjustment_time: None,
            loading_option: LoadingOption::Unspecified,
            rest_period_option: RestPeriodOption::Unspecified,
            target_extraction: None,
            formulation_selection: None,
        }
    }

    /// Request the adjustment to take effect at a specific instant
    pub fn with_adjustment_time(mut self, time: DateTime<Utc>) -> Self {
        self.adjustment_time = Some(time);
        self
    }

    /// Set the loading-dose option
    pub fn with_loading_option(mut self, option: LoadingOption) -> Self {
        self.loading_option = option;
        self
    }

    /// Set the rest-period option
    pub fn with_rest_period_option(mut self, option: RestPeriodOption) -> Self {
        self.rest_period_option = option;
        self
    }

    /// Set the target-extraction option
    pub fn with_target_extraction(mut self, option: TargetExtractionOption) -> Self {
        self.target_extraction = Some(option);
        self
    }

    /// Set the formulation-selection option
    pub fn with_formulation_selection(
        mut self,
        option: FormulationAndRouteSelectionOption,
    ) -> Self {
        self.formulation_selection = Some(option);
        self
    }

    /// Get the identifier of the drug to adjust
    pub fn drug_id(&self) -> &str {
        &self.drug_id
    }

    /// Get the explicitly requested adjustment instant, if any
    pub fn adjustment_time(&self) -> Option<DateTime<Utc>> {
        self.adjustment_time
    }

    /// Get the loading-dose option
    pub fn loading_option(&self) -> LoadingOption {
        self.loading_option
    }

    /// Get the rest-period option
    pub fn rest_period_option(&self) -> RestPeriodOption {
        self.rest_period_option
    }

    /// Get the target-extraction option, falling back to the default policy
    pub fn target_extraction(&self) -> TargetExtractionOption {
        self.target_extraction.unwrap_or_default()
    }

    /// Get the formulation-selection option, falling back to the default policy
    pub fn formulation_selection(&self) -> FormulationAndRouteSelectionOption {
        self.formulation_selection.unwrap_or_default()
    }
}

/// The fully specified computation request for one dosage adjustment
///
/// Built once per request by the pipeline; immutable once handed to the
/// computation engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdjustmentPlan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    adjustment_time: DateTime<Utc>,
    prediction_mode: PredictionMode,
    points_per_hour: f64,
    loading_option: LoadingOption,
    rest_period_option: RestPeriodOption,
    steady_state_target: SteadyStateTargetOption,
    target_extraction: TargetExtractionOption,
    formulation_selection: FormulationAndRouteSelectionOption,
}

impl AdjustmentPlan {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        adjustment_time: DateTime<Utc>,
        prediction_mode: PredictionMode,
        loading_option: LoadingOption,
        rest_period_option: RestPeriodOption,
        steady_state_target: SteadyStateTargetOption,
        target_extraction: TargetExtractionOption,
        formulation_selection: FormulationAndRouteSelectionOption,
    ) -> Self {
        AdjustmentPlan {
            start,
            end,
            adjustment_time,
            prediction_mode,
            points_per_hour: POINTS_PER_HOUR,
            loading_option,
            rest_period_option,
            steady_state_target,
            target_extraction,
            formulation_selection,
        }
    }

    /// Get the simulation window start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Get the simulation window end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Get the instant the new dosage takes effect
    pub fn adjustment_time(&self) -> DateTime<Utc> {
        self.adjustment_time
    }

    /// Get the prediction mode
    pub fn prediction_mode(&self) -> PredictionMode {
        self.prediction_mode
    }

    /// Get the requested curve density
    pub fn points_per_hour(&self) -> f64 {
        self.points_per_hour
    }

    /// Get the loading-dose option
    pub fn loading_option(&self) -> LoadingOption {
        self.loading_option
    }

    /// Get the rest-period option
    pub fn rest_period_option(&self) -> RestPeriodOption {
        self.rest_period_option
    }

    /// Get the steady-state target option
    pub fn steady_state_target(&self) -> SteadyStateTargetOption {
        self.steady_state_target
    }

    /// Get the target-extraction option
    pub fn target_extraction(&self) -> TargetExtractionOption {
        self.target_extraction
    }

    /// Get the formulation-selection option
    pub fn formulation_selection(&self) -> FormulationAndRouteSelectionOption {
        self.formulation_selection
    }
}

impl fmt::Display for AdjustmentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Adjustment at {} over [{}, {}], {} prediction",
            self.adjustment_time, self.start, self.end, self.prediction_mode
        )
    }
}
