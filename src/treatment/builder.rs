use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};

use crate::model::FormulationAndRoute;
use crate::treatment::{
    DataType, Dosage, DosageHistory, DosageTimeRange, PatientCovariate, Sample, Treatment,
    TreatmentError,
};
use crate::units::Unit;

/// Fluent builder for [Treatment]
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use dosewise::model::FormulationAndRoute;
/// use dosewise::treatment::{DataType, Treatment};
/// use dosewise::units::Unit;
///
/// let treatment = Treatment::builder()
///     .patient_id("patient_001")
///     .range(
///         Utc.with_ymd_and_hms(2018, 7, 6, 8, 0, 0).unwrap(),
///         Utc.with_ymd_and_hms(2018, 7, 10, 8, 0, 0).unwrap(),
///         500.0,
///         Unit::new("mg"),
///         12.0,
///         FormulationAndRoute::new("tablet", "oral"),
///     )
///     .covariate(
///         "weight",
///         Utc.with_ymd_and_hms(2018, 7, 6, 8, 0, 0).unwrap(),
///         "70",
///         Unit::new("kg"),
///         DataType::Double,
///     )
///     .build()
///     .unwrap();
/// assert_eq!(treatment.dosage_history().ranges().len(), 1);
/// ```
pub struct TreatmentBuilder {
    patient_id: String,
    history: DosageHistory,
    covariates: Vec<PatientCovariate>,
    samples: Vec<Sample>,
    error: Option<TreatmentError>,
}

impl Default for TreatmentBuilder {
    fn default() -> Self {
        let patient_id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(5)
            .map(char::from)
            .collect();

        TreatmentBuilder {
            patient_id,
            history: DosageHistory::new(),
            covariates: Vec::new(),
            samples: Vec::new(),
            error: None,
        }
    }
}

impl TreatmentBuilder {
    pub fn patient_id(mut self, id: impl Into<String>) -> Self {
        self.patient_id = id.into();
        self
    }

    /// Add a dosage time range
    ///
    /// The dose is repeated every `interval_h` hours from `start` until
    /// `end`. An overlapping range is reported by [`build`].
    ///
    /// [`build`]: TreatmentBuilder::build
    pub fn range(
        mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dose: f64,
        dose_unit: Unit,
        interval_h: f64,
        formulation_and_route: FormulationAndRoute,
    ) -> Self {
        if self.error.is_none() {
            let dosage = Dosage::new(dose, dose_unit, interval_h);
            let range = DosageTimeRange::new(start, end, dosage, formulation_and_route);
            if let Err(e) = self.history.add_range(range) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Add a covariate observation
    pub fn covariate(
        mut self,
        id: impl Into<String>,
        date: DateTime<Utc>,
        value: impl Into<String>,
        unit: Unit,
        data_type: DataType,
    ) -> Self {
        self.covariates
            .push(PatientCovariate::new(id, date, value, unit, data_type));
        self
    }

    /// Add a measured concentration sample
    pub fn sample(mut self, date: DateTime<Utc>, value: f64, unit: Unit) -> Self {
        self.samples.push(Sample::new(date, value, unit));
        self
    }

    pub fn build(self) -> Result<Treatment, TreatmentError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Treatment::new(
            self.patient_id,
            self.history,
            self.covariates,
            self.samples,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builder_defaults_to_random_patient_id() {
        let treatment = Treatment::builder().build().unwrap();
        assert_eq!(treatment.patient_id().len(), 5);
    }

    #[test]
    fn test_builder_reports_overlap() {
        let start = Utc.with_ymd_and_hms(2018, 7, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2018, 7, 5, 8, 0, 0).unwrap();
        let oral = FormulationAndRoute::new("tablet", "oral");

        let result = Treatment::builder()
            .range(start, end, 500.0, Unit::new("mg"), 12.0, oral.clone())
            .range(start, end, 250.0, Unit::new("mg"), 12.0, oral)
            .build();
        assert!(matches!(
            result,
            Err(TreatmentError::OverlappingRanges { .. })
        ));
    }
}
