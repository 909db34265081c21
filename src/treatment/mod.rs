//! Patient treatment record
//!
//! A [Treatment] bundles everything extracted from a patient query for one
//! drug: the [DosageHistory] (what was prescribed and when), the
//! [PatientCovariate] observations (weight, creatinine, birthdate, ...)
//! and the measured blood concentration [Sample]s.

pub mod builder;
pub mod intake;

pub use builder::TreatmentBuilder;
pub use intake::{extract_intakes, IntakeError, IntakeEvent};

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::FormulationAndRoute;
use crate::units::Unit;

/// Errors raised while assembling or reading a treatment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreatmentError {
    #[error("Dosage time range starting {start} overlaps an existing range")]
    OverlappingRanges { start: DateTime<Utc> },
    #[error("Dosage time range starting {start} ends before it starts")]
    InvertedRange { start: DateTime<Utc> },
    #[error("Covariate {id} value '{value}' cannot be read as a number")]
    NotNumeric { id: String, value: String },
    #[error("Covariate {id} value '{value}' is not a valid date")]
    NotADate { id: String, value: String },
}

/// Declared data type of a patient covariate value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Double,
    Bool,
    Date,
}

/// A single covariate observation reported for the patient
///
/// The value is kept as the raw string from the query; [`parse_value`] and
/// [`parse_date`] interpret it according to the declared [DataType].
/// Several observations may share an identifier, forming a time series.
///
/// [`parse_value`]: PatientCovariate::parse_value
/// [`parse_date`]: PatientCovariate::parse_date
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientCovariate {
    id: String,
    date: DateTime<Utc>,
    value: String,
    unit: Unit,
    data_type: DataType,
}

impl PatientCovariate {
    pub fn new(
        id: impl Into<String>,
        date: DateTime<Utc>,
        value: impl Into<String>,
        unit: Unit,
        data_type: DataType,
    ) -> Self {
        PatientCovariate {
            id: id.into(),
            date,
            value: value.into(),
            unit,
            data_type,
        }
    }

    /// Get the covariate identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the observation timestamp
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Get the raw value string
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the declared unit of the value
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Get the declared data type of the value
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Interpret the raw value as a number
    ///
    /// Booleans map to 1.0/0.0. Date-typed values are not numeric and
    /// return an error.
    pub fn parse_value(&self) -> Result<f64, TreatmentError> {
        let not_numeric = || TreatmentError::NotNumeric {
            id: self.id.clone(),
            value: self.value.clone(),
        };

        match self.data_type {
            DataType::Int => self
                .value
                .trim()
                .parse::<i64>()
                .map(|v| v as f64)
                .map_err(|_| not_numeric()),
            DataType::Double => self.value.trim().parse::<f64>().map_err(|_| not_numeric()),
            DataType::Bool => match self.value.trim() {
                "true" | "1" => Ok(1.0),
                "false" | "0" => Ok(0.0),
                _ => Err(not_numeric()),
            },
            DataType::Date => Err(not_numeric()),
        }
    }

    /// Interpret the raw value as a calendar date
    ///
    /// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (taken at
    /// midnight UTC).
    pub fn parse_date(&self) -> Result<DateTime<Utc>, TreatmentError> {
        let raw = self.value.trim();
        if let Ok(date_time) = DateTime::parse_from_rfc3339(raw) {
            return Ok(date_time.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|date| {
                DateTime::<Utc>::from_naive_utc_and_offset(
                    date.and_time(NaiveTime::MIN),
                    Utc,
                )
            })
            .map_err(|_| TreatmentError::NotADate {
                id: self.id.clone(),
                value: self.value.clone(),
            })
    }
}

/// The prescribed dose repeated within a dosage time range
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dosage {
    dose: f64,
    unit: Unit,
    interval_h: f64,
}

impl Dosage {
    pub fn new(dose: f64, unit: Unit, interval_h: f64) -> Self {
        Dosage {
            dose,
            unit,
            interval_h,
        }
    }

    /// Get the dose amount
    pub fn dose(&self) -> f64 {
        self.dose
    }

    /// Get the unit of the dose amount
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Get the interval between intakes, in hours
    pub fn interval_h(&self) -> f64 {
        self.interval_h
    }
}

/// A contiguous period of the dosage history with one prescribed dosage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DosageTimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    dosage: Dosage,
    formulation_and_route: FormulationAndRoute,
}

impl DosageTimeRange {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dosage: Dosage,
        formulation_and_route: FormulationAndRoute,
    ) -> Self {
        DosageTimeRange {
            start,
            end,
            dosage,
            formulation_and_route,
        }
    }

    /// Get the start of the range
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Get the end of the range
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Get the prescribed dosage
    pub fn dosage(&self) -> &Dosage {
        &self.dosage
    }

    /// Get the formulation and route the dosage is administered with
    pub fn formulation_and_route(&self) -> &FormulationAndRoute {
        &self.formulation_and_route
    }
}

/// The ordered dosage history of one treatment
///
/// Ranges are kept chronologically non-decreasing by start and must not
/// overlap. The history may be empty (no treatment prescribed yet).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DosageHistory {
    ranges: Vec<DosageTimeRange>,
}

impl DosageHistory {
    pub fn new() -> Self {
        DosageHistory { ranges: Vec::new() }
    }

    /// Add a time range, keeping the chronological ordering invariant
    pub fn add_range(&mut self, range: DosageTimeRange) -> Result<(), TreatmentError> {
        if range.end < range.start {
            return Err(TreatmentError::InvertedRange { start: range.start });
        }
        if self
            .ranges
            .iter()
            .any(|r| range.start < r.end && r.start < range.end)
        {
            return Err(TreatmentError::OverlappingRanges { start: range.start });
        }

        self.ranges.push(range);
        self.ranges.sort_by_key(|r| r.start);
        Ok(())
    }

    /// Get all time ranges, ordered by start
    pub fn ranges(&self) -> &[DosageTimeRange] {
        &self.ranges
    }

    /// Check whether the history contains no ranges
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Get the distinct formulation/route pairs, in order of first use
    pub fn formulation_and_routes(&self) -> Vec<FormulationAndRoute> {
        let mut seen: Vec<FormulationAndRoute> = Vec::new();
        for range in &self.ranges {
            if !seen.contains(&range.formulation_and_route) {
                seen.push(range.formulation_and_route.clone());
            }
        }
        seen
    }

    /// Get the formulation/route of the latest range, if any
    pub fn last_formulation_and_route(&self) -> Option<&FormulationAndRoute> {
        self.ranges.last().map(|r| &r.formulation_and_route)
    }

    /// Get the start of the most recent range beginning strictly before `t`
    pub fn latest_start_before(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ranges
            .iter()
            .map(|r| r.start)
            .filter(|start| *start < t)
            .max()
    }

    /// Get the start of the earliest range beginning at or before `t`
    pub fn oldest_start_at_or_before(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ranges
            .iter()
            .map(|r| r.start)
            .filter(|start| *start <= t)
            .min()
    }
}

/// A measured blood concentration sample
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sample {
    date: DateTime<Utc>,
    value: f64,
    unit: Unit,
}

impl Sample {
    pub fn new(date: DateTime<Utc>, value: f64, unit: Unit) -> Self {
        Sample { date, value, unit }
    }

    /// Get the sampling timestamp
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Get the measured concentration value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Get the unit of the measured value
    pub fn unit(&self) -> &Unit {
        &self.unit
    }
}

/// The complete extracted treatment for one drug request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Treatment {
    patient_id: String,
    dosage_history: DosageHistory,
    covariates: Vec<PatientCovariate>,
    samples: Vec<Sample>,
}

impl Treatment {
    pub fn new(
        patient_id: impl Into<String>,
        dosage_history: DosageHistory,
        covariates: Vec<PatientCovariate>,
        samples: Vec<Sample>,
    ) -> Self {
        Treatment {
            patient_id: patient_id.into(),
            dosage_history,
            covariates,
            samples,
        }
    }

    /// Start building a treatment
    pub fn builder() -> TreatmentBuilder {
        TreatmentBuilder::default()
    }

    /// Get the patient identifier
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// Get the dosage history
    pub fn dosage_history(&self) -> &DosageHistory {
        &self.dosage_history
    }

    /// Get all covariate observations
    pub fn covariates(&self) -> &[PatientCovariate] {
        &self.covariates
    }

    /// Get the covariate observations sharing an identifier
    pub fn covariates_by_id(&self, id: &str) -> Vec<&PatientCovariate> {
        self.covariates.iter().filter(|c| c.id() == id).collect()
    }

    /// Get the earliest covariate observation date, or `default` if none
    pub fn oldest_covariate_date(&self, default: DateTime<Utc>) -> DateTime<Utc> {
        self.covariates
            .iter()
            .map(|c| c.date())
            .min()
            .map_or(default, |oldest| oldest.min(default))
    }

    /// Get the measured samples
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Treatment of patient '{}': {} dosage range(s), {} covariate(s), {} sample(s)",
            self.patient_id,
            self.dosage_history.ranges().len(),
            self.covariates.len(),
            self.samples.len()
        )
    }
}
