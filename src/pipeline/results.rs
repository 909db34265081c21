//! Per-request diagnostic results accumulated by the pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::CovariateDefinition;
use crate::treatment::{Dosage, PatientCovariate, Sample};
use crate::units::Unit;

/// Where the value of a matched covariate comes from
///
/// The two sources are mutually exclusive: either the patient reported a
/// value, or the engine will fall back to the model's default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CovariateSource {
    /// No patient observation; the model default applies
    Model,
    /// The patient observation overriding the model default
    Patient(PatientCovariate),
}

/// Association between a covariate definition and the patient data
/// matched against it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CovariateMatch {
    definition: CovariateDefinition,
    source: CovariateSource,
    warning: Option<String>,
}

impl CovariateMatch {
    pub(crate) fn from_patient(
        definition: CovariateDefinition,
        observation: PatientCovariate,
        warning: Option<String>,
    ) -> Self {
        CovariateMatch {
            definition,
            source: CovariateSource::Patient(observation),
            warning,
        }
    }

    pub(crate) fn missing(definition: CovariateDefinition) -> Self {
        let warning = format!("No patient value for {}", definition.id());
        CovariateMatch {
            definition,
            source: CovariateSource::Model,
            warning: Some(warning),
        }
    }

    /// Get the matched covariate definition
    pub fn definition(&self) -> &CovariateDefinition {
        &self.definition
    }

    /// Get the source of the covariate value
    pub fn source(&self) -> &CovariateSource {
        &self.source
    }

    /// Get the value the computation engine will receive
    pub fn value(&self) -> String {
        match &self.source {
            CovariateSource::Patient(observation) => observation.value().to_string(),
            CovariateSource::Model => self.definition.default_value().to_string(),
        }
    }

    /// Get the unit of the value
    pub fn unit(&self) -> &Unit {
        match &self.source {
            CovariateSource::Patient(observation) => observation.unit(),
            CovariateSource::Model => self.definition.unit(),
        }
    }

    /// Get the warning, set when validation failed or the value is missing
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }
}

/// Outcome of checking one prescribed dose against the model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoseCheck {
    dosage: Dosage,
    range_start: DateTime<Utc>,
    warning: Option<String>,
}

impl DoseCheck {
    pub(crate) fn new(dosage: Dosage, range_start: DateTime<Utc>, warning: Option<String>) -> Self {
        DoseCheck {
            dosage,
            range_start,
            warning,
        }
    }

    /// Get the checked dosage
    pub fn dosage(&self) -> &Dosage {
        &self.dosage
    }

    /// Get the start of the dosage time range the dose belongs to
    pub fn range_start(&self) -> DateTime<Utc> {
        self.range_start
    }

    /// Get the warning, set when the dose is outside the recommended bounds
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }
}

/// Severity of a sample's position within the population
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningLevel {
    Normal,
    Critical,
}

/// Position of one measured sample within the simulated population
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampleMatch {
    sample: Sample,
    rank: usize,
    warning: Option<String>,
}

impl SampleMatch {
    pub(crate) fn new(sample: Sample, rank: usize) -> Self {
        let warning = if rank <= 10 {
            Some(format!("{}% of the population is above", 100 - rank))
        } else if rank > 90 {
            Some(format!("{}% of the population is below", rank - 1))
        } else {
            None
        };
        SampleMatch {
            sample,
            rank,
            warning,
        }
    }

    /// Get the located sample
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    /// Get the 1-based percentile rank the sample falls into
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Get the population warning for unusual samples
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Get the severity of the sample's position
    pub fn warning_level(&self) -> WarningLevel {
        if self.rank <= 5 || self.rank > 95 {
            WarningLevel::Critical
        } else {
            WarningLevel::Normal
        }
    }
}
