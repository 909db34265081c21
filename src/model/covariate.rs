//! Covariate definitions carried by a drug model

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::units::Unit;

/// Predicate a covariate value has to satisfy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ValidationRule {
    /// Every value is acceptable
    Any,
    /// Value must lie in `[min, max]`
    Range { min: f64, max: f64 },
    /// Value must be at least `min`
    AtLeast(f64),
    /// Value must be at most `max`
    AtMost(f64),
    /// Value must equal one of the listed values
    InSet(Vec<f64>),
}

impl ValidationRule {
    /// Check a value against the rule
    pub fn check(&self, value: f64) -> bool {
        match self {
            ValidationRule::Any => true,
            ValidationRule::Range { min, max } => *min <= value && value <= *max,
            ValidationRule::AtLeast(min) => value >= *min,
            ValidationRule::AtMost(max) => value <= *max,
            ValidationRule::InSet(allowed) => allowed.contains(&value),
        }
    }
}

/// What a covariate definition measures
///
/// Age definitions are never observed directly; their value is derived
/// from the patient's `birthdate` observation at the computation instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovariateKind {
    Value,
    AgeInYears,
    AgeInMonths,
    AgeInWeeks,
    AgeInDays,
}

impl CovariateKind {
    /// Check whether this kind derives its value from a birthdate
    pub fn is_age(&self) -> bool {
        !matches!(self, CovariateKind::Value)
    }

    /// Compute the age at `now` for a given birthdate, in this kind's unit
    pub fn age_from(&self, birthdate: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        match self {
            CovariateKind::Value => 0.0,
            CovariateKind::AgeInDays => (now - birthdate).num_days() as f64,
            CovariateKind::AgeInWeeks => (now - birthdate).num_weeks() as f64,
            CovariateKind::AgeInMonths => {
                let mut months = (now.year() - birthdate.year()) as i64 * 12
                    + (now.month() as i64 - birthdate.month() as i64);
                if now.day() < birthdate.day() {
                    months -= 1;
                }
                months.max(0) as f64
            }
            CovariateKind::AgeInYears => {
                let mut years = (now.year() - birthdate.year()) as i64;
                if (now.month(), now.day()) < (birthdate.month(), birthdate.day()) {
                    years -= 1;
                }
                years.max(0) as f64
            }
        }
    }
}

/// A covariate a drug model is parameterized by
///
/// A definition flagged as computed is derived by the computation engine
/// from other covariates and is never matched against patient data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CovariateDefinition {
    id: String,
    unit: Unit,
    default_value: f64,
    rule: ValidationRule,
    kind: CovariateKind,
    computed: bool,
    validation_warning: String,
}

impl CovariateDefinition {
    pub fn new(id: impl Into<String>, unit: Unit, default_value: f64, rule: ValidationRule) -> Self {
        let id = id.into();
        let validation_warning = format!("Value out of the range accepted for {}", id);
        CovariateDefinition {
            id,
            unit,
            default_value,
            rule,
            kind: CovariateKind::Value,
            computed: false,
            validation_warning,
        }
    }

    /// Mark the definition as derived by the computation engine
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Set the kind of quantity the definition measures
    pub fn with_kind(mut self, kind: CovariateKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the warning text attached to failed validations
    pub fn with_validation_warning(mut self, warning: impl Into<String>) -> Self {
        self.validation_warning = warning.into();
        self
    }

    /// Get the covariate identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the unit values are expected in
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Get the model's default value
    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    /// Get the validation rule
    pub fn rule(&self) -> &ValidationRule {
        &self.rule
    }

    /// Get the kind of quantity measured
    pub fn kind(&self) -> CovariateKind {
        self.kind
    }

    /// Check whether the definition is derived by the computation engine
    pub fn is_computed(&self) -> bool {
        self.computed
    }

    /// Get the warning text attached to failed validations
    pub fn validation_warning(&self) -> &str {
        &self.validation_warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rule_checks() {
        assert!(ValidationRule::Any.check(f64::MAX));
        assert!(ValidationRule::Range { min: 3.0, max: 125.0 }.check(70.0));
        assert!(!ValidationRule::Range { min: 3.0, max: 125.0 }.check(2.0));
        assert!(ValidationRule::AtLeast(18.0).check(18.0));
        assert!(!ValidationRule::AtMost(5.0).check(5.1));
        assert!(ValidationRule::InSet(vec![0.0, 1.0]).check(1.0));
        assert!(!ValidationRule::InSet(vec![0.0, 1.0]).check(0.5));
    }

    #[test]
    fn test_age_in_years_counts_completed_years() {
        let birth = Utc.with_ymd_and_hms(2000, 7, 15, 0, 0, 0).unwrap();
        let before_birthday = Utc.with_ymd_and_hms(2018, 7, 10, 8, 0, 0).unwrap();
        let after_birthday = Utc.with_ymd_and_hms(2018, 7, 20, 8, 0, 0).unwrap();

        assert_eq!(CovariateKind::AgeInYears.age_from(birth, before_birthday), 17.0);
        assert_eq!(CovariateKind::AgeInYears.age_from(birth, after_birthday), 18.0);
    }

    #[test]
    fn test_age_in_days_and_weeks() {
        let birth = Utc.with_ymd_and_hms(2018, 6, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2018, 7, 13, 0, 0, 0).unwrap();

        assert_eq!(CovariateKind::AgeInDays.age_from(birth, now), 42.0);
        assert_eq!(CovariateKind::AgeInWeeks.age_from(birth, now), 6.0);
    }

    #[test]
    fn test_age_in_months_adjusts_for_day_of_month() {
        let birth = Utc.with_ymd_and_hms(2018, 1, 20, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2018, 7, 10, 0, 0, 0).unwrap();
        assert_eq!(CovariateKind::AgeInMonths.age_from(birth, now), 5.0);
    }
}
