//! Domain constraints restricting which patients a drug model applies to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::covariate::ValidationRule;
use crate::model::DrugModel;
use crate::treatment::{Treatment, TreatmentError};
use crate::units::{self, Unit, UnitError};

/// Errors raised while evaluating domain constraints
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error(transparent)]
    Treatment(#[from] TreatmentError),
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Severity of a domain constraint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Violation rules the model out
    Hard,
    /// Violation degrades the model to partially compatible
    Soft,
}

/// One restriction over a patient covariate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainConstraint {
    id: String,
    covariate_id: String,
    unit: Unit,
    kind: ConstraintKind,
    rule: ValidationRule,
}

impl DomainConstraint {
    pub fn new(
        id: impl Into<String>,
        covariate_id: impl Into<String>,
        unit: Unit,
        kind: ConstraintKind,
        rule: ValidationRule,
    ) -> Self {
        DomainConstraint {
            id: id.into(),
            covariate_id: covariate_id.into(),
            unit,
            kind,
            rule,
        }
    }

    /// Get the constraint identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the identifier of the constrained covariate
    pub fn covariate_id(&self) -> &str {
        &self.covariate_id
    }

    /// Get the severity of the constraint
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }
}

/// Verdict of a domain-constraint evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintVerdict {
    Compatible,
    PartiallyCompatible,
    Incompatible,
}

/// Outcome of checking one constraint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstraintDetail {
    constraint_id: String,
    satisfied: bool,
}

impl ConstraintDetail {
    /// Get the identifier of the checked constraint
    pub fn constraint_id(&self) -> &str {
        &self.constraint_id
    }

    /// Check whether the constraint held over the whole window
    pub fn satisfied(&self) -> bool {
        self.satisfied
    }
}

/// Result of evaluating all constraints of a model over a time window
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstraintEvaluation {
    verdict: ConstraintVerdict,
    details: Vec<ConstraintDetail>,
}

impl ConstraintEvaluation {
    /// Get the overall verdict
    pub fn verdict(&self) -> ConstraintVerdict {
        self.verdict
    }

    /// Get the per-constraint outcomes
    pub fn details(&self) -> &[ConstraintDetail] {
        &self.details
    }
}

/// Evaluate a model's domain constraints against the covariate history
///
/// Every observation of the constrained covariate within `[start, end]`
/// must satisfy the constraint. A violated hard constraint makes the
/// model incompatible; a violated soft constraint, or a constraint with
/// no observation to check, leaves it partially compatible. Observations
/// that cannot be parsed or converted fail the whole evaluation.
pub fn evaluate_constraints(
    model: &DrugModel,
    treatment: &Treatment,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ConstraintEvaluation, ConstraintError> {
    let mut verdict = ConstraintVerdict::Compatible;
    let mut details = Vec::new();

    for constraint in model.constraints() {
        let observations: Vec<_> = treatment
            .covariates_by_id(&constraint.covariate_id)
            .into_iter()
            .filter(|c| start <= c.date() && c.date() <= end)
            .collect();

        let satisfied = if observations.is_empty() {
            demote(&mut verdict, ConstraintVerdict::PartiallyCompatible);
            false
        } else {
            let mut all_hold = true;
            for observation in observations {
                let raw = observation.parse_value()?;
                let value = units::convert(raw, observation.unit(), &constraint.unit)?;
                if !constraint.rule.check(value) {
                    all_hold = false;
                }
            }
            if !all_hold {
                match constraint.kind {
                    ConstraintKind::Hard => demote(&mut verdict, ConstraintVerdict::Incompatible),
                    ConstraintKind::Soft => {
                        demote(&mut verdict, ConstraintVerdict::PartiallyCompatible)
                    }
                }
            }
            all_hold
        };

        details.push(ConstraintDetail {
            constraint_id: constraint.id.clone(),
            satisfied,
        });
    }

    Ok(ConstraintEvaluation { verdict, details })
}

fn demote(current: &mut ConstraintVerdict, to: ConstraintVerdict) {
    let rank = |v: ConstraintVerdict| match v {
        ConstraintVerdict::Compatible => 0,
        ConstraintVerdict::PartiallyCompatible => 1,
        ConstraintVerdict::Incompatible => 2,
    };
    if rank(to) > rank(*current) {
        *current = to;
    }
}
