//! Drug-model selection by covariate dissimilarity
//!
//! Every model registered for the requested drug is filtered for
//! structural and domain compatibility, then scored against the patient's
//! covariate observations. The lowest dissimilarity wins; ties go to the
//! model defining more covariates, as richer models are assumed more
//! specific.

use chrono::{DateTime, Utc};
use log::warn;
use thiserror::Error;

use crate::model::{
    evaluate_constraints, ConstraintVerdict, CovariateDefinition, DrugModel, ModelRepository,
};
use crate::pipeline::results::CovariateMatch;
use crate::pipeline::{PipelineStage, RequestContext, StageError};
use crate::treatment::{DataType, PatientCovariate, Treatment, TreatmentError};
use crate::units::{self, UnitError};

/// Reasons a candidate model cannot be scored
///
/// These are recovered locally: the affected model is skipped and scoring
/// continues with the other candidates.
#[derive(Error, Debug, Clone, PartialEq)]
enum ScoringError {
    #[error(transparent)]
    Treatment(#[from] TreatmentError),
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error("Multiple birthdate covariates are not allowed")]
    MultipleBirthdates,
    #[error("The birthdate covariate must carry a date value")]
    BirthdateNotADate,
}

/// Pipeline stage selecting the best drug model for the request
pub struct ModelSelector<'a> {
    repository: &'a ModelRepository,
}

impl<'a> ModelSelector<'a> {
    pub fn new(repository: &'a ModelRepository) -> Self {
        ModelSelector { repository }
    }
}

impl PipelineStage for ModelSelector<'_> {
    fn name(&self) -> &'static str {
        "model_selector"
    }

    fn run(&self, ctx: &mut RequestContext) -> Result<(), StageError> {
        let treatment = ctx.treatment().ok_or(StageError::MissingTreatment)?;
        let now = ctx.computation_time();

        // Mixed-formulation histories are not supported.
        if treatment.dosage_history().formulation_and_routes().len() > 1 {
            return Err(StageError::MixedFormulations);
        }

        let candidates = self.repository.models_for_drug(ctx.request().drug_id());

        let mut best: Option<(usize, &DrugModel, Vec<CovariateMatch>)> = None;

        for model in candidates {
            if !model.supports_history(treatment.dosage_history()) {
                warn!(
                    "{} incompatible: formulations and routes are not matching",
                    model.id()
                );
                continue;
            }

            let start = treatment.oldest_covariate_date(now);
            match evaluate_constraints(model, treatment, start, now) {
                Ok(evaluation) if evaluation.verdict() != ConstraintVerdict::Incompatible => {}
                Ok(_) => {
                    warn!("{} incompatible: constraints not respected", model.id());
                    continue;
                }
                Err(error) => {
                    warn!("{} skipped: constraint evaluation failed: {}", model.id(), error);
                    continue;
                }
            }

            let (score, matches) = match score_covariates(model, treatment, now) {
                Ok(scored) => scored,
                Err(error) => {
                    warn!("{} skipped: {}", model.id(), error);
                    continue;
                }
            };

            let better = match &best {
                None => true,
                Some((best_score, best_model, _)) => {
                    score < *best_score
                        || (score == *best_score
                            && best_model.covariates().len() < model.covariates().len())
                }
            };
            if better {
                best = Some((score, model, matches));
            }
        }

        match best {
            Some((_, model, matches)) => {
                ctx.set_drug_model(model.clone());
                ctx.set_covariate_matches(matches);
                Ok(())
            }
            None => Err(StageError::NoValidModel),
        }
    }
}

/// Score how well the patient's observations satisfy a model's definitions
///
/// The score counts unmet requirements: +1 for every non-computed
/// definition with no observation, +1 for every observation failing its
/// definition's validation after unit conversion. Every observation is
/// matched independently and yields one [CovariateMatch].
fn score_covariates(
    model: &DrugModel,
    treatment: &Treatment,
    now: DateTime<Utc>,
) -> Result<(usize, Vec<CovariateMatch>), ScoringError> {
    let mut score = 0;
    let mut matches = Vec::new();

    for definition in model.covariates().iter().filter(|d| !d.is_computed()) {
        let observed_id = if definition.kind().is_age() {
            "birthdate"
        } else {
            definition.id()
        };
        let observations = treatment.covariates_by_id(observed_id);

        if observations.is_empty() {
            score += 1;
            matches.push(CovariateMatch::missing(definition.clone()));
            continue;
        }

        if definition.kind().is_age() {
            if observations.len() > 1 {
                return Err(ScoringError::MultipleBirthdates);
            }
            let observation = observations[0];
            if observation.data_type() != DataType::Date {
                return Err(ScoringError::BirthdateNotADate);
            }
            let birthdate = observation.parse_date()?;
            let age = definition.kind().age_from(birthdate, now);
            score += check_observation(definition, age, observation, &mut matches);
        } else {
            for observation in observations {
                let raw = observation.parse_value()?;
                let value = units::convert(raw, observation.unit(), definition.unit())?;
                score += check_observation(definition, value, observation, &mut matches);
            }
        }
    }

    Ok((score, matches))
}

fn check_observation(
    definition: &CovariateDefinition,
    value: f64,
    observation: &PatientCovariate,
    matches: &mut Vec<CovariateMatch>,
) -> usize {
    if definition.rule().check(value) {
        matches.push(CovariateMatch::from_patient(
            definition.clone(),
            observation.clone(),
            None,
        ));
        0
    } else {
        matches.push(CovariateMatch::from_patient(
            definition.clone(),
            observation.clone(),
            Some(definition.validation_warning().to_string()),
        ));
        1
    }
}
