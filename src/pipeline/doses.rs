//! Validation of prescribed doses against the model recommendations

use crate::pipeline::results::DoseCheck;
use crate::pipeline::{PipelineStage, RequestContext, StageError};
use crate::units;

/// Pipeline stage checking every prescribed dose against the selected
/// model's recommended dose bounds
pub struct DoseValidator;

impl PipelineStage for DoseValidator {
    fn name(&self) -> &'static str {
        "dose_validator"
    }

    fn run(&self, ctx: &mut RequestContext) -> Result<(), StageError> {
        let treatment = ctx.treatment().ok_or(StageError::MissingTreatment)?;
        let model = ctx.drug_model().ok_or(StageError::MissingDrugModel)?;

        let mut checks = Vec::new();

        for range in treatment.dosage_history().ranges() {
            let formulation = model
                .formulation_for(range.formulation_and_route())
                .ok_or_else(|| StageError::UnknownFormulation {
                    model: model.id().to_string(),
                })?;

            let dose = units::convert(
                range.dosage().dose(),
                range.dosage().unit(),
                formulation.dose_unit(),
            )
            .map_err(|source| StageError::DoseConversion {
                start: range.start(),
                source,
            })?;

            let warning = if dose < formulation.min_dose() {
                Some(format!(
                    "Dose is under the recommended minimum of {} {}",
                    formulation.min_dose(),
                    formulation.dose_unit()
                ))
            } else if dose > formulation.max_dose() {
                Some(format!(
                    "Dose is over the recommended maximum of {} {}",
                    formulation.max_dose(),
                    formulation.dose_unit()
                ))
            } else {
                None
            };

            checks.push(DoseCheck::new(range.dosage().clone(), range.start(), warning));
        }

        ctx.set_dose_checks(checks);
        Ok(())
    }
}
