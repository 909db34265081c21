//! Resolution of the adjustment instant and the simulation window

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::model::{DrugModel, FullFormulationAndRoute};
use crate::pipeline::{PipelineStage, RequestContext, StageError};
use crate::request::{AdjustmentPlan, AdjustmentRequest, PredictionMode, SteadyStateTargetOption};
use crate::treatment::{extract_intakes, IntakeEvent, Treatment};
use crate::units;

/// Pipeline stage assembling the computation plan for the request
///
/// Combines the resolved adjustment instant, the simulation window, the
/// prediction mode and the requested options into one [AdjustmentPlan].
pub struct AdjustmentPlanner;

impl PipelineStage for AdjustmentPlanner {
    fn name(&self) -> &'static str {
        "adjustment_planner"
    }

    fn run(&self, ctx: &mut RequestContext) -> Result<(), StageError> {
        let now = ctx.computation_time();

        let treatment = ctx.treatment().ok_or(StageError::MissingTreatment)?;
        let model = ctx.drug_model().ok_or(StageError::MissingDrugModel)?;

        // The formulation in use: the history's latest, or the model's
        // default when nothing was prescribed yet.
        let formulation = match treatment.dosage_history().last_formulation_and_route() {
            Some(pair) => model.formulation_for(pair),
            None => model.default_formulation(),
        }
        .ok_or_else(|| StageError::UnknownFormulation {
            model: model.id().to_string(),
        })?;

        let (adjustment_time, last_intake) =
            resolve_adjustment_time(ctx.request(), treatment, model, formulation, now)?;
        let (start, end) = resolve_window(formulation, treatment, model, now)?;

        let steady_state_target = if formulation.standard_treatment().is_some() {
            SteadyStateTargetOption::WithinTreatmentTimeRange
        } else {
            SteadyStateTargetOption::AtSteadyState
        };

        let plan = AdjustmentPlan::new(
            start,
            end,
            adjustment_time,
            prediction_mode(treatment),
            ctx.request().loading_option(),
            ctx.request().rest_period_option(),
            steady_state_target,
            ctx.request().target_extraction(),
            ctx.request().formulation_selection(),
        );

        ctx.set_last_intake(last_intake);
        ctx.set_adjustment_plan(plan);
        Ok(())
    }
}

/// Resolve the instant the dosage adjustment takes effect
///
/// Priority order: the instant requested explicitly; the next scheduled
/// intake when one lies in the future; the latest past intake pushed
/// forward by whole half-lives until it reaches the reference instant;
/// and as last resort one hour after the reference instant.
///
/// The intake series is extracted in any case so the latest past intake
/// can be reported on the context, even when the instant comes from the
/// request.
fn resolve_adjustment_time(
    request: &AdjustmentRequest,
    treatment: &Treatment,
    model: &DrugModel,
    formulation: &FullFormulationAndRoute,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, Option<IntakeEvent>), StageError> {
    let history = treatment.dosage_history();

    let mut intakes: Option<Vec<IntakeEvent>> = None;
    if let Some(start) = history.latest_start_before(now) {
        match extract_intakes(history, start, None, formulation.dose_unit()) {
            Ok(series) => intakes = Some(series),
            // A failed extraction falls back to the fixed offset below.
            Err(error) => debug!("intake extraction failed: {}", error),
        }
    }

    let last_intake = intakes
        .as_ref()
        .and_then(|series| series.iter().filter(|i| i.time() < now).next_back())
        .cloned();

    if let Some(explicit) = request.adjustment_time() {
        return Ok((explicit, last_intake));
    }

    if let Some(series) = &intakes {
        if let Some(candidate) = nearest_future_or_latest_intake(series, now) {
            if candidate > now {
                return Ok((candidate, last_intake));
            }

            // The latest intake lies in the past: step forward by whole
            // half-lives until the reference instant is reached.
            let half_life = model.half_life();
            let half_life_h = units::to_hours(half_life.value(), half_life.unit()).map_err(
                |source| StageError::HalfLifeConversion {
                    model: model.id().to_string(),
                    source,
                },
            )?;
            if half_life_h <= 0.0 {
                return Err(StageError::NonPositiveHalfLife {
                    model: model.id().to_string(),
                });
            }
            let step = Duration::milliseconds((half_life_h * 3_600_000.0).round() as i64);

            let mut time = candidate;
            while time < now {
                time += step;
            }
            return Ok((time, last_intake));
        }
    }

    // No dosage history in the past, or nothing could be extracted: the
    // adjustment can happen at any time.
    Ok((now + Duration::hours(1), last_intake))
}

/// Find the nearest future intake, or the latest past one if none exists
///
/// Scans the series from its end, remembering the future intake closest
/// to `now` seen so far; the first past intake settles the answer.
fn nearest_future_or_latest_intake(
    intakes: &[IntakeEvent],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut saved: Option<DateTime<Utc>> = None;

    for intake in intakes.iter().rev() {
        let time = intake.time();

        if saved.map_or(true, |s| time < s && time > now) {
            saved = Some(time);
        }

        if time < now {
            return saved;
        }
    }

    saved
}

/// Resolve the simulation window
///
/// A fixed-duration standard treatment anchors the window at the earliest
/// prescription and fails when already elapsed; otherwise the window is
/// the fixed seven days from the reference instant.
fn resolve_window(
    formulation: &FullFormulationAndRoute,
    treatment: &Treatment,
    model: &DrugModel,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), StageError> {
    match formulation.standard_treatment() {
        Some(standard) => {
            let start = treatment
                .dosage_history()
                .oldest_start_at_or_before(now)
                .unwrap_or(now);

            let days = units::to_days(standard.duration(), standard.unit()).map_err(|source| {
                StageError::DurationConversion {
                    model: model.id().to_string(),
                    source,
                }
            })?;
            let end = start + Duration::milliseconds((days * 86_400_000.0).round() as i64);

            if end <= now {
                return Err(StageError::TreatmentAlreadyOver {
                    model: model.id().to_string(),
                });
            }
            Ok((start, end))
        }
        None => Ok((now, now + Duration::days(7))),
    }
}

fn prediction_mode(treatment: &Treatment) -> PredictionMode {
    let has_doses = !treatment.dosage_history().is_empty();
    if has_doses && !treatment.samples().is_empty() {
        PredictionMode::Aposteriori
    } else if has_doses {
        PredictionMode::Apriori
    } else {
        PredictionMode::Population
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        FormulationAndRoute, FullFormulationAndRoute, HalfLife, StandardTreatment,
    };
    use crate::treatment::TreatmentBuilder;
    use crate::units::Unit;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, d, h, 0, 0).unwrap()
    }

    fn oral() -> FormulationAndRoute {
        FormulationAndRoute::new("tablet", "oral")
    }

    fn model(standard: Option<StandardTreatment>) -> DrugModel {
        let mut formulation =
            FullFormulationAndRoute::new(oral(), Unit::new("mg"), 100.0, 800.0);
        if let Some(standard) = standard {
            formulation = formulation.with_standard_treatment(standard);
        }
        DrugModel::new("m1", "imatinib", HalfLife::new(12.0, Unit::new("h")))
            .with_formulation(formulation)
    }

    fn plan(
        builder: TreatmentBuilder,
        request: AdjustmentRequest,
        model: DrugModel,
        now: DateTime<Utc>,
    ) -> Result<RequestContext, StageError> {
        let mut ctx = RequestContext::new(request, builder.build().unwrap(), now);
        ctx.set_drug_model(model);
        AdjustmentPlanner.run(&mut ctx)?;
        Ok(ctx)
    }

    #[test]
    fn test_empty_history_adjusts_one_hour_after_now() {
        let now = at(10, 8);
        let ctx = plan(
            Treatment::builder().patient_id("p"),
            AdjustmentRequest::new("imatinib"),
            model(None),
            now,
        )
        .unwrap();

        let built = ctx.adjustment_plan().unwrap();
        assert_eq!(built.adjustment_time(), at(10, 9));
        assert_eq!(built.start(), now);
        assert_eq!(built.end(), at(17, 8));
        assert_eq!(built.prediction_mode(), PredictionMode::Population);
        assert!(ctx.last_intake().is_none());
    }

    #[test]
    fn test_explicit_adjustment_time_wins() {
        let explicit = at(12, 14);
        let ctx = plan(
            Treatment::builder()
                .patient_id("p")
                .range(at(1, 8), at(20, 8), 400.0, Unit::new("mg"), 24.0, oral()),
            AdjustmentRequest::new("imatinib").with_adjustment_time(explicit),
            model(None),
            at(10, 8),
        )
        .unwrap();

        assert_eq!(ctx.adjustment_plan().unwrap().adjustment_time(), explicit);
        // The latest past intake is still reported.
        assert_eq!(ctx.last_intake().unwrap().time(), at(10, 8) - Duration::hours(24));
    }

    #[test]
    fn test_ongoing_treatment_uses_next_intake() {
        // Intakes every 24 h at 08:00; at 10:00 the next one is tomorrow.
        let ctx = plan(
            Treatment::builder()
                .patient_id("p")
                .range(at(1, 8), at(20, 8), 400.0, Unit::new("mg"), 24.0, oral()),
            AdjustmentRequest::new("imatinib"),
            model(None),
            at(10, 10),
        )
        .unwrap();

        assert_eq!(ctx.adjustment_plan().unwrap().adjustment_time(), at(11, 8));
        assert_eq!(ctx.last_intake().unwrap().time(), at(10, 8));
    }

    #[test]
    fn test_finished_treatment_steps_by_half_life() {
        // Single intake 30 h before the reference instant, half-life 12 h:
        // three increments land 6 h past the reference instant.
        let now = at(10, 8);
        let intake_time = now - Duration::hours(30);
        let ctx = plan(
            Treatment::builder().patient_id("p").range(
                intake_time,
                now - Duration::hours(29),
                400.0,
                Unit::new("mg"),
                48.0,
                oral(),
            ),
            AdjustmentRequest::new("imatinib"),
            model(None),
            now,
        )
        .unwrap();

        assert_eq!(
            ctx.adjustment_plan().unwrap().adjustment_time(),
            now + Duration::hours(6)
        );
        assert_eq!(ctx.last_intake().unwrap().time(), intake_time);
    }

    #[test]
    fn test_purely_future_history_falls_back() {
        let now = at(10, 8);
        let ctx = plan(
            Treatment::builder()
                .patient_id("p")
                .range(at(12, 8), at(20, 8), 400.0, Unit::new("mg"), 24.0, oral()),
            AdjustmentRequest::new("imatinib"),
            model(None),
            now,
        )
        .unwrap();

        assert_eq!(
            ctx.adjustment_plan().unwrap().adjustment_time(),
            now + Duration::hours(1)
        );
        assert!(ctx.last_intake().is_none());
    }

    #[test]
    fn test_standard_treatment_window() {
        let standard = StandardTreatment::new(2.0, Unit::new("d"));
        let ctx = plan(
            Treatment::builder()
                .patient_id("p")
                .range(at(9, 8), at(11, 8), 400.0, Unit::new("mg"), 24.0, oral()),
            AdjustmentRequest::new("imatinib"),
            model(Some(standard)),
            at(10, 8),
        )
        .unwrap();

        let built = ctx.adjustment_plan().unwrap();
        assert_eq!(built.start(), at(9, 8));
        assert_eq!(built.end(), at(11, 8));
        assert_eq!(
            built.steady_state_target(),
            SteadyStateTargetOption::WithinTreatmentTimeRange
        );
    }

    #[test]
    fn test_standard_treatment_already_over() {
        // History starts 2018-07-06 08:00, the fixed two days end
        // 2018-07-08 08:00, before the reference instant 2018-07-10 08:00.
        let standard = StandardTreatment::new(2.0, Unit::new("d"));
        let result = plan(
            Treatment::builder()
                .patient_id("p")
                .range(at(6, 8), at(8, 8), 400.0, Unit::new("mg"), 24.0, oral()),
            AdjustmentRequest::new("imatinib"),
            model(Some(standard)),
            at(10, 8),
        );

        assert!(matches!(
            result,
            Err(StageError::TreatmentAlreadyOver { .. })
        ));
    }

    #[test]
    fn test_prediction_mode_selection() {
        let doses_only = plan(
            Treatment::builder()
                .patient_id("p")
                .range(at(1, 8), at(20, 8), 400.0, Unit::new("mg"), 24.0, oral()),
            AdjustmentRequest::new("imatinib"),
            model(None),
            at(10, 8),
        )
        .unwrap();
        assert_eq!(
            doses_only.adjustment_plan().unwrap().prediction_mode(),
            PredictionMode::Apriori
        );

        let doses_and_samples = plan(
            Treatment::builder()
                .patient_id("p")
                .range(at(1, 8), at(20, 8), 400.0, Unit::new("mg"), 24.0, oral())
                .sample(at(5, 10), 2.5, Unit::new("mg/l")),
            AdjustmentRequest::new("imatinib"),
            model(None),
            at(10, 8),
        )
        .unwrap();
        assert_eq!(
            doses_and_samples.adjustment_plan().unwrap().prediction_mode(),
            PredictionMode::Aposteriori
        );
    }

    #[test]
    fn test_options_pass_through() {
        use crate::request::{
            FormulationAndRouteSelectionOption, LoadingOption, RestPeriodOption,
            TargetExtractionOption,
        };

        let ctx = plan(
            Treatment::builder().patient_id("p"),
            AdjustmentRequest::new("imatinib")
                .with_loading_option(LoadingOption::NoLoadingDose),
            model(None),
            at(10, 8),
        )
        .unwrap();

        let built = ctx.adjustment_plan().unwrap();
        assert_eq!(built.loading_option(), LoadingOption::NoLoadingDose);
        // Unspecified options stay unspecified; policies fall back to their
        // named defaults.
        assert_eq!(built.rest_period_option(), RestPeriodOption::Unspecified);
        assert_eq!(
            built.target_extraction(),
            TargetExtractionOption::DefinitionIfNoIndividualTarget
        );
        assert_eq!(
            built.formulation_selection(),
            FormulationAndRouteSelectionOption::LastFormulationAndRoute
        );
    }
}
