//! Location of measured samples within the simulated percentile curves

use thiserror::Error;

use crate::grid::{GridProvider, PercentileGrid, RANK_COUNT};
use crate::pipeline::results::SampleMatch;
use crate::pipeline::{PipelineStage, RequestContext, StageError};
use crate::treatment::Sample;
use crate::units::{self, UnitError};

#[derive(Error, Debug, Clone, PartialEq)]
enum LocateError {
    #[error("no segment contains the sample date")]
    NotCovered,
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Pipeline stage placing every measured sample on the percentile grid
pub struct SampleLocator<'a> {
    provider: &'a (dyn GridProvider + Sync),
}

impl<'a> SampleLocator<'a> {
    pub fn new(provider: &'a (dyn GridProvider + Sync)) -> Self {
        SampleLocator { provider }
    }
}

impl PipelineStage for SampleLocator<'_> {
    fn name(&self) -> &'static str {
        "sample_locator"
    }

    fn run(&self, ctx: &mut RequestContext) -> Result<(), StageError> {
        let treatment = ctx.treatment().ok_or(StageError::MissingTreatment)?;

        if !treatment.samples().is_empty() && treatment.dosage_history().is_empty() {
            return Err(StageError::SamplesWithoutDosage);
        }

        let model = ctx.drug_model().ok_or(StageError::MissingDrugModel)?;

        let mut matches = Vec::new();
        for sample in treatment.samples() {
            let grid = self
                .provider
                .percentiles(model, treatment, sample)
                .map_err(|error| StageError::PercentilesFailed {
                    date: sample.date(),
                    detail: error.to_string(),
                })?;

            let rank = locate_rank(&grid, sample).map_err(|error| match error {
                LocateError::NotCovered => StageError::SampleNotCovered {
                    date: sample.date(),
                },
                LocateError::Unit(source) => StageError::SampleConversion {
                    date: sample.date(),
                    source,
                },
            })?;

            matches.push(SampleMatch::new(sample.clone(), rank));
        }

        ctx.set_sample_matches(matches);
        Ok(())
    }
}

/// Find the 1-based percentile rank a sample falls into
///
/// Ranks 1..=99 are scanned in order; the first curve whose interpolated
/// concentration at the sample date is at least the sample value claims
/// it. A sample above every scanned curve belongs to rank 100.
fn locate_rank(grid: &PercentileGrid, sample: &Sample) -> Result<usize, LocateError> {
    let date = sample.date();

    // Locate the segment holding the sample date once, on the first curve;
    // all curves of a grid share the same segmentation.
    let segment_index = grid
        .curve(1)
        .segments()
        .iter()
        .position(|segment| segment.contains(date))
        .ok_or(LocateError::NotCovered)?;

    // Remembers the surrounding point pair across curves so each curve
    // resumes the scan where the previous one matched.
    let mut saved_pair = 0;

    for rank in 1..RANK_COUNT {
        let segments = grid.curve(rank).segments();
        let segment = match segments.get(segment_index) {
            Some(segment) => segment,
            None => return Err(LocateError::NotCovered),
        };

        for i in saved_pair..segment.offsets_h().len() - 1 {
            let t0 = segment.time_at(i);
            let t1 = segment.time_at(i + 1);

            if !(t0 <= date && date <= t1) {
                continue;
            }

            let converted = units::convert(sample.value(), sample.unit(), segment.unit())?;

            let elapsed = (date - t0).num_milliseconds() as f64;
            let span = (t1 - t0).num_milliseconds() as f64;
            let rp = elapsed / span;
            let values = segment.values();
            let interpolated = values[i] + rp * (values[i + 1] - values[i]);

            if converted <= interpolated {
                return Ok(rank);
            }

            saved_pair = i;
            break;
        }
    }

    // Above the 99th percentile curve.
    Ok(RANK_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridError, PercentileCurve, TimeSegment};
    use crate::model::{DrugModel, FormulationAndRoute, FullFormulationAndRoute, HalfLife};
    use crate::request::AdjustmentRequest;
    use crate::treatment::Treatment;
    use crate::units::Unit;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 10, h, m, 0).unwrap()
    }

    /// Flat curves: rank r sits at concentration r * 0.1 mg/l over 0..=6 h.
    fn flat_grid() -> PercentileGrid {
        let curves = (1..=RANK_COUNT)
            .map(|rank| {
                let level = rank as f64 * 0.1;
                PercentileCurve::new(vec![TimeSegment::new(
                    at(8, 0),
                    at(14, 0),
                    vec![0.0, 3.0, 6.0],
                    vec![level, level, level],
                    Unit::new("mg/l"),
                )
                .unwrap()])
            })
            .collect();
        PercentileGrid::new(curves).unwrap()
    }

    fn sample(date: DateTime<Utc>, value: f64, unit: &str) -> Sample {
        Sample::new(date, value, Unit::new(unit))
    }

    #[test]
    fn test_sample_between_curves() {
        // 2.55 mg/l sits between the 25th (2.5) and 26th (2.6) curves.
        let rank = locate_rank(&flat_grid(), &sample(at(10, 0), 2.55, "mg/l")).unwrap();
        assert_eq!(rank, 26);
    }

    #[test]
    fn test_sample_on_curve_takes_lower_rank() {
        // A value exactly on a curve belongs to that curve's rank.
        let rank = locate_rank(&flat_grid(), &sample(at(10, 0), 2.5, "mg/l")).unwrap();
        assert_eq!(rank, 25);
    }

    #[test]
    fn test_sample_above_all_curves_is_rank_100() {
        let rank = locate_rank(&flat_grid(), &sample(at(10, 0), 50.0, "mg/l")).unwrap();
        assert_eq!(rank, 100);
    }

    #[test]
    fn test_sample_on_segment_boundary_is_located() {
        let rank = locate_rank(&flat_grid(), &sample(at(8, 0), 0.1, "mg/l")).unwrap();
        assert_eq!(rank, 1);
        let rank = locate_rank(&flat_grid(), &sample(at(14, 0), 0.1, "mg/l")).unwrap();
        assert_eq!(rank, 1);
    }

    #[test]
    fn test_sample_outside_grid_is_not_covered() {
        let err = locate_rank(&flat_grid(), &sample(at(15, 0), 1.0, "mg/l")).unwrap_err();
        assert_eq!(err, LocateError::NotCovered);
    }

    #[test]
    fn test_sample_unit_is_converted() {
        // 255 ug/l == 0.255 mg/l, between ranks 2 and 3.
        let rank = locate_rank(&flat_grid(), &sample(at(10, 0), 255.0, "ug/l")).unwrap();
        assert_eq!(rank, 3);
    }

    #[test]
    fn test_incompatible_sample_unit_fails() {
        let err = locate_rank(&flat_grid(), &sample(at(10, 0), 1.0, "mg")).unwrap_err();
        assert!(matches!(err, LocateError::Unit(_)));
    }

    #[test]
    fn test_interpolation_between_points() {
        // One sloped curve from 0 to 6 mg/l over 0..=6 h at rank 1; every
        // higher rank is far above it.
        let mut curves = vec![PercentileCurve::new(vec![TimeSegment::new(
            at(8, 0),
            at(14, 0),
            vec![0.0, 6.0],
            vec![0.0, 6.0],
            Unit::new("mg/l"),
        )
        .unwrap()])];
        for _ in 2..=RANK_COUNT {
            curves.push(PercentileCurve::new(vec![TimeSegment::new(
                at(8, 0),
                at(14, 0),
                vec![0.0, 6.0],
                vec![100.0, 100.0],
                Unit::new("mg/l"),
            )
            .unwrap()]));
        }
        let grid = PercentileGrid::new(curves).unwrap();

        // At 11:00 the first curve interpolates to 3.0.
        assert_eq!(locate_rank(&grid, &sample(at(11, 0), 3.0, "mg/l")).unwrap(), 1);
        assert_eq!(locate_rank(&grid, &sample(at(11, 0), 3.01, "mg/l")).unwrap(), 2);
    }

    struct FixedGrid(PercentileGrid);
    impl GridProvider for FixedGrid {
        fn percentiles(
            &self,
            _model: &DrugModel,
            _treatment: &Treatment,
            _sample: &Sample,
        ) -> Result<PercentileGrid, GridError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;
    impl GridProvider for FailingProvider {
        fn percentiles(
            &self,
            _model: &DrugModel,
            _treatment: &Treatment,
            _sample: &Sample,
        ) -> Result<PercentileGrid, GridError> {
            Err(GridError::Computation("engine unavailable".to_string()))
        }
    }

    fn context_with_samples(samples: &[(DateTime<Utc>, f64)]) -> RequestContext {
        let oral = FormulationAndRoute::new("tablet", "oral");
        let mut builder = Treatment::builder().patient_id("p").range(
            Utc.with_ymd_and_hms(2018, 7, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2018, 7, 20, 8, 0, 0).unwrap(),
            400.0,
            Unit::new("mg"),
            24.0,
            oral.clone(),
        );
        for (date, value) in samples {
            builder = builder.sample(*date, *value, Unit::new("mg/l"));
        }
        let mut ctx = RequestContext::new(
            AdjustmentRequest::new("imatinib"),
            builder.build().unwrap(),
            at(8, 0),
        );
        ctx.set_drug_model(
            DrugModel::new("m1", "imatinib", HalfLife::new(12.0, Unit::new("h")))
                .with_formulation(FullFormulationAndRoute::new(
                    oral,
                    Unit::new("mg"),
                    100.0,
                    800.0,
                )),
        );
        ctx
    }

    #[test]
    fn test_stage_locates_every_sample() {
        let provider = FixedGrid(flat_grid());
        let mut ctx = context_with_samples(&[(at(9, 0), 2.55), (at(10, 0), 0.3)]);
        SampleLocator::new(&provider).run(&mut ctx).unwrap();

        assert_eq!(ctx.sample_matches().len(), 2);
        assert_eq!(ctx.sample_matches()[0].rank(), 26);
        assert_eq!(ctx.sample_matches()[1].rank(), 3);
        assert!(ctx.sample_matches()[1].warning().is_some());
    }

    #[test]
    fn test_samples_without_dosage_history_fail() {
        let provider = FixedGrid(flat_grid());
        let treatment = Treatment::builder()
            .patient_id("p")
            .sample(at(9, 0), 1.0, Unit::new("mg/l"))
            .build()
            .unwrap();
        let mut ctx = RequestContext::new(AdjustmentRequest::new("imatinib"), treatment, at(8, 0));

        assert_eq!(
            SampleLocator::new(&provider).run(&mut ctx).unwrap_err(),
            StageError::SamplesWithoutDosage
        );
    }

    #[test]
    fn test_failing_provider_is_terminal() {
        let mut ctx = context_with_samples(&[(at(9, 0), 2.55)]);
        let err = SampleLocator::new(&FailingProvider).run(&mut ctx).unwrap_err();
        assert!(matches!(err, StageError::PercentilesFailed { .. }));
    }
}
