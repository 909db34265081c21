//! Expansion of a dosage history into the individual intakes it schedules

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::treatment::DosageHistory;
use crate::units::{self, Unit, UnitError};

/// Errors raised by intake extraction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntakeError {
    #[error("Dosage interval must be positive, got {hours} h")]
    NonPositiveInterval { hours: f64 },
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// One scheduled drug intake
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntakeEvent {
    time: DateTime<Utc>,
    dose: f64,
    unit: Unit,
}

impl IntakeEvent {
    pub fn new(time: DateTime<Utc>, dose: f64, unit: Unit) -> Self {
        IntakeEvent { time, dose, unit }
    }

    /// Get the time of the intake
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Get the dose amount of the intake
    pub fn dose(&self) -> f64 {
        self.dose
    }

    /// Get the unit of the dose amount
    pub fn unit(&self) -> &Unit {
        &self.unit
    }
}

/// Expand the scheduled intakes of a dosage history within a time window
///
/// Every range overlapping `[from, to)` contributes the intakes it
/// schedules (range start, then one every dosage interval while inside
/// the range). `to = None` leaves the window open-ended. Doses are
/// converted into `dose_unit`; the returned series is sorted by time.
pub fn extract_intakes(
    history: &DosageHistory,
    from: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    dose_unit: &Unit,
) -> Result<Vec<IntakeEvent>, IntakeError> {
    let mut intakes = Vec::new();

    for range in history.ranges() {
        let interval_h = range.dosage().interval_h();
        if interval_h <= 0.0 {
            return Err(IntakeError::NonPositiveInterval { hours: interval_h });
        }
        let interval = Duration::milliseconds((interval_h * 3_600_000.0).round() as i64);
        let dose = units::convert(
            range.dosage().dose(),
            range.dosage().unit(),
            dose_unit,
        )?;

        let mut time = range.start();
        while time < range.end() {
            if let Some(upper) = to {
                if time >= upper {
                    break;
                }
            }
            if time >= from {
                intakes.push(IntakeEvent::new(time, dose, dose_unit.clone()));
            }
            time += interval;
        }
    }

    intakes.sort_by_key(|intake| intake.time());
    Ok(intakes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FormulationAndRoute;
    use crate::treatment::{Dosage, DosageTimeRange};
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, d, h, 0, 0).unwrap()
    }

    fn history_with(interval_h: f64) -> DosageHistory {
        let mut history = DosageHistory::new();
        history
            .add_range(DosageTimeRange::new(
                at(1, 8),
                at(3, 8),
                Dosage::new(0.5, Unit::new("g"), interval_h),
                FormulationAndRoute::new("tablet", "oral"),
            ))
            .unwrap();
        history
    }

    #[test]
    fn test_extraction_expands_interval() {
        let history = history_with(24.0);
        let intakes = extract_intakes(&history, at(1, 8), None, &Unit::new("mg")).unwrap();

        let times: Vec<_> = intakes.iter().map(|i| i.time()).collect();
        assert_eq!(times, vec![at(1, 8), at(2, 8)]);
        // 0.5 g converted to the requested unit.
        assert_eq!(intakes[0].dose(), 500.0);
    }

    #[test]
    fn test_extraction_respects_window() {
        let history = history_with(12.0);
        let intakes =
            extract_intakes(&history, at(2, 0), Some(at(2, 21)), &Unit::new("mg")).unwrap();
        let times: Vec<_> = intakes.iter().map(|i| i.time()).collect();
        assert_eq!(times, vec![at(2, 8), at(2, 20)]);
    }

    #[test]
    fn test_extraction_rejects_bad_interval() {
        let history = history_with(0.0);
        let err = extract_intakes(&history, at(1, 8), None, &Unit::new("mg")).unwrap_err();
        assert!(matches!(err, IntakeError::NonPositiveInterval { .. }));
    }

    #[test]
    fn test_extraction_propagates_unit_error() {
        let history = history_with(24.0);
        let err = extract_intakes(&history, at(1, 8), None, &Unit::new("h")).unwrap_err();
        assert!(matches!(err, IntakeError::Unit(_)));
    }
}
