//! Percentile grids produced by the external computation engine
//!
//! A [PercentileGrid] is the opaque result of a percentile simulation: one
//! concentration-time curve per percentile rank (1..=100), each curve cut
//! into contiguous [TimeSegment]s. The decision pipeline only reads grids;
//! producing them is the engine's job, abstracted behind [GridProvider].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::DrugModel;
use crate::treatment::{Sample, Treatment};
use crate::units::Unit;

/// Number of percentile ranks in a grid
pub const RANK_COUNT: usize = 100;

/// Errors raised while building or obtaining a percentile grid
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("A percentile grid requires {RANK_COUNT} ranks, got {0}")]
    WrongRankCount(usize),
    #[error("Time segment needs matching offset and value arrays of length >= 2")]
    MalformedSegment,
    #[error("Percentiles computation failed: {0}")]
    Computation(String),
}

/// A contiguous simulated stretch of one percentile curve
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeSegment {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    offsets_h: Vec<f64>,
    values: Vec<f64>,
    unit: Unit,
}

impl TimeSegment {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offsets_h: Vec<f64>,
        values: Vec<f64>,
        unit: Unit,
    ) -> Result<Self, GridError> {
        if offsets_h.len() != values.len() || offsets_h.len() < 2 {
            return Err(GridError::MalformedSegment);
        }
        Ok(TimeSegment {
            start,
            end,
            offsets_h,
            values,
            unit,
        })
    }

    /// Get the segment start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Get the segment end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Get the curve time offsets, in hours from the segment start
    pub fn offsets_h(&self) -> &[f64] {
        &self.offsets_h
    }

    /// Get the curve concentration values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Get the unit of the concentration values
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Check whether a timestamp lies within the segment, bounds included
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Get the absolute timestamp of the i-th curve point
    pub fn time_at(&self, index: usize) -> DateTime<Utc> {
        self.start + Duration::milliseconds((self.offsets_h[index] * 3_600_000.0).round() as i64)
    }
}

/// One percentile curve of the grid
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PercentileCurve {
    segments: Vec<TimeSegment>,
}

impl PercentileCurve {
    pub fn new(segments: Vec<TimeSegment>) -> Self {
        PercentileCurve { segments }
    }

    /// Get the curve's time segments
    pub fn segments(&self) -> &[TimeSegment] {
        &self.segments
    }
}

/// A family of 100 percentile curves
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PercentileGrid {
    curves: Vec<PercentileCurve>,
}

impl PercentileGrid {
    pub fn new(curves: Vec<PercentileCurve>) -> Result<Self, GridError> {
        if curves.len() != RANK_COUNT {
            return Err(GridError::WrongRankCount(curves.len()));
        }
        Ok(PercentileGrid { curves })
    }

    /// Get the curve of a 1-based percentile rank
    pub fn curve(&self, rank: usize) -> &PercentileCurve {
        &self.curves[rank - 1]
    }
}

/// Source of percentile grids, implemented by the computation engine
pub trait GridProvider {
    /// Compute the percentile curves surrounding one sample
    fn percentiles(
        &self,
        model: &DrugModel,
        treatment: &Treatment,
        sample: &Sample,
    ) -> Result<PercentileGrid, GridError>;
}
