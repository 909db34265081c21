//! Measurement units and value conversion
//!
//! Covariate observations, doses, half-lives and concentration samples all
//! carry a unit. Conversion between two units is only defined within the
//! same dimension (time, mass, concentration, length); converting across
//! dimensions is an error the caller has to deal with.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by unit conversion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown unit: {0}")]
    Unknown(String),
    #[error("Cannot convert from {from} to {to}")]
    Incompatible { from: String, to: String },
}

/// A unit of measurement, identified by its symbol
///
/// Units are plain symbols ("mg", "h", "ug/l", ...). Two units compare
/// equal when their symbols match. The empty symbol and `"-"` denote a
/// dimensionless quantity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit(String);

impl Unit {
    pub fn new(symbol: impl Into<String>) -> Self {
        Unit(symbol.into())
    }

    /// Get the unit symbol
    pub fn symbol(&self) -> &str {
        &self.0
    }

    /// Check whether this unit denotes a dimensionless quantity
    pub fn is_dimensionless(&self) -> bool {
        self.0.is_empty() || self.0 == "-"
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Unit {
    fn from(symbol: &str) -> Self {
        Unit::new(symbol)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Dimension {
    Time,
    Mass,
    Concentration,
    Length,
}

lazy_static! {
    /// Factor from each known symbol to the base unit of its dimension
    /// (seconds, grams, g/l, meters).
    static ref FACTORS: HashMap<&'static str, (Dimension, f64)> = {
        let mut m = HashMap::new();
        // Time, base: second
        m.insert("s", (Dimension::Time, 1.0));
        m.insert("min", (Dimension::Time, 60.0));
        m.insert("h", (Dimension::Time, 3_600.0));
        m.insert("d", (Dimension::Time, 86_400.0));
        m.insert("w", (Dimension::Time, 604_800.0));
        // Mass, base: gram
        m.insert("ug", (Dimension::Mass, 1e-6));
        m.insert("mg", (Dimension::Mass, 1e-3));
        m.insert("g", (Dimension::Mass, 1.0));
        m.insert("kg", (Dimension::Mass, 1e3));
        // Concentration, base: g/l
        m.insert("ug/l", (Dimension::Concentration, 1e-6));
        m.insert("mg/l", (Dimension::Concentration, 1e-3));
        m.insert("g/l", (Dimension::Concentration, 1.0));
        m.insert("ug/ml", (Dimension::Concentration, 1e-3));
        m.insert("mg/ml", (Dimension::Concentration, 1.0));
        // Length, base: meter
        m.insert("cm", (Dimension::Length, 1e-2));
        m.insert("m", (Dimension::Length, 1.0));
        m
    };
}

/// Convert a value between two compatible units
///
/// Identity conversions (same symbol, or both dimensionless) always
/// succeed. Anything else requires both units to be known and to share a
/// dimension.
pub fn convert(value: f64, from: &Unit, to: &Unit) -> Result<f64, UnitError> {
    if from == to || (from.is_dimensionless() && to.is_dimensionless()) {
        return Ok(value);
    }

    let (from_dim, from_factor) = FACTORS
        .get(from.symbol())
        .ok_or_else(|| UnitError::Unknown(from.symbol().to_string()))?;
    let (to_dim, to_factor) = FACTORS
        .get(to.symbol())
        .ok_or_else(|| UnitError::Unknown(to.symbol().to_string()))?;

    if from_dim != to_dim {
        return Err(UnitError::Incompatible {
            from: from.symbol().to_string(),
            to: to.symbol().to_string(),
        });
    }

    Ok(value * from_factor / to_factor)
}

/// Convert a duration-valued quantity to hours
pub fn to_hours(value: f64, unit: &Unit) -> Result<f64, UnitError> {
    convert(value, unit, &Unit::new("h"))
}

/// Convert a duration-valued quantity to days
pub fn to_days(value: f64, unit: &Unit) -> Result<f64, UnitError> {
    convert(value, unit, &Unit::new("d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_conversion() {
        let mg = Unit::new("mg");
        assert_eq!(convert(5.0, &mg, &mg).unwrap(), 5.0);
    }

    #[test]
    fn test_mass_conversion() {
        assert_eq!(
            convert(2.0, &Unit::new("g"), &Unit::new("mg")).unwrap(),
            2_000.0
        );
        assert_eq!(
            convert(500.0, &Unit::new("mg"), &Unit::new("g")).unwrap(),
            0.5
        );
    }

    #[test]
    fn test_time_conversion() {
        assert_eq!(to_hours(2.0, &Unit::new("d")).unwrap(), 48.0);
        assert_eq!(to_days(48.0, &Unit::new("h")).unwrap(), 2.0);
        assert_eq!(
            convert(90.0, &Unit::new("min"), &Unit::new("h")).unwrap(),
            1.5
        );
    }

    #[test]
    fn test_concentration_conversion() {
        assert_eq!(
            convert(1.0, &Unit::new("mg/l"), &Unit::new("ug/l")).unwrap(),
            1_000.0
        );
        assert_eq!(
            convert(1.0, &Unit::new("ug/ml"), &Unit::new("mg/l")).unwrap(),
            1.0
        );
    }

    #[test]
    fn test_conversion_round_trip_precision() {
        use approx::assert_relative_eq;

        let value = convert(0.3, &Unit::new("g/l"), &Unit::new("mg/l")).unwrap();
        assert_relative_eq!(value, 300.0, max_relative = 1e-12);
        let back = convert(value, &Unit::new("mg/l"), &Unit::new("g/l")).unwrap();
        assert_relative_eq!(back, 0.3, max_relative = 1e-12);
    }

    #[test]
    fn test_incompatible_dimensions() {
        let err = convert(1.0, &Unit::new("mg"), &Unit::new("h")).unwrap_err();
        assert!(matches!(err, UnitError::Incompatible { .. }));
    }

    #[test]
    fn test_unknown_unit() {
        let err = convert(1.0, &Unit::new("parsec"), &Unit::new("m")).unwrap_err();
        assert_eq!(err, UnitError::Unknown("parsec".to_string()));
    }

    #[test]
    fn test_dimensionless() {
        assert_eq!(convert(3.0, &Unit::new(""), &Unit::new("-")).unwrap(), 3.0);
    }
}
