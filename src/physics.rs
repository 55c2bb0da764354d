//! Moist-air relations used by the risk model and the forecast normalizer.
//!
//! All pressures are in hPa, temperatures in °C, relative humidity in percent.
//! Coefficients are the Magnus form over water (Sonntag 1990).

use core::fmt;
use std::error::Error;

const MAGNUS_E0_HPA: f64 = 6.112;
const MAGNUS_B: f64 = 17.62;
const MAGNUS_C: f64 = 243.12;

/// A physical quantity outside the range where a relation is defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainError {
    pub quantity: &'static str,
    pub value: f64,
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} is outside the defined domain", self.quantity, self.value)
    }
}

impl Error for DomainError {}

/// Saturation vapor pressure over water (Magnus formula).
pub fn saturation_vapor_pressure(temp_c: f64) -> f64 {
    MAGNUS_E0_HPA * ((MAGNUS_B * temp_c) / (MAGNUS_C + temp_c)).exp()
}

/// Partial pressure of water vapor at the given temperature and relative humidity.
pub fn vapor_pressure(temp_c: f64, rh_pct: f64) -> f64 {
    saturation_vapor_pressure(temp_c) * rh_pct / 100.0
}

/// Dew point by inverting the Magnus formula.
///
/// Only defined for `rh_pct > 0`. Callers must treat the error as "unknown",
/// never as a dew point of zero.
pub fn dew_point(temp_c: f64, rh_pct: f64) -> Result<f64, DomainError> {
    if !temp_c.is_finite() {
        return Err(DomainError {
            quantity: "temperature_c",
            value: temp_c,
        });
    }
    if !rh_pct.is_finite() || rh_pct <= 0.0 {
        return Err(DomainError {
            quantity: "rh_pct",
            value: rh_pct,
        });
    }

    let gamma = (rh_pct / 100.0).ln() + (MAGNUS_B * temp_c) / (MAGNUS_C + temp_c);
    Ok(MAGNUS_C * gamma / (MAGNUS_B - gamma))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(lhs: f64, rhs: f64, tolerance: f64) -> bool {
        (lhs - rhs).abs() <= tolerance
    }

    #[test]
    fn reference_values_at_twenty_degrees() {
        assert!(close(saturation_vapor_pressure(20.0), 23.39, 0.1));
        assert!(close(vapor_pressure(20.0, 50.0), 11.69, 0.1));
        let dp = dew_point(20.0, 50.0).unwrap();
        assert!(close(dp, 9.3, 0.06), "dew point was {dp}");
    }

    #[test]
    fn dew_point_equals_temperature_at_saturation() {
        for t in [-10.0, 0.0, 15.0, 30.0] {
            assert!(close(dew_point(t, 100.0).unwrap(), t, 1e-9));
        }
    }

    #[test]
    fn dew_point_tracks_humidity_over_indoor_range() {
        for t in (10..=30).map(f64::from) {
            let mut previous: Option<f64> = None;
            for rh in (30..=90).step_by(5).map(f64::from) {
                let dp = dew_point(t, rh).unwrap();
                let depression = t - dp;
                if let Some(prev) = previous {
                    assert!(dp >= prev, "dew point fell at t={t} rh={rh}");
                    assert!(depression <= t - prev);
                }
                previous = Some(dp);
            }
        }
    }

    #[test]
    fn dew_point_rejects_dry_or_non_finite_input() {
        assert_eq!(dew_point(20.0, 0.0).unwrap_err().quantity, "rh_pct");
        assert!(dew_point(20.0, -5.0).is_err());
        assert!(dew_point(f64::NAN, 50.0).is_err());
        assert!(dew_point(20.0, f64::INFINITY).is_err());
    }
}
