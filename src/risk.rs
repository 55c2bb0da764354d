//! Hygrothermal wall-surface condensation risk.
//!
//! The model resolves indoor conditions once (measured readings or a
//! simulation driven by the outdoor temperature), derives the temperature of
//! the coldest interior wall from a thermal coupling factor, and scores the
//! relative humidity at that surface.

use crate::models::domain::{FloorType, IndoorMode, RiskLevel, WindowOrientation};
use crate::physics::{saturation_vapor_pressure, vapor_pressure};
use core::fmt;
use std::error::Error;
use std::f64::consts::PI;

const BASE_COUPLING: f64 = 0.70;
const NORTH_PENALTY: f64 = 0.05;
const BELOW_GRADE_PENALTY: f64 = 0.10;

const HEATING_INDOOR_C: f64 = 21.0;
const COOLING_INDOOR_C: f64 = 26.0;
const HEATING_BELOW_C: f64 = 5.0;
const COOLING_ABOVE_C: f64 = 30.0;

/// Household moisture load at 0°C outdoors (hPa), fading to zero at 20°C.
const MOISTURE_EXCESS_AT_ZERO_HPA: f64 = 8.10;
const MOISTURE_EXCESS_ZERO_AT_C: f64 = 20.0;

/// Displayed surface humidity is capped here once condensation is reached.
const CONDENSATION_DISPLAY_CAP: f64 = 120.0;

/// A model input that is missing, non-finite or physically impossible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputError {
    pub field: &'static str,
    pub value: f64,
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.field, self.value)
    }
}

impl Error for InputError {}

/// Where indoor conditions come from for one assessment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndoorSource {
    Measured { temp_c: f64, rh_pct: f64 },
    Simulated,
}

impl IndoorSource {
    /// Both readings are required for a measured run; a lone reading is ignored.
    pub fn from_readings(temp_c: Option<f64>, rh_pct: Option<f64>) -> Self {
        match (temp_c, rh_pct) {
            (Some(temp_c), Some(rh_pct)) => IndoorSource::Measured { temp_c, rh_pct },
            _ => IndoorSource::Simulated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInput {
    pub outdoor_temp_c: f64,
    pub outdoor_rh_pct: f64,
    pub window_orientation: WindowOrientation,
    pub floor_type: FloorType,
    pub indoor: IndoorSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub level: RiskLevel,
    pub condensation: bool,
    pub mode: IndoorMode,
    pub indoor_temp_c: f64,
    pub indoor_rh_pct: f64,
    pub wall_temp_c: f64,
    /// Capped at 120 when condensing.
    pub surface_rh_pct: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceScore {
    pub score: f64,
    pub condensation: bool,
}

struct Indoor {
    temp_c: f64,
    rh_pct: f64,
    vapor_pressure_hpa: f64,
    mode: IndoorMode,
}

pub fn assess(input: &RiskInput) -> Result<Assessment, InputError> {
    let t_out = finite("outdoor_temp_c", input.outdoor_temp_c)?;
    let rh_out = percentage("outdoor_rh_pct", input.outdoor_rh_pct)?;

    let indoor = resolve_indoor(input.indoor, t_out, rh_out)?;

    let f = thermal_coupling_factor(input.window_orientation, input.floor_type);
    let wall_temp_c = indoor.temp_c - (indoor.temp_c - t_out) * (1.0 - f);
    let p_sat_wall = saturation_vapor_pressure(wall_temp_c);
    let surface_rh = if p_sat_wall <= 0.0 {
        100.0
    } else {
        indoor.vapor_pressure_hpa / p_sat_wall * 100.0
    };

    let SurfaceScore { score, condensation } = score_surface_humidity(surface_rh);
    let level = level_for(score, condensation);
    let message = advisory(level, condensation, indoor.mode, indoor.rh_pct);

    Ok(Assessment {
        score,
        level,
        condensation,
        mode: indoor.mode,
        indoor_temp_c: indoor.temp_c,
        indoor_rh_pct: indoor.rh_pct,
        wall_temp_c,
        surface_rh_pct: if condensation {
            surface_rh.min(CONDENSATION_DISPLAY_CAP)
        } else {
            surface_rh
        },
        message,
    })
}

fn resolve_indoor(source: IndoorSource, t_out: f64, rh_out: f64) -> Result<Indoor, InputError> {
    match source {
        IndoorSource::Measured { temp_c, rh_pct } => {
            let temp_c = finite("indoor_temp_c", temp_c)?;
            let rh_pct = percentage("indoor_rh_pct", rh_pct)?;
            Ok(Indoor {
                temp_c,
                rh_pct,
                vapor_pressure_hpa: vapor_pressure(temp_c, rh_pct),
                mode: IndoorMode::Measured,
            })
        }
        IndoorSource::Simulated => {
            let temp_c = simulated_indoor_temp(t_out);
            let vapor_pressure_hpa = vapor_pressure(t_out, rh_out) + moisture_excess(t_out);
            let rh_pct = (vapor_pressure_hpa / saturation_vapor_pressure(temp_c) * 100.0).min(100.0);
            // Keep the pressure consistent with the capped humidity.
            let vapor_pressure_hpa = vapor_pressure(temp_c, rh_pct);
            Ok(Indoor {
                temp_c,
                rh_pct,
                vapor_pressure_hpa,
                mode: IndoorMode::Simulated,
            })
        }
    }
}

/// Heating setpoint below 5°C, cooling setpoint above 30°C, a half-cosine ramp between.
pub fn simulated_indoor_temp(outdoor_temp_c: f64) -> f64 {
    if outdoor_temp_c < HEATING_BELOW_C {
        HEATING_INDOOR_C
    } else if outdoor_temp_c > COOLING_ABOVE_C {
        COOLING_INDOOR_C
    } else {
        let progress = (outdoor_temp_c - HEATING_BELOW_C) / (COOLING_ABOVE_C - HEATING_BELOW_C);
        let ramp = (1.0 - (PI * progress).cos()) / 2.0;
        HEATING_INDOOR_C + (COOLING_INDOOR_C - HEATING_INDOOR_C) * ramp
    }
}

/// Indoor vapor pressure surplus from occupancy (hPa).
pub fn moisture_excess(outdoor_temp_c: f64) -> f64 {
    if outdoor_temp_c <= 0.0 {
        MOISTURE_EXCESS_AT_ZERO_HPA
    } else if outdoor_temp_c >= MOISTURE_EXCESS_ZERO_AT_C {
        0.0
    } else {
        MOISTURE_EXCESS_AT_ZERO_HPA * (MOISTURE_EXCESS_ZERO_AT_C - outdoor_temp_c) / MOISTURE_EXCESS_ZERO_AT_C
    }
}

/// Lower values mean the wall tracks the outdoor temperature more closely.
pub fn thermal_coupling_factor(orientation: WindowOrientation, floor: FloorType) -> f64 {
    let mut f = BASE_COUPLING;
    if orientation == WindowOrientation::North {
        f -= NORTH_PENALTY;
    }
    if floor.is_below_grade() {
        f -= BELOW_GRADE_PENALTY;
    }
    f
}

/// Piecewise-linear score over the wall surface relative humidity.
pub fn score_surface_humidity(surface_rh_pct: f64) -> SurfaceScore {
    if surface_rh_pct >= 100.0 {
        return SurfaceScore {
            score: 100.0,
            condensation: true,
        };
    }

    let score = if surface_rh_pct <= 60.0 {
        surface_rh_pct / 60.0 * 20.0
    } else if surface_rh_pct <= 80.0 {
        20.0 + (surface_rh_pct - 60.0) / 20.0 * 50.0
    } else {
        70.0 + (surface_rh_pct - 80.0) / 20.0 * 30.0
    };

    SurfaceScore {
        score: score.clamp(0.0, 100.0),
        condensation: false,
    }
}

pub fn level_for(score: f64, condensation: bool) -> RiskLevel {
    if condensation || score >= 80.0 {
        RiskLevel::Danger
    } else if score >= 60.0 {
        RiskLevel::Warning
    } else if score >= 20.0 {
        RiskLevel::Caution
    } else {
        RiskLevel::Safe
    }
}

fn advisory(level: RiskLevel, condensation: bool, mode: IndoorMode, indoor_rh_pct: f64) -> String {
    let rh = indoor_rh_pct.round();
    match (level, mode) {
        (RiskLevel::Danger, IndoorMode::Measured) if condensation => format!(
            "Water is condensing on your coldest wall at {rh}% indoor humidity. \
             Ventilate now and run a dehumidifier."
        ),
        (RiskLevel::Danger, IndoorMode::Simulated) if condensation => {
            "Condensation is likely on your coldest wall. Check behind furniture and confirm with a hygrometer."
                .to_string()
        }
        (RiskLevel::Danger, IndoorMode::Measured) => {
            format!("Indoor humidity ({rh}%) is too high for your walls. Ventilate right away.")
        }
        (RiskLevel::Danger, IndoorMode::Simulated) => {
            "The wallpaper is probably damp on the inside. Check your hygrometer.".to_string()
        }
        (RiskLevel::Warning, IndoorMode::Measured) => {
            format!("At {rh}% indoor humidity your cold walls are collecting moisture. Turn on a dehumidifier.")
        }
        (RiskLevel::Warning, IndoorMode::Simulated) => {
            "Cold walls are likely collecting moisture. Air out the room and consider a dehumidifier.".to_string()
        }
        (RiskLevel::Caution, IndoorMode::Measured) => {
            format!("Indoor humidity ({rh}%) is borderline. Ventilate a few times today.")
        }
        (RiskLevel::Caution, IndoorMode::Simulated) => "Keep an eye on ventilation today.".to_string(),
        (RiskLevel::Safe, IndoorMode::Measured) => {
            format!("Indoor humidity ({rh}%) is comfortable. Your home is currently safe from mold.")
        }
        (RiskLevel::Safe, IndoorMode::Simulated) => "Your home is currently safe from mold.".to_string(),
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64, InputError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InputError { field, value })
    }
}

fn percentage(field: &'static str, value: f64) -> Result<f64, InputError> {
    let value = finite(field, value)?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(InputError { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated(t: f64, rh: f64, orientation: WindowOrientation, floor: FloorType) -> RiskInput {
        RiskInput {
            outdoor_temp_c: t,
            outdoor_rh_pct: rh,
            window_orientation: orientation,
            floor_type: floor,
            indoor: IndoorSource::Simulated,
        }
    }

    #[test]
    fn north_underground_scores_higher_than_south_other() {
        let risky = assess(&simulated(5.0, 90.0, WindowOrientation::North, FloorType::Underground)).unwrap();
        let mild = assess(&simulated(5.0, 90.0, WindowOrientation::South, FloorType::Other)).unwrap();

        assert_eq!(risky.mode, IndoorMode::Simulated);
        assert_eq!(mild.mode, IndoorMode::Simulated);
        assert!(risky.score > mild.score, "{} vs {}", risky.score, mild.score);
        assert!(risky.wall_temp_c < mild.wall_temp_c);
    }

    #[test]
    fn saturated_surface_is_condensation() {
        let s = score_surface_humidity(100.0);
        assert_eq!(s.score, 100.0);
        assert!(s.condensation);
        assert_eq!(level_for(s.score, s.condensation), RiskLevel::Danger);

        let s = score_surface_humidity(59.999);
        assert!((0.0..20.0).contains(&s.score));
        assert!(!s.condensation);
    }

    #[test]
    fn score_is_continuous_at_band_edges() {
        assert!((score_surface_humidity(60.0).score - 20.0).abs() < 1e-9);
        assert!((score_surface_humidity(80.0).score - 70.0).abs() < 1e-9);
        assert!((score_surface_humidity(99.999).score - 100.0).abs() < 1e-2);
        assert_eq!(score_surface_humidity(0.0).score, 0.0);
    }

    #[test]
    fn measured_readings_drive_the_run() {
        let input = RiskInput {
            outdoor_temp_c: -5.0,
            outdoor_rh_pct: 80.0,
            window_orientation: WindowOrientation::North,
            floor_type: FloorType::SemiBasement,
            indoor: IndoorSource::from_readings(Some(22.0), Some(70.0)),
        };
        let a = assess(&input).unwrap();
        assert_eq!(a.mode, IndoorMode::Measured);
        assert_eq!(a.indoor_temp_c, 22.0);
        assert_eq!(a.indoor_rh_pct, 70.0);
        assert!(a.condensation);
        assert_eq!(a.level, RiskLevel::Danger);
        assert!(a.surface_rh_pct <= 120.0);
        assert!(a.message.contains("70%"));
    }

    #[test]
    fn lone_indoor_reading_falls_back_to_simulation() {
        assert_eq!(IndoorSource::from_readings(Some(22.0), None), IndoorSource::Simulated);
        assert_eq!(IndoorSource::from_readings(None, Some(50.0)), IndoorSource::Simulated);
    }

    #[test]
    fn simulated_indoor_temperature_ramps_smoothly() {
        assert_eq!(simulated_indoor_temp(-10.0), 21.0);
        assert_eq!(simulated_indoor_temp(35.0), 26.0);
        assert!((simulated_indoor_temp(5.0) - 21.0).abs() < 1e-9);
        assert!((simulated_indoor_temp(30.0) - 26.0).abs() < 1e-9);
        assert!((simulated_indoor_temp(17.5) - 23.5).abs() < 1e-9);
        let mut previous = simulated_indoor_temp(5.0);
        for t in 6..=30 {
            let current = simulated_indoor_temp(f64::from(t));
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn moisture_excess_fades_out_by_twenty_degrees() {
        assert_eq!(moisture_excess(-3.0), 8.10);
        assert!((moisture_excess(10.0) - 4.05).abs() < 1e-9);
        assert_eq!(moisture_excess(25.0), 0.0);
    }

    #[test]
    fn simulated_indoor_humidity_is_capped() {
        let a = assess(&simulated(-2.0, 100.0, WindowOrientation::South, FloorType::Other)).unwrap();
        assert!(a.indoor_rh_pct <= 100.0);
    }

    #[test]
    fn coupling_factor_penalties() {
        assert!((thermal_coupling_factor(WindowOrientation::South, FloorType::Other) - 0.70).abs() < 1e-9);
        assert!((thermal_coupling_factor(WindowOrientation::North, FloorType::Other) - 0.65).abs() < 1e-9);
        assert!((thermal_coupling_factor(WindowOrientation::North, FloorType::Underground) - 0.55).abs() < 1e-9);
        assert!((thermal_coupling_factor(WindowOrientation::Other, FloorType::SemiBasement) - 0.60).abs() < 1e-9);
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let err = assess(&simulated(f64::NAN, 50.0, WindowOrientation::South, FloorType::Other)).unwrap_err();
        assert_eq!(err.field, "outdoor_temp_c");

        let err = assess(&simulated(10.0, f64::INFINITY, WindowOrientation::South, FloorType::Other)).unwrap_err();
        assert_eq!(err.field, "outdoor_rh_pct");

        let input = RiskInput {
            indoor: IndoorSource::Measured {
                temp_c: 21.0,
                rh_pct: 140.0,
            },
            ..simulated(10.0, 50.0, WindowOrientation::South, FloorType::Other)
        };
        assert_eq!(assess(&input).unwrap_err().field, "indoor_rh_pct");
    }

    #[test]
    fn advisories_differ_between_measured_and_simulated() {
        for level in [RiskLevel::Safe, RiskLevel::Caution, RiskLevel::Warning, RiskLevel::Danger] {
            for condensation in [false, true] {
                if condensation && level != RiskLevel::Danger {
                    continue;
                }
                let measured = advisory(level, condensation, IndoorMode::Measured, 64.0);
                let simulated = advisory(level, condensation, IndoorMode::Simulated, 64.0);
                assert_ne!(measured, simulated, "{:?}", level);
                assert!(measured.contains("64%"), "{}", measured);
            }
        }
    }

    #[test]
    fn dry_mild_day_is_safe() {
        let a = assess(&simulated(24.0, 30.0, WindowOrientation::South, FloorType::Other)).unwrap();
        assert_eq!(a.level, RiskLevel::Safe);
        assert!(a.score < 20.0);
        assert!(!a.condensation);
    }
}
