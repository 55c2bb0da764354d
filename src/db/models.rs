//! Diesel row structs and their conversion to domain types.
//!
//! Enum-valued columns (`level`, `mode`) are stored as their serde names.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use crate::models::domain::{
    DwellingProfile, FloorType, ForecastSample, GridCell, IndoorMode, RiskAssessment, RiskLevel, WindowOrientation,
};
use crate::schema;
use crate::utils::{parse_serde_enum, serde_enum_name};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::dwellings)]
pub struct Dwelling {
    pub user_id: i64,
    pub address: Option<String>,
    pub canonical_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub grid_x: Option<i32>,
    pub grid_y: Option<i32>,
    pub window_orientation: Option<String>,
    pub floor_type: Option<String>,
    pub indoor_temp_c: Option<f64>,
    pub indoor_humidity_pct: Option<f64>,
}

impl From<Dwelling> for DwellingProfile {
    fn from(row: Dwelling) -> Self {
        DwellingProfile {
            user_id: row.user_id,
            cell: row.grid_x.zip(row.grid_y).map(|(x, y)| GridCell::new(x, y)),
            window_orientation: WindowOrientation::from_stored(row.window_orientation.as_deref()),
            floor_type: FloorType::from_stored(row.floor_type.as_deref()),
            indoor_temp_c: row.indoor_temp_c,
            indoor_humidity_pct: row.indoor_humidity_pct,
            address: row.address,
            canonical_address: row.canonical_address,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::forecast_samples)]
pub struct ForecastSampleRow {
    pub grid_x: i32,
    pub grid_y: i32,
    pub forecast_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub rain_probability_pct: i32,
    pub dew_point_c: Option<f64>,
    pub issued_at: DateTime<Utc>,
}

impl From<ForecastSampleRow> for ForecastSample {
    fn from(row: ForecastSampleRow) -> Self {
        ForecastSample {
            cell: GridCell::new(row.grid_x, row.grid_y),
            timestamp: row.forecast_at,
            temperature_c: row.temperature_c,
            humidity_pct: row.humidity_pct,
            rain_probability_pct: row.rain_probability_pct,
            dew_point_c: row.dew_point_c,
            issued_at: row.issued_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::forecast_samples)]
pub struct NewForecastSample {
    pub grid_x: i32,
    pub grid_y: i32,
    pub forecast_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub rain_probability_pct: i32,
    pub dew_point_c: Option<f64>,
    pub issued_at: DateTime<Utc>,
}

impl From<&ForecastSample> for NewForecastSample {
    fn from(s: &ForecastSample) -> Self {
        NewForecastSample {
            grid_x: s.cell.x,
            grid_y: s.cell.y,
            forecast_at: s.timestamp,
            temperature_c: s.temperature_c,
            humidity_pct: s.humidity_pct,
            rain_probability_pct: s.rain_probability_pct,
            dew_point_c: s.dew_point_c,
            issued_at: s.issued_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::risk_assessments)]
pub struct RiskAssessmentRow {
    pub user_id: i64,
    pub score: f64,
    pub level: String,
    pub target_date: NaiveDate,
    pub message: String,
    pub mode: String,
    pub wall_temp_c: f64,
    pub surface_rh_pct: f64,
    pub condensation: bool,
    pub computed_at: DateTime<Utc>,
}

impl RiskAssessmentRow {
    /// `None` when a stored enum name is no longer known.
    pub fn into_domain(self) -> Option<RiskAssessment> {
        Some(RiskAssessment {
            user_id: self.user_id,
            score: self.score,
            level: parse_serde_enum::<RiskLevel>(&self.level)?,
            target_date: self.target_date,
            message: self.message,
            mode: parse_serde_enum::<IndoorMode>(&self.mode)?,
            wall_temp_c: self.wall_temp_c,
            surface_rh_pct: self.surface_rh_pct,
            condensation: self.condensation,
            computed_at: self.computed_at,
        })
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = schema::risk_assessments)]
pub struct NewRiskAssessment {
    pub user_id: i64,
    pub score: f64,
    pub level: String,
    pub target_date: NaiveDate,
    pub message: String,
    pub mode: String,
    pub wall_temp_c: f64,
    pub surface_rh_pct: f64,
    pub condensation: bool,
    pub computed_at: DateTime<Utc>,
}

impl From<&RiskAssessment> for NewRiskAssessment {
    fn from(a: &RiskAssessment) -> Self {
        NewRiskAssessment {
            user_id: a.user_id,
            score: a.score,
            level: serde_enum_name(&a.level).unwrap_or_default(),
            target_date: a.target_date,
            message: a.message.clone(),
            mode: serde_enum_name(&a.mode).unwrap_or_default(),
            wall_temp_c: a.wall_temp_c,
            surface_rh_pct: a.surface_rh_pct,
            condensation: a.condensation,
            computed_at: a.computed_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::risk_history)]
pub struct RiskHistoryRow {
    pub user_id: i64,
    pub score: f64,
    pub level: String,
    pub target_date: NaiveDate,
    pub message: String,
    pub mode: String,
    pub wall_temp_c: f64,
    pub surface_rh_pct: f64,
    pub condensation: bool,
    pub computed_at: DateTime<Utc>,
}

impl From<RiskHistoryRow> for RiskAssessmentRow {
    fn from(h: RiskHistoryRow) -> Self {
        RiskAssessmentRow {
            user_id: h.user_id,
            score: h.score,
            level: h.level,
            target_date: h.target_date,
            message: h.message,
            mode: h.mode,
            wall_temp_c: h.wall_temp_c,
            surface_rh_pct: h.surface_rh_pct,
            condensation: h.condensation,
            computed_at: h.computed_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::risk_history)]
pub struct NewRiskHistory {
    pub user_id: i64,
    pub score: f64,
    pub level: String,
    pub target_date: NaiveDate,
    pub message: String,
    pub mode: String,
    pub wall_temp_c: f64,
    pub surface_rh_pct: f64,
    pub condensation: bool,
    pub computed_at: DateTime<Utc>,
}

impl From<NewRiskAssessment> for NewRiskHistory {
    fn from(n: NewRiskAssessment) -> Self {
        NewRiskHistory {
            user_id: n.user_id,
            score: n.score,
            level: n.level,
            target_date: n.target_date,
            message: n.message,
            mode: n.mode,
            wall_temp_c: n.wall_temp_c,
            surface_rh_pct: n.surface_rh_pct,
            condensation: n.condensation,
            computed_at: n.computed_at,
        }
    }
}
