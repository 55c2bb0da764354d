//! Domain types shared by ingestion, the risk model and the read side.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A forecast grid cell (the forecast source's native spatial unit).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub const fn new(x: i32, y: i32) -> Self {
        GridCell { x, y }
    }
}

impl core::fmt::Display for GridCell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A grid cell the ingestion job keeps up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredCell {
    pub name: String,
    pub cell: GridCell,
}

/// One forecast observation for one grid cell and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    pub cell: GridCell,
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub rain_probability_pct: i32,
    pub dew_point_c: Option<f64>,
    /// Bulletin this sample was taken from.
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum WindowOrientation {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "OTHER")]
    Other,
}

impl WindowOrientation {
    /// Stored values use compass letters; anything but N and S collapses to `Other`.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("N") | Some("n") => WindowOrientation::North,
            Some("S") | Some("s") => WindowOrientation::South,
            _ => WindowOrientation::Other,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FloorType {
    Underground,
    SemiBasement,
    Other,
}

impl FloorType {
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("underground") => FloorType::Underground,
            Some("semi-basement") => FloorType::SemiBasement,
            _ => FloorType::Other,
        }
    }

    pub fn is_below_grade(self) -> bool {
        matches!(self, FloorType::Underground | FloorType::SemiBasement)
    }
}

/// The subset of a user's dwelling the model needs, plus its location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellingProfile {
    pub user_id: i64,
    pub cell: Option<GridCell>,
    pub window_orientation: WindowOrientation,
    pub floor_type: FloorType,
    pub indoor_temp_c: Option<f64>,
    pub indoor_humidity_pct: Option<f64>,
    pub address: Option<String>,
    pub canonical_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Resolved location written back on relocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellingLocation {
    pub address: String,
    pub canonical_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub cell: GridCell,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Caution,
    Warning,
    Danger,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Caution => "caution",
            RiskLevel::Warning => "warning",
            RiskLevel::Danger => "danger",
        }
    }
}

/// Where the indoor conditions of an assessment came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndoorMode {
    Measured,
    Simulated,
}

/// Per-user risk state produced by the aggregation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub user_id: i64,
    pub score: f64,
    pub level: RiskLevel,
    pub target_date: NaiveDate,
    pub message: String,
    pub mode: IndoorMode,
    pub wall_temp_c: f64,
    pub surface_rh_pct: f64,
    pub condensation: bool,
    pub computed_at: DateTime<Utc>,
}

/// Best contiguous stretch of ventilation-friendly forecast slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VentilationWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub avg_humidity: f64,
}
