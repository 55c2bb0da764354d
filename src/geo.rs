//! Forecast grid geometry.
//!
//! The forecast source publishes on a 5 km Lambert conformal conic grid
//! (standard parallels 30°N/60°N, origin 38°N 126°E at grid point 43/136).

use crate::models::domain::{GridCell, MonitoredCell};
use std::f64::consts::PI;

const EARTH_RADIUS_KM: f64 = 6371.00877;
const GRID_KM: f64 = 5.0;
const STANDARD_PARALLEL_1: f64 = 30.0;
const STANDARD_PARALLEL_2: f64 = 60.0;
const ORIGIN_LON: f64 = 126.0;
const ORIGIN_LAT: f64 = 38.0;
const ORIGIN_X: f64 = 43.0;
const ORIGIN_Y: f64 = 136.0;

/// Cells kept up to date when `GRID_CELLS` is not configured.
pub const DEFAULT_CELLS: [(&str, i32, i32); 12] = [
    ("Seoul", 60, 127),
    ("Incheon", 55, 124),
    ("Suwon", 60, 121),
    ("Chuncheon", 73, 134),
    ("Gangneung", 92, 131),
    ("Daejeon", 67, 100),
    ("Cheongju", 69, 106),
    ("Gwangju", 58, 74),
    ("Jeonju", 63, 89),
    ("Daegu", 89, 90),
    ("Busan", 98, 76),
    ("Jeju", 52, 38),
];

pub fn default_cells() -> Vec<MonitoredCell> {
    DEFAULT_CELLS
        .iter()
        .map(|(name, x, y)| MonitoredCell {
            name: (*name).to_string(),
            cell: GridCell::new(*x, *y),
        })
        .collect()
}

/// Project WGS84 coordinates onto the forecast grid.
pub fn to_grid(latitude: f64, longitude: f64) -> GridCell {
    let deg = PI / 180.0;
    let re = EARTH_RADIUS_KM / GRID_KM;
    let slat1 = STANDARD_PARALLEL_1 * deg;
    let slat2 = STANDARD_PARALLEL_2 * deg;
    let olon = ORIGIN_LON * deg;
    let olat = ORIGIN_LAT * deg;

    let sn = (PI * 0.25 + slat2 * 0.5).tan() / (PI * 0.25 + slat1 * 0.5).tan();
    let sn = (slat1.cos() / slat2.cos()).ln() / sn.ln();
    let sf = (PI * 0.25 + slat1 * 0.5).tan().powf(sn) * slat1.cos() / sn;
    let ro = re * sf / (PI * 0.25 + olat * 0.5).tan().powf(sn);

    let ra = re * sf / (PI * 0.25 + latitude * deg * 0.5).tan().powf(sn);
    let mut theta = longitude * deg - olon;
    if theta > PI {
        theta -= 2.0 * PI;
    }
    if theta < -PI {
        theta += 2.0 * PI;
    }
    theta *= sn;

    let x = (ra * theta.sin() + ORIGIN_X + 0.5).floor();
    let y = (ro - ra * theta.cos() + ORIGIN_Y + 0.5).floor();
    GridCell::new(x as i32, y as i32)
}

/// Closest monitored cell by squared grid distance; ties keep list order.
pub fn nearest_monitored(target: GridCell, cells: &[MonitoredCell]) -> Option<&MonitoredCell> {
    cells.iter().min_by_key(|c| {
        let dx = i64::from(c.cell.x - target.x);
        let dy = i64::from(c.cell.y - target.y);
        dx * dx + dy * dy
    })
}
