//! Offline forecast source producing plausible bulletins for local runs.
//!
//! Output is deterministic per `(seed, cell, issue)` so repeated runs against
//! the same bulletin store the same samples.

use crate::client::{ForecastClientError, ForecastSource};
use crate::models::domain::GridCell;
use crate::models::kma::{Category, ForecastItem};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Hours covered by one synthetic bulletin.
const HORIZON_HOURS: i64 = 48;

pub struct SyntheticForecastSource {
    seed: u64,
}

impl SyntheticForecastSource {
    pub fn new(seed: u64) -> Self {
        SyntheticForecastSource { seed }
    }

    fn rng_for(&self, cell: GridCell, issue: NaiveDateTime) -> SmallRng {
        let cell_bits = ((cell.x as u64) << 32) ^ (cell.y as u64);
        let issue_bits = issue.and_utc().timestamp() as u64;
        SmallRng::seed_from_u64(self.seed ^ cell_bits.rotate_left(17) ^ issue_bits)
    }
}

fn seasonal_mean_temp(day_of_year: u32, cell: GridCell) -> f64 {
    // coldest mid-January; the south of the grid (low y) runs warmer
    let seasonal = -14.0 * (2.0 * PI * (f64::from(day_of_year) - 15.0) / 365.0).cos();
    let latitude_bias = -(f64::from(cell.y) - 90.0) * 0.06;
    12.5 + seasonal + latitude_bias
}

fn diurnal(hour: u32) -> f64 {
    // peaks at 15:00, bottoms at 03:00
    (2.0 * PI * (f64::from(hour) - 9.0) / 24.0).sin()
}

impl ForecastSource for SyntheticForecastSource {
    fn fetch(&self, cell: GridCell, issue: NaiveDateTime) -> Result<Vec<ForecastItem>, ForecastClientError> {
        let mut rng = self.rng_for(cell, issue);
        let mut items = Vec::with_capacity(HORIZON_HOURS as usize * 4);
        let mut rain_hours_left: u32 = 0;

        for h in 1..=HORIZON_HOURS {
            let slot = issue + Duration::hours(h);
            let date = slot.format("%Y%m%d").to_string();
            let time = slot.format("%H%M").to_string();
            let swing = diurnal(slot.hour());

            if rain_hours_left == 0 && rng.random_bool(0.04) {
                rain_hours_left = rng.random_range(2..=6);
            }
            let raining = rain_hours_left > 0;
            rain_hours_left = rain_hours_left.saturating_sub(1);

            let temp = seasonal_mean_temp(slot.ordinal(), cell) + 5.0 * swing + rng.random_range(-1.2..=1.2);
            let humidity = (68.0 - 14.0 * swing + if raining { 20.0 } else { 0.0 } + rng.random_range(-6.0..=6.0))
                .clamp(15.0, 100.0);
            let pop = if raining {
                rng.random_range(60..=90)
            } else if rng.random_bool(0.2) {
                rng.random_range(10..=30)
            } else {
                0
            };
            let sky = if raining { 4 } else { rng.random_range(1..=3) };

            items.push(ForecastItem::new(Category::Temperature, &date, &time, format!("{:.0}", temp)));
            items.push(ForecastItem::new(Category::Humidity, &date, &time, format!("{:.0}", humidity)));
            items.push(ForecastItem::new(Category::RainProbability, &date, &time, pop.to_string()));
            items.push(ForecastItem::new(Category::Other, &date, &time, sky.to_string()));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ingest::normalize;
    use chrono::{FixedOffset, NaiveDate};

    fn issue() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 30).unwrap().and_hms_opt(5, 0, 0).unwrap()
    }

    #[test]
    fn same_bulletin_is_reproducible() {
        let source = SyntheticForecastSource::new(7);
        let a = source.fetch(GridCell::new(60, 127), issue()).unwrap();
        let b = source.fetch(GridCell::new(60, 127), issue()).unwrap();
        assert_eq!(a, b);
        let other = source.fetch(GridCell::new(98, 76), issue()).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn bulletin_normalizes_into_a_full_day() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let cell = GridCell::new(60, 127);
        let items = SyntheticForecastSource::new(1).fetch(cell, issue()).unwrap();
        let samples = normalize(&items, cell, issue(), tz);
        assert_eq!(samples.len(), 24);
        for s in &samples {
            assert!((15.0..=100.0).contains(&s.humidity_pct));
            assert!((0..=100).contains(&s.rain_probability_pct));
            // late January in Seoul
            assert!((-25.0..15.0).contains(&s.temperature_c), "{}", s.temperature_c);
            assert!(s.dew_point_c.is_some());
        }
    }
}
