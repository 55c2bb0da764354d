//! Best ventilation window of the day.

use crate::models::domain::{ForecastSample, VentilationWindow};
use crate::utils::{round1, utc_to_local};
use chrono::{DateTime, Duration, FixedOffset, Utc};

/// Thresholds for a "good" ventilation slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VentilationPolicy {
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub max_humidity_pct: f64,
    pub max_rain_pct: i32,
    /// Spacing of forecast slots; a larger hole breaks a run.
    pub interval: Duration,
}

impl Default for VentilationPolicy {
    fn default() -> Self {
        VentilationPolicy {
            min_temp_c: -5.0,
            max_temp_c: 28.0,
            max_humidity_pct: 60.0,
            max_rain_pct: 0,
            interval: Duration::hours(1),
        }
    }
}

impl VentilationPolicy {
    pub fn is_good(&self, s: &ForecastSample) -> bool {
        s.temperature_c >= self.min_temp_c
            && s.temperature_c <= self.max_temp_c
            && s.humidity_pct <= self.max_humidity_pct
            && s.rain_probability_pct <= self.max_rain_pct
    }
}

struct Run {
    start: DateTime<Utc>,
    last: DateTime<Utc>,
    humidity_sum: f64,
    count: usize,
}

impl Run {
    fn open(s: &ForecastSample) -> Self {
        Run {
            start: s.timestamp,
            last: s.timestamp,
            humidity_sum: s.humidity_pct,
            count: 1,
        }
    }

    fn avg_humidity(&self) -> f64 {
        self.humidity_sum / self.count as f64
    }

    fn length(&self) -> Duration {
        self.last - self.start
    }

    /// Longer wins, then drier. Equal runs keep the earlier one.
    fn beats(&self, other: &Run) -> bool {
        match self.length().cmp(&other.length()) {
            core::cmp::Ordering::Greater => true,
            core::cmp::Ordering::Less => false,
            core::cmp::Ordering::Equal => self.avg_humidity() < other.avg_humidity(),
        }
    }
}

/// Longest contiguous run of good slots at or after `now`.
///
/// `samples` are one cell's samples for the day; order does not matter.
pub fn best_window(
    samples: &[ForecastSample],
    now: DateTime<Utc>,
    policy: &VentilationPolicy,
    tz: FixedOffset,
) -> Option<VentilationWindow> {
    let mut upcoming: Vec<&ForecastSample> = samples.iter().filter(|s| s.timestamp >= now).collect();
    upcoming.sort_by_key(|s| s.timestamp);

    let mut best: Option<Run> = None;
    let mut current: Option<Run> = None;

    for s in upcoming {
        if !policy.is_good(s) {
            close(&mut best, current.take());
            continue;
        }
        current = match current.take() {
            Some(mut run) if s.timestamp - run.last <= policy.interval => {
                run.last = s.timestamp;
                run.humidity_sum += s.humidity_pct;
                run.count += 1;
                Some(run)
            }
            broken => {
                close(&mut best, broken);
                Some(Run::open(s))
            }
        };
    }
    close(&mut best, current);

    best.map(|run| VentilationWindow {
        date: utc_to_local(run.start, tz).date(),
        start: run.start,
        end: run.last + policy.interval,
        avg_humidity: round1(run.avg_humidity()),
    })
}

fn close(best: &mut Option<Run>, finished: Option<Run>) {
    let Some(run) = finished else { return };
    let replace = match best.as_ref() {
        Some(b) => run.beats(b),
        None => true,
    };
    if replace {
        *best = Some(run);
    }
}
