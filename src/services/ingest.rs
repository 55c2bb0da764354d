//! Forecast ingestion: fetch one bulletin per monitored cell, pivot the raw
//! items into samples and replace the cell's overlapping range in storage.

use crate::client::ForecastSource;
use crate::error::PipelineError;
use crate::models::domain::{ForecastSample, GridCell, MonitoredCell};
use crate::models::kma::{Category, ForecastItem};
use crate::physics::dew_point;
use crate::store::ForecastStore;
use crate::utils::{local_day_bounds, local_to_utc, round1};
use chrono::{Duration, FixedOffset, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};

/// Bulletins are published every three hours starting at 02:00 local.
const FIRST_ISSUE_HOUR: u32 = 2;
const ISSUE_EVERY_HOURS: u32 = 3;

/// Kept slots relative to the base time: the next 24 hourly slots.
const WINDOW_START_HOURS: i64 = 1;
const WINDOW_END_HOURS: i64 = 25;

/// The upstream marks missing values with large sentinels (-999, 900, ...).
const MISSING_SENTINEL_ABS: f64 = 900.0;

/// Latest published bulletin base time for a local wall-clock instant.
pub fn base_issue_time(now_local: NaiveDateTime) -> NaiveDateTime {
    let midnight = now_local.date().and_time(NaiveTime::MIN);
    let hour = now_local.hour();
    if hour < FIRST_ISSUE_HOUR {
        // previous day's 23:00 bulletin
        return midnight - Duration::hours(1);
    }
    let base_hour = (hour - FIRST_ISSUE_HOUR) / ISSUE_EVERY_HOURS * ISSUE_EVERY_HOURS + FIRST_ISSUE_HOUR;
    midnight + Duration::hours(i64::from(base_hour))
}

/// Last successfully stored base time per cell. Process-local and advisory:
/// losing it only costs a refetch.
#[derive(Debug, Default)]
pub struct FetchCache {
    last_issue: HashMap<GridCell, NaiveDateTime>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_current(&self, cell: GridCell, issue: NaiveDateTime) -> bool {
        self.last_issue.get(&cell) == Some(&issue)
    }

    pub fn record(&mut self, cell: GridCell, issue: NaiveDateTime) {
        self.last_issue.insert(cell, issue);
    }
}

#[derive(Debug, Default)]
struct Slot {
    temperature_c: Option<f64>,
    humidity_pct: Option<f64>,
    rain_probability_pct: Option<f64>,
    unusable: bool,
}

fn parse_slot_time(date: &str, time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{}{}", date.trim(), time.trim()), "%Y%m%d%H%M").ok()
}

fn parse_value(category: Category, raw: &str) -> Option<f64> {
    let v = raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    if v.abs() >= MISSING_SENTINEL_ABS {
        return None;
    }
    match category {
        Category::Humidity | Category::RainProbability if !(0.0..=100.0).contains(&v) => None,
        _ => Some(v),
    }
}

/// Pivot raw items into samples for one cell.
///
/// Groups missing any of temperature, humidity or rain probability, or holding
/// an unparsable value, are dropped. Only slots inside the bulletin's valid
/// window are kept.
pub fn normalize(items: &[ForecastItem], cell: GridCell, issue: NaiveDateTime, tz: FixedOffset) -> Vec<ForecastSample> {
    let mut slots: BTreeMap<NaiveDateTime, Slot> = BTreeMap::new();

    for item in items {
        if item.category == Category::Other {
            continue;
        }
        let Some(at) = parse_slot_time(&item.fcst_date, &item.fcst_time) else {
            debug!("Ingest: unparsable slot {} {} for cell {}", item.fcst_date, item.fcst_time, cell);
            continue;
        };
        let slot = slots.entry(at).or_default();
        let Some(value) = parse_value(item.category, &item.fcst_value) else {
            slot.unusable = true;
            continue;
        };
        match item.category {
            Category::Temperature => slot.temperature_c = Some(value),
            Category::Humidity => slot.humidity_pct = Some(value),
            Category::RainProbability => slot.rain_probability_pct = Some(value),
            Category::Other => {}
        }
    }

    let from = issue + Duration::hours(WINDOW_START_HOURS);
    let to = issue + Duration::hours(WINDOW_END_HOURS);
    let issued_at = local_to_utc(issue, tz);

    slots
        .into_iter()
        .filter(|(at, _)| *at >= from && *at < to)
        .filter_map(|(at, slot)| {
            if slot.unusable {
                return None;
            }
            let (Some(t), Some(rh), Some(pop)) = (slot.temperature_c, slot.humidity_pct, slot.rain_probability_pct)
            else {
                return None;
            };
            Some(ForecastSample {
                cell,
                timestamp: local_to_utc(at, tz),
                temperature_c: round1(t),
                humidity_pct: round1(rh),
                rain_probability_pct: pop.round() as i32,
                dew_point_c: dew_point(t, rh).ok().map(round1),
                issued_at,
            })
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub attempted: usize,
    pub updated: usize,
    pub cached: usize,
    pub failed: usize,
    pub samples: usize,
}

impl IngestReport {
    /// A run fails only when no cell ended up with current data.
    pub fn is_failure(&self) -> bool {
        self.attempted > 0 && self.updated + self.cached == 0
    }
}

fn ingest_cell<S: ForecastStore + ?Sized>(
    store: &mut S,
    source: &dyn ForecastSource,
    cell: GridCell,
    issue: NaiveDateTime,
    tz: FixedOffset,
) -> Result<usize, PipelineError> {
    let items = source
        .fetch(cell, issue)
        .map_err(|e| PipelineError::ExternalFetch(e.to_string()))?;
    let samples = normalize(&items, cell, issue, tz);
    if samples.is_empty() {
        return Err(PipelineError::ExternalFetch(format!(
            "bulletin {} returned no usable samples ({} raw items)",
            issue.format("%Y%m%d %H%M"),
            items.len()
        )));
    }
    store.replace_range(cell, &samples)
}

/// One ingestion run over all monitored cells. Never aborts on a single cell.
pub fn run<S: ForecastStore + ?Sized>(
    store: &mut S,
    source: &dyn ForecastSource,
    cache: &mut FetchCache,
    cells: &[MonitoredCell],
    now_local: NaiveDateTime,
    tz: FixedOffset,
) -> IngestReport {
    let mut report = IngestReport::default();

    let (midnight, _) = local_day_bounds(now_local.date(), tz);
    match store.purge_before(midnight) {
        Ok(0) => {}
        Ok(n) => info!("Ingest: purged {} stale sample(s) before {}", n, midnight),
        Err(e) => warn!("Ingest: purge of stale samples failed: {}", e),
    }

    let issue = base_issue_time(now_local);
    for monitored in cells {
        report.attempted += 1;
        let cell = monitored.cell;
        if cache.is_current(cell, issue) {
            debug!("Ingest: {} {} already holds bulletin {}", monitored.name, cell, issue);
            report.cached += 1;
            continue;
        }
        match ingest_cell(store, source, cell, issue, tz) {
            Ok(n) => {
                cache.record(cell, issue);
                report.updated += 1;
                report.samples += n;
                debug!("Ingest: stored {} sample(s) for {} {}", n, monitored.name, cell);
            }
            Err(e) => {
                report.failed += 1;
                warn!("Ingest: skipping {} {}: {}", monitored.name, cell, e);
            }
        }
    }

    info!(
        "Ingest: bulletin {} (cells={}, updated={}, cached={}, failed={}, samples={})",
        issue.format("%Y-%m-%d %H:%M"),
        report.attempted,
        report.updated,
        report.cached,
        report.failed,
        report.samples
    );
    report
}
