//! Read side: the stored risk of a user and today's hour-by-hour outlook.

use crate::error::PipelineError;
use crate::models::domain::{DwellingProfile, ForecastSample, RiskAssessment, RiskLevel, VentilationWindow};
use crate::risk;
use crate::services::aggregate::risk_input;
use crate::services::ventilation::{self, VentilationPolicy};
use crate::store::{DwellingStore, ForecastStore, RiskStore};
use crate::utils::{local_day_bounds, round1, utc_to_local};
use chrono::{DateTime, Duration, DurationRound, FixedOffset, NaiveDate, Utc};
use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskView {
    NoData { user_id: i64 },
    Current(RiskAssessment),
}

/// Latest stored assessment, or `NoData` when the user has none yet.
pub fn current_risk<S: RiskStore + ?Sized>(store: &mut S, user_id: i64) -> Result<RiskView, PipelineError> {
    Ok(match store.current(user_id)? {
        Some(a) => RiskView::Current(a),
        None => RiskView::NoData { user_id },
    })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherCondition {
    Humid,
    Rainy,
    Pleasant,
}

impl WeatherCondition {
    pub fn of(sample: &ForecastSample) -> Self {
        if sample.humidity_pct > 70.0 {
            WeatherCondition::Humid
        } else if sample.rain_probability_pct > 0 {
            WeatherCondition::Rainy
        } else {
            WeatherCondition::Pleasant
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyRisk {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub level: RiskLevel,
    pub message: String,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub rain_probability_pct: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyOutlook {
    pub user_id: i64,
    pub date: NaiveDate,
    pub max: HourlyRisk,
    pub min: HourlyRisk,
    pub current: HourlyRisk,
    /// Set when the next full hour has no slot and `current` is the day's last one.
    pub end_of_forecast: bool,
    /// Weather at the next full hour; `None` past the end of the forecast.
    pub condition: Option<WeatherCondition>,
    pub ventilation: Option<VentilationWindow>,
}

fn hourly(dwelling: &DwellingProfile, s: &ForecastSample) -> Option<HourlyRisk> {
    match risk::assess(&risk_input(dwelling, s)) {
        Ok(a) => Some(HourlyRisk {
            timestamp: s.timestamp,
            score: round1(a.score),
            level: a.level,
            message: a.message,
            temperature_c: s.temperature_c,
            humidity_pct: s.humidity_pct,
            rain_probability_pct: s.rain_probability_pct,
        }),
        Err(e) => {
            debug!("Outlook: skipping slot {} for user {}: {}", s.timestamp, dwelling.user_id, e);
            None
        }
    }
}

/// Today's outlook for a user: highest, lowest and next-hour risk plus the
/// best ventilation window. `None` when no slot of today can be assessed.
pub fn daily_outlook<S: ForecastStore + DwellingStore + ?Sized>(
    store: &mut S,
    user_id: i64,
    now: DateTime<Utc>,
    tz: FixedOffset,
    policy: &VentilationPolicy,
) -> Result<Option<DailyOutlook>, PipelineError> {
    let dwelling = store
        .dwelling(user_id)?
        .ok_or_else(|| PipelineError::Configuration(format!("no dwelling registered for user {}", user_id)))?;
    let cell = dwelling
        .cell
        .ok_or_else(|| PipelineError::Configuration(format!("user {} has no grid coordinates", user_id)))?;

    let date = utc_to_local(now, tz).date();
    let (from, to) = local_day_bounds(date, tz);
    let samples = store.samples_between(cell, from, to)?;

    let target = now
        .duration_trunc(Duration::hours(1))
        .map_err(|e| PipelineError::Configuration(format!("cannot truncate {}: {}", now, e)))?
        + Duration::hours(1);

    let mut max: Option<HourlyRisk> = None;
    let mut min: Option<HourlyRisk> = None;
    let mut current: Option<(HourlyRisk, &ForecastSample)> = None;
    let mut last: Option<(HourlyRisk, &ForecastSample)> = None;

    for s in &samples {
        let Some(h) = hourly(&dwelling, s) else { continue };
        if max.as_ref().is_none_or(|m| h.score > m.score) {
            max = Some(h.clone());
        }
        if min.as_ref().is_none_or(|m| h.score < m.score) {
            min = Some(h.clone());
        }
        if s.timestamp == target {
            current = Some((h.clone(), s));
        }
        last = Some((h, s));
    }

    let end_of_forecast = current.is_none();
    let (Some(max), Some(min), Some((current, current_sample))) = (max, min, current.or(last)) else {
        return Ok(None);
    };

    Ok(Some(DailyOutlook {
        user_id,
        date,
        max,
        min,
        condition: (!end_of_forecast).then(|| WeatherCondition::of(current_sample)),
        current,
        end_of_forecast,
        ventilation: ventilation::best_window(&samples, now, policy, tz),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregate::tests::{dwelling, kst, local, seoul, winter_day};
    use crate::store::RiskRowMode;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;

    #[test]
    fn unknown_user_risk_is_no_data() {
        let mut store = MemoryStore::new(RiskRowMode::Current);
        assert_eq!(current_risk(&mut store, 5).unwrap(), RiskView::NoData { user_id: 5 });
        let json = serde_json::to_value(RiskView::NoData { user_id: 5 }).unwrap();
        assert_eq!(json["status"], "NO_DATA");
    }

    #[test]
    fn outlook_reports_extremes_and_next_hour() {
        let mut store = MemoryStore::new(RiskRowMode::Current)
            .with_dwelling(dwelling(1, Some(seoul())))
            .with_samples(winter_day(seoul()));

        let now = local(30, 10) + Duration::minutes(20);
        let o = daily_outlook(&mut store, 1, now, kst(), &VentilationPolicy::default())
            .unwrap()
            .unwrap();
        assert_eq!(o.date, NaiveDate::from_ymd_opt(2025, 1, 30).unwrap());
        assert_eq!(o.current.timestamp, local(30, 11));
        assert!(!o.end_of_forecast);
        assert!(o.max.score >= o.current.score && o.current.score >= o.min.score);
        // damp night is the worst part of the day
        let nine = chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(utc_to_local(o.max.timestamp, kst()).time() < nine);
        assert_eq!(o.condition, Some(WeatherCondition::Pleasant));
        let w = o.ventilation.unwrap();
        assert_eq!(w.start, local(30, 11));
        assert_eq!(w.end, local(31, 0));
    }

    #[test]
    fn late_evening_falls_back_to_last_slot() {
        let mut store = MemoryStore::new(RiskRowMode::Current)
            .with_dwelling(dwelling(1, Some(seoul())))
            .with_samples(winter_day(seoul()));

        let now = local(30, 23) + Duration::minutes(30);
        let o = daily_outlook(&mut store, 1, now, kst(), &VentilationPolicy::default())
            .unwrap()
            .unwrap();
        assert!(o.end_of_forecast);
        assert_eq!(o.current.timestamp, local(30, 23));
        assert_eq!(o.condition, None);
        assert!(o.ventilation.is_none());
    }

    #[test]
    fn outlook_without_samples_is_empty() {
        let mut store = MemoryStore::new(RiskRowMode::Current).with_dwelling(dwelling(1, Some(seoul())));
        let o = daily_outlook(&mut store, 1, local(30, 9), kst(), &VentilationPolicy::default()).unwrap();
        assert!(o.is_none());
    }

    #[test]
    fn humid_beats_rain_for_condition() {
        let mut s = crate::services::aggregate::tests::sample(seoul(), local(30, 9), 10.0, 75.0);
        s.rain_probability_pct = 60;
        assert_eq!(WeatherCondition::of(&s), WeatherCondition::Humid);
        s.humidity_pct = 65.0;
        assert_eq!(WeatherCondition::of(&s), WeatherCondition::Rainy);
    }
}
