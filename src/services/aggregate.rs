//! Daily risk aggregation: one assessment per dwelling from the worst
//! forecast slot of the target day.

use crate::error::PipelineError;
use crate::models::domain::{DwellingProfile, ForecastSample, RiskAssessment};
use crate::risk::{self, IndoorSource, InputError, RiskInput};
use crate::store::{DwellingStore, ForecastStore, RiskStore};
use crate::utils::{local_day_bounds, round1};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use log::{debug, info, warn};

/// The slot with the lowest known dew point; ties go to the earliest slot.
pub fn select_worst_case(samples: &[ForecastSample]) -> Option<&ForecastSample> {
    samples
        .iter()
        .filter_map(|s| s.dew_point_c.map(|dp| (dp, s)))
        .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.timestamp.cmp(&b.1.timestamp)))
        .map(|(_, s)| s)
}

pub fn risk_input(dwelling: &DwellingProfile, sample: &ForecastSample) -> RiskInput {
    RiskInput {
        outdoor_temp_c: sample.temperature_c,
        outdoor_rh_pct: sample.humidity_pct,
        window_orientation: dwelling.window_orientation,
        floor_type: dwelling.floor_type,
        indoor: IndoorSource::from_readings(dwelling.indoor_temp_c, dwelling.indoor_humidity_pct),
    }
}

/// Run the model for one dwelling against one sample, rounded for storage.
pub fn assess_dwelling(
    dwelling: &DwellingProfile,
    sample: &ForecastSample,
    target_date: NaiveDate,
    computed_at: DateTime<Utc>,
) -> Result<RiskAssessment, InputError> {
    let a = risk::assess(&risk_input(dwelling, sample))?;
    Ok(RiskAssessment {
        user_id: dwelling.user_id,
        score: round1(a.score),
        level: a.level,
        target_date,
        message: a.message,
        mode: a.mode,
        wall_temp_c: round1(a.wall_temp_c),
        surface_rh_pct: round1(a.surface_rh_pct),
        condensation: a.condensation,
        computed_at,
    })
}

fn assess_and_record<S: ForecastStore + RiskStore + ?Sized>(
    store: &mut S,
    dwelling: &DwellingProfile,
    target_date: NaiveDate,
    tz: FixedOffset,
    now: DateTime<Utc>,
) -> Result<RiskAssessment, PipelineError> {
    let cell = dwelling
        .cell
        .ok_or_else(|| PipelineError::Configuration(format!("user {} has no grid coordinates", dwelling.user_id)))?;
    let (from, to) = local_day_bounds(target_date, tz);
    let samples = store.samples_between(cell, from, to)?;
    let worst = select_worst_case(&samples).ok_or(PipelineError::NoForecast {
        cell,
        date: target_date,
    })?;
    let assessment = assess_dwelling(dwelling, worst, target_date, now)?;
    store.record(&assessment)?;
    Ok(assessment)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl AggregateReport {
    pub fn is_failure(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }
}

/// Assess every registered dwelling for `target_date`.
///
/// Only loading the dwelling list can fail the call; per-user problems are
/// counted and logged.
pub fn run<S: ForecastStore + DwellingStore + RiskStore + ?Sized>(
    store: &mut S,
    target_date: NaiveDate,
    tz: FixedOffset,
    now: DateTime<Utc>,
) -> Result<AggregateReport, PipelineError> {
    let dwellings = store.dwellings()?;
    let mut report = AggregateReport::default();

    for dwelling in &dwellings {
        match assess_and_record(store, dwelling, target_date, tz, now) {
            Ok(a) => {
                report.succeeded += 1;
                debug!(
                    "Risk: user {} scored {} ({}, {:?})",
                    dwelling.user_id,
                    a.score,
                    a.level.label(),
                    a.mode
                );
            }
            Err(e) if e.is_skip() => {
                report.skipped += 1;
                debug!("Risk: skipping user {}: {}", dwelling.user_id, e);
            }
            Err(e) => {
                report.failed += 1;
                warn!("Risk: user {} not assessed: {}", dwelling.user_id, e);
            }
        }
    }

    info!(
        "Risk: {} (users={}, succeeded={}, skipped={}, failed={})",
        target_date,
        dwellings.len(),
        report.succeeded,
        report.skipped,
        report.failed
    );
    Ok(report)
}

/// Re-run the assessment for one user, e.g. after a profile or location change.
pub fn recompute_user<S: ForecastStore + DwellingStore + RiskStore + ?Sized>(
    store: &mut S,
    user_id: i64,
    target_date: NaiveDate,
    tz: FixedOffset,
    now: DateTime<Utc>,
) -> Result<RiskAssessment, PipelineError> {
    let dwelling = store
        .dwelling(user_id)?
        .ok_or_else(|| PipelineError::Configuration(format!("no dwelling registered for user {}", user_id)))?;
    let assessment = assess_and_record(store, &dwelling, target_date, tz, now)?;
    info!(
        "Risk: recomputed user {} for {} -> {} ({})",
        user_id,
        target_date,
        assessment.score,
        assessment.level.label()
    );
    Ok(assessment)
}
