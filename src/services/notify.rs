//! Morning notice: today's risk and ventilation window, per user.

use crate::error::PipelineError;
use crate::models::domain::{GridCell, RiskAssessment, RiskLevel, VentilationWindow};
use crate::services::ventilation::{self, VentilationPolicy};
use crate::store::{DwellingStore, ForecastStore, RiskStore};
use crate::utils::{format_local_hm, local_day_bounds};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use core::fmt;
use log::{debug, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyNotice {
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub risk_pct: u32,
    pub level: RiskLevel,
    pub ventilation: Option<VentilationWindow>,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification not delivered: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Delivery channel for notices.
pub trait Notifier {
    fn send(&self, notice: &DailyNotice) -> Result<(), NotifyError>;
}

/// Writes notices to the log; the default channel.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notice: &DailyNotice) -> Result<(), NotifyError> {
        info!("Notice for user {}: {} | {}", notice.user_id, notice.title, notice.body.replace('\n', " | "));
        Ok(())
    }
}

pub fn compose(assessment: &RiskAssessment, window: Option<VentilationWindow>, tz: FixedOffset) -> DailyNotice {
    let risk_pct = assessment.score.round().clamp(0.0, 100.0) as u32;
    let title = format!("Today's mold outlook: {}", assessment.level.label());
    let ventilation_line = match &window {
        Some(w) => format!(
            "Best time to ventilate: {}-{} (avg humidity {}%).",
            format_local_hm(w.start, tz),
            format_local_hm(w.end, tz),
            w.avg_humidity.round()
        ),
        None => "No good ventilation window left today; keep windows closed.".to_string(),
    };
    let body = format!(
        "Mold risk today is {}% ({}).\n{}",
        risk_pct,
        assessment.level.label(),
        ventilation_line
    );
    DailyNotice {
        user_id: assessment.user_id,
        title,
        body,
        risk_pct,
        level: assessment.level,
        ventilation: window,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifyReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl NotifyReport {
    pub fn is_failure(&self) -> bool {
        self.sent == 0 && self.failed > 0
    }
}

fn notice_for<S: ForecastStore + RiskStore + ?Sized>(
    store: &mut S,
    user_id: i64,
    cell: Option<GridCell>,
    today: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
    policy: &VentilationPolicy,
) -> Result<Option<DailyNotice>, PipelineError> {
    let Some(assessment) = store.current(user_id)?.filter(|a| a.target_date == today) else {
        return Ok(None);
    };
    let window = match cell {
        Some(cell) => {
            let (from, to) = local_day_bounds(today, tz);
            let samples = store.samples_between(cell, from, to)?;
            ventilation::best_window(&samples, now, policy, tz)
        }
        None => None,
    };
    Ok(Some(compose(&assessment, window, tz)))
}

/// Send today's notice to every user holding an assessment for `today`.
pub fn run<S: ForecastStore + DwellingStore + RiskStore + ?Sized>(
    store: &mut S,
    notifier: &dyn Notifier,
    today: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
    policy: &VentilationPolicy,
) -> Result<NotifyReport, PipelineError> {
    let dwellings = store.dwellings()?;
    let mut report = NotifyReport::default();

    for d in &dwellings {
        let notice = match notice_for(store, d.user_id, d.cell, today, now, tz, policy) {
            Ok(Some(n)) => n,
            Ok(None) => {
                debug!("Notify: no assessment for user {} on {}", d.user_id, today);
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("Notify: user {} skipped: {}", d.user_id, e);
                report.failed += 1;
                continue;
            }
        };
        match notifier.send(&notice) {
            Ok(()) => report.sent += 1,
            Err(e) => {
                warn!("Notify: user {}: {}", d.user_id, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Notify: {} (users={}, sent={}, skipped={}, failed={})",
        today,
        dwellings.len(),
        report.sent,
        report.skipped,
        report.failed
    );
    Ok(report)
}
