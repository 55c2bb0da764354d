//! Daily job triggers, job locking and the startup data check.

use crate::client::ForecastSource;
use crate::error::PipelineError;
use crate::models::domain::MonitoredCell;
use crate::services::aggregate::{self, AggregateReport};
use crate::services::ingest::{self, FetchCache, IngestReport};
use crate::services::notify::{self, Notifier, NotifyReport};
use crate::services::ventilation::VentilationPolicy;
use crate::store::{DwellingStore, ForecastStore, JobLock, RiskStore};
use crate::utils::{local_day_bounds, utc_to_local};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::{error, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Fewer samples than this per monitored cell since local midnight means the
/// day's data is missing.
pub const BOOTSTRAP_MIN_SAMPLES_PER_CELL: i64 = 20;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Job {
    Ingest,
    Risk,
    Notify,
}

impl Job {
    pub fn name(self) -> &'static str {
        match self {
            Job::Ingest => "ingest",
            Job::Risk => "risk",
            Job::Notify => "notify",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ingest" => Some(Job::Ingest),
            "risk" => Some(Job::Risk),
            "notify" => Some(Job::Notify),
            _ => None,
        }
    }
}

/// Everything a store must offer to run the whole pipeline.
pub trait Store: ForecastStore + DwellingStore + RiskStore + JobLock {}

impl<T: ForecastStore + DwellingStore + RiskStore + JobLock + ?Sized> Store for T {}

/// Collaborators and settings shared by all jobs.
pub struct JobContext<'a> {
    pub source: &'a dyn ForecastSource,
    pub notifier: &'a dyn Notifier,
    pub cells: &'a [MonitoredCell],
    pub tz: FixedOffset,
    pub ventilation: VentilationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobReport {
    Ingest(IngestReport),
    Risk(AggregateReport),
    Notify(NotifyReport),
}

impl JobReport {
    pub fn is_failure(&self) -> bool {
        match self {
            JobReport::Ingest(r) => r.is_failure(),
            JobReport::Risk(r) => r.is_failure(),
            JobReport::Notify(r) => r.is_failure(),
        }
    }
}

/// Run `f` only if this process wins the job's lock. `Ok(None)` means another
/// runner holds it.
pub fn with_job_lock<S: JobLock + ?Sized, T>(
    store: &mut S,
    job: Job,
    f: impl FnOnce(&mut S) -> T,
) -> Result<Option<T>, PipelineError> {
    if !store.try_acquire(job)? {
        info!("Job {} is already running elsewhere; skipping this trigger", job.name());
        return Ok(None);
    }
    let out = f(store);
    if let Err(e) = store.release(job) {
        warn!("Job {}: releasing lock failed: {}", job.name(), e);
    }
    Ok(Some(out))
}

/// Run one job now, under its lock.
pub fn run_job<S: Store + ?Sized>(
    store: &mut S,
    ctx: &JobContext,
    cache: &mut FetchCache,
    job: Job,
    now: DateTime<Utc>,
) -> Result<Option<JobReport>, PipelineError> {
    let local = utc_to_local(now, ctx.tz);
    let started = Instant::now();

    let report = with_job_lock(store, job, |store| -> Result<JobReport, PipelineError> {
        Ok(match job {
            Job::Ingest => JobReport::Ingest(ingest::run(store, ctx.source, cache, ctx.cells, local, ctx.tz)),
            Job::Risk => JobReport::Risk(aggregate::run(store, local.date(), ctx.tz, now)?),
            Job::Notify => JobReport::Notify(notify::run(
                store,
                ctx.notifier,
                local.date(),
                now,
                ctx.tz,
                &ctx.ventilation,
            )?),
        })
    })?
    .transpose()?;

    if let Some(r) = &report {
        if r.is_failure() {
            error!("Job {} failed: no unit of work succeeded", job.name());
        } else {
            info!("Job {} finished in {}ms", job.name(), started.elapsed().as_millis());
        }
    }
    Ok(report)
}

/// Whether today's samples are too sparse to serve users.
pub fn needs_bootstrap<S: ForecastStore + ?Sized>(
    store: &mut S,
    cells: &[MonitoredCell],
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Result<bool, PipelineError> {
    let (midnight, _) = local_day_bounds(utc_to_local(now, tz).date(), tz);
    let have = store.count_since(midnight)?;
    let want = BOOTSTRAP_MIN_SAMPLES_PER_CELL * cells.len() as i64;
    if have < want {
        warn!("Startup check: {} sample(s) for today, expected at least {}", have, want);
        Ok(true)
    } else {
        info!("Startup check: {} sample(s) for today; no bootstrap needed", have);
        Ok(false)
    }
}

/// Ingest and assess immediately when today's data is missing.
pub fn bootstrap<S: Store + ?Sized>(
    store: &mut S,
    ctx: &JobContext,
    cache: &mut FetchCache,
    now: DateTime<Utc>,
) -> Result<(), PipelineError> {
    if !needs_bootstrap(store, ctx.cells, now, ctx.tz)? {
        return Ok(());
    }
    run_job(store, ctx, cache, Job::Ingest, now)?;
    run_job(store, ctx, cache, Job::Risk, now)?;
    Ok(())
}

/// A job that fires once per local day at or after a wall-clock time.
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    pub job: Job,
    pub at: NaiveTime,
    last_run: Option<NaiveDate>,
}

impl DailyTrigger {
    /// A trigger whose time already passed today waits for tomorrow; missed
    /// data is the startup check's business.
    pub fn new(job: Job, at: NaiveTime, now_local: NaiveDateTime) -> Self {
        let last_run = (now_local.time() >= at).then(|| now_local.date());
        DailyTrigger { job, at, last_run }
    }

    pub fn is_due(&self, now_local: NaiveDateTime) -> bool {
        now_local.time() >= self.at && self.last_run != Some(now_local.date())
    }

    pub fn mark_run(&mut self, date: NaiveDate) {
        self.last_run = Some(date);
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub ingest_at: NaiveTime,
    pub risk_at: NaiveTime,
    pub notify_at: NaiveTime,
    pub tick: Duration,
}

impl Schedule {
    fn triggers(&self, now_local: NaiveDateTime) -> Vec<DailyTrigger> {
        let mut triggers = vec![
            DailyTrigger::new(Job::Ingest, self.ingest_at, now_local),
            DailyTrigger::new(Job::Risk, self.risk_at, now_local),
            DailyTrigger::new(Job::Notify, self.notify_at, now_local),
        ];
        triggers.sort_by_key(|t| t.at);
        triggers
    }
}

/// Serve the daily triggers forever on one worker.
pub fn run_loop<S: Store + ?Sized>(
    store: &mut S,
    ctx: &JobContext,
    schedule: &Schedule,
    bootstrap_enabled: bool,
) -> Result<(), String> {
    let mut cache = FetchCache::new();

    if bootstrap_enabled {
        bootstrap(store, ctx, &mut cache, Utc::now()).map_err(|e| format!("startup bootstrap failed: {}", e))?;
    }

    let mut triggers = schedule.triggers(utc_to_local(Utc::now(), ctx.tz));
    info!(
        "Scheduler: {} (tick={}s)",
        triggers
            .iter()
            .map(|t| format!("{}@{}", t.job.name(), t.at.format("%H:%M")))
            .collect::<Vec<_>>()
            .join(", "),
        schedule.tick.as_secs()
    );

    loop {
        let tick_start = Instant::now();
        let now = Utc::now();
        let local = utc_to_local(now, ctx.tz);

        for trigger in triggers.iter_mut() {
            if !trigger.is_due(local) {
                continue;
            }
            trigger.mark_run(local.date());
            if let Err(e) = run_job(store, ctx, &mut cache, trigger.job, now) {
                error!("Job {} aborted: {}", trigger.job.name(), e);
            }
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < schedule.tick {
            thread::sleep(schedule.tick - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregate::tests::{dwelling, kst, local, seoul};
    use crate::services::notify::LogNotifier;
    use crate::services::synthetic::SyntheticForecastSource;
    use crate::store::RiskRowMode;
    use crate::store::memory::MemoryStore;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn seoul_only() -> Vec<MonitoredCell> {
        vec![MonitoredCell {
            name: "Seoul".into(),
            cell: seoul(),
        }]
    }

    #[test]
    fn trigger_fires_once_per_day() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 30).unwrap();
        let mut t = DailyTrigger::new(Job::Risk, at(2, 30), day.and_time(at(1, 0)));
        assert!(!t.is_due(day.and_time(at(2, 29))));
        assert!(t.is_due(day.and_time(at(2, 30))));
        t.mark_run(day);
        assert!(!t.is_due(day.and_time(at(23, 0))));
        let next = day.succ_opt().unwrap();
        assert!(!t.is_due(next.and_time(at(1, 0))));
        assert!(t.is_due(next.and_time(at(3, 0))));
    }

    #[test]
    fn trigger_created_after_its_time_waits_for_tomorrow() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 30).unwrap();
        let t = DailyTrigger::new(Job::Notify, at(8, 0), day.and_time(at(10, 0)));
        assert!(!t.is_due(day.and_time(at(10, 1))));
        assert!(t.is_due(day.succ_opt().unwrap().and_time(at(8, 0))));
    }

    #[test]
    fn held_lock_skips_the_job() {
        let mut store = MemoryStore::new(RiskRowMode::Current);
        store.held_locks.insert(Job::Ingest);
        let mut called = false;
        let out = with_job_lock(&mut store, Job::Ingest, |_| called = true).unwrap();
        assert!(out.is_none());
        assert!(!called);

        let out = with_job_lock(&mut store, Job::Risk, |_| 42).unwrap();
        assert_eq!(out, Some(42));
        assert!(!store.held_locks.contains(&Job::Risk));
    }

    #[test]
    fn bootstrap_fills_an_empty_day_then_stays_quiet() {
        let mut store = MemoryStore::new(RiskRowMode::Current).with_dwelling(dwelling(1, Some(seoul())));
        let source = SyntheticForecastSource::new(3);
        let cells = seoul_only();
        let ctx = JobContext {
            source: &source,
            notifier: &LogNotifier,
            cells: &cells,
            tz: kst(),
            ventilation: VentilationPolicy::default(),
        };
        let mut cache = FetchCache::new();
        let now = local(30, 2) + chrono::Duration::minutes(10);

        assert!(needs_bootstrap(&mut store, &cells, now, kst()).unwrap());
        bootstrap(&mut store, &ctx, &mut cache, now).unwrap();
        assert!(!needs_bootstrap(&mut store, &cells, now, kst()).unwrap());
        assert!(store.current.contains_key(&1));
        assert!(store.held_locks.is_empty());
    }

    #[test]
    fn run_job_reports_per_job_outcome() {
        let mut store = MemoryStore::new(RiskRowMode::Current).with_dwelling(dwelling(1, None));
        let source = SyntheticForecastSource::new(3);
        let cells = seoul_only();
        let ctx = JobContext {
            source: &source,
            notifier: &LogNotifier,
            cells: &cells,
            tz: kst(),
            ventilation: VentilationPolicy::default(),
        };
        let mut cache = FetchCache::new();
        let now = local(30, 6);

        match run_job(&mut store, &ctx, &mut cache, Job::Ingest, now).unwrap() {
            Some(JobReport::Ingest(r)) => assert_eq!(r.updated, 1),
            other => panic!("unexpected: {:?}", other),
        }
        match run_job(&mut store, &ctx, &mut cache, Job::Risk, now).unwrap() {
            Some(JobReport::Risk(r)) => {
                assert_eq!(r.skipped, 1);
                assert!(!r.is_failure());
            }
            other => panic!("unexpected: {:?}", other),
        }

        store.held_locks.insert(Job::Notify);
        assert_eq!(run_job(&mut store, &ctx, &mut cache, Job::Notify, now).unwrap(), None);
    }

    #[test]
    fn job_names_parse_back() {
        for job in [Job::Ingest, Job::Risk, Job::Notify] {
            assert_eq!(Job::parse(job.name()), Some(job));
        }
        assert_eq!(Job::parse("backfill"), None);
    }
}
