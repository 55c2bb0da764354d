//! Repository seams between the pipeline and its storage.
//!
//! The jobs only talk to these traits. `PgStore` is the production
//! implementation; tests use the in-memory store in [`memory`].

use crate::db::models::{
    Dwelling, ForecastSampleRow, NewForecastSample, NewRiskAssessment, NewRiskHistory, RiskAssessmentRow,
    RiskHistoryRow,
};
use crate::error::PipelineError;
use crate::models::domain::{DwellingLocation, DwellingProfile, ForecastSample, GridCell, RiskAssessment};
use crate::schema;
use crate::services::scheduler::Job;
use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool};
use log::warn;

/// Storage shape for risk assessments.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RiskRowMode {
    /// One row per user, overwritten by every run.
    Current,
    /// One row per user and target date; reruns for a date replace that date's row.
    History,
}

pub trait ForecastStore {
    /// Drop samples older than `cutoff`. Returns the number removed.
    fn purge_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, PipelineError>;

    /// Atomically delete the cell's samples at or after the batch's earliest
    /// timestamp and insert the batch.
    fn replace_range(&mut self, cell: GridCell, samples: &[ForecastSample]) -> Result<usize, PipelineError>;

    /// Samples of one cell with `from <= timestamp < to`, ordered by timestamp.
    fn samples_between(
        &mut self,
        cell: GridCell,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ForecastSample>, PipelineError>;

    /// Samples of all cells at or after `from`.
    fn count_since(&mut self, from: DateTime<Utc>) -> Result<i64, PipelineError>;
}

pub trait DwellingStore {
    fn dwellings(&mut self) -> Result<Vec<DwellingProfile>, PipelineError>;

    fn dwelling(&mut self, user_id: i64) -> Result<Option<DwellingProfile>, PipelineError>;

    /// Rewrites only the location columns.
    fn set_location(&mut self, user_id: i64, location: &DwellingLocation) -> Result<(), PipelineError>;
}

pub trait RiskStore {
    fn record(&mut self, assessment: &RiskAssessment) -> Result<(), PipelineError>;

    /// Latest assessment for the user, if any.
    fn current(&mut self, user_id: i64) -> Result<Option<RiskAssessment>, PipelineError>;
}

/// Cross-process guard so two triggers of the same job never overlap.
pub trait JobLock {
    fn try_acquire(&mut self, job: Job) -> Result<bool, PipelineError>;

    fn release(&mut self, job: Job) -> Result<(), PipelineError>;
}

fn check_batch_cell(cell: GridCell, samples: &[ForecastSample]) -> Result<(), PipelineError> {
    match samples.iter().find(|s| s.cell != cell) {
        Some(stray) => Err(PipelineError::Configuration(format!(
            "sample for cell {} in batch for cell {}",
            stray.cell, cell
        ))),
        None => Ok(()),
    }
}

pub struct PgStore {
    conn: PgConnection,
    risk_mode: RiskRowMode,
}

/// Namespace for this service's advisory lock keys.
const LOCK_NAMESPACE: i64 = 0x6d6f_6c64_0000;

#[derive(QueryableByName)]
struct LockResult {
    #[diesel(sql_type = Bool)]
    locked: bool,
}

impl PgStore {
    pub fn new(conn: PgConnection, risk_mode: RiskRowMode) -> Self {
        PgStore { conn, risk_mode }
    }

    fn lock_key(job: Job) -> i64 {
        LOCK_NAMESPACE + job as i64
    }
}

impl ForecastStore for PgStore {
    fn purge_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, PipelineError> {
        use schema::forecast_samples::dsl as F;

        diesel::delete(F::forecast_samples.filter(F::forecast_at.lt(cutoff)))
            .execute(&mut self.conn)
            .map_err(|e| PipelineError::Persistence(format!("purge forecast samples failed: {}", e)))
    }

    fn replace_range(&mut self, cell: GridCell, samples: &[ForecastSample]) -> Result<usize, PipelineError> {
        use schema::forecast_samples::dsl as F;

        check_batch_cell(cell, samples)?;
        let Some(from) = samples.iter().map(|s| s.timestamp).min() else {
            return Ok(0);
        };
        let rows: Vec<NewForecastSample> = samples.iter().map(NewForecastSample::from).collect();

        self.conn
            .transaction::<usize, diesel::result::Error, _>(|conn| {
                diesel::delete(
                    F::forecast_samples.filter(
                        F::grid_x
                            .eq(cell.x)
                            .and(F::grid_y.eq(cell.y))
                            .and(F::forecast_at.ge(from)),
                    ),
                )
                .execute(conn)?;
                diesel::insert_into(F::forecast_samples).values(&rows).execute(conn)
            })
            .map_err(|e| PipelineError::Persistence(format!("replace samples for cell {} failed: {}", cell, e)))
    }

    fn samples_between(
        &mut self,
        cell: GridCell,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ForecastSample>, PipelineError> {
        use schema::forecast_samples::dsl as F;

        let rows: Vec<ForecastSampleRow> = F::forecast_samples
            .filter(
                F::grid_x
                    .eq(cell.x)
                    .and(F::grid_y.eq(cell.y))
                    .and(F::forecast_at.ge(from))
                    .and(F::forecast_at.lt(to)),
            )
            .order(F::forecast_at.asc())
            .select(ForecastSampleRow::as_select())
            .load(&mut self.conn)
            .map_err(|e| PipelineError::Persistence(format!("load samples for cell {} failed: {}", cell, e)))?;
        Ok(rows.into_iter().map(ForecastSample::from).collect())
    }

    fn count_since(&mut self, from: DateTime<Utc>) -> Result<i64, PipelineError> {
        use schema::forecast_samples::dsl as F;

        F::forecast_samples
            .filter(F::forecast_at.ge(from))
            .count()
            .get_result(&mut self.conn)
            .map_err(|e| PipelineError::Persistence(format!("count forecast samples failed: {}", e)))
    }
}

impl DwellingStore for PgStore {
    fn dwellings(&mut self) -> Result<Vec<DwellingProfile>, PipelineError> {
        use schema::dwellings::dsl as D;

        let rows: Vec<Dwelling> = D::dwellings
            .order(D::user_id.asc())
            .select(Dwelling::as_select())
            .load(&mut self.conn)
            .map_err(|e| PipelineError::Persistence(format!("load dwellings failed: {}", e)))?;
        Ok(rows.into_iter().map(DwellingProfile::from).collect())
    }

    fn dwelling(&mut self, user_id: i64) -> Result<Option<DwellingProfile>, PipelineError> {
        use schema::dwellings::dsl as D;

        let row: Option<Dwelling> = D::dwellings
            .filter(D::user_id.eq(user_id))
            .select(Dwelling::as_select())
            .first(&mut self.conn)
            .optional()
            .map_err(|e| PipelineError::Persistence(format!("load dwelling {} failed: {}", user_id, e)))?;
        Ok(row.map(DwellingProfile::from))
    }

    fn set_location(&mut self, user_id: i64, location: &DwellingLocation) -> Result<(), PipelineError> {
        use schema::dwellings::dsl as D;

        let updated = diesel::update(D::dwellings.filter(D::user_id.eq(user_id)))
            .set((
                D::address.eq(Some(location.address.as_str())),
                D::canonical_address.eq(Some(location.canonical_address.as_str())),
                D::latitude.eq(Some(location.latitude)),
                D::longitude.eq(Some(location.longitude)),
                D::grid_x.eq(Some(location.cell.x)),
                D::grid_y.eq(Some(location.cell.y)),
                D::updated_at.eq(Utc::now()),
            ))
            .execute(&mut self.conn)
            .map_err(|e| PipelineError::Persistence(format!("update dwelling {} failed: {}", user_id, e)))?;
        if updated == 0 {
            return Err(PipelineError::Configuration(format!("no dwelling registered for user {}", user_id)));
        }
        Ok(())
    }
}

impl RiskStore for PgStore {
    fn record(&mut self, assessment: &RiskAssessment) -> Result<(), PipelineError> {
        let row = NewRiskAssessment::from(assessment);
        let user_id = row.user_id;

        match self.risk_mode {
            RiskRowMode::Current => {
                use schema::risk_assessments::dsl as R;

                diesel::insert_into(R::risk_assessments)
                    .values(&row)
                    .on_conflict(R::user_id)
                    .do_update()
                    .set(&row)
                    .execute(&mut self.conn)
                    .map_err(|e| {
                        PipelineError::Persistence(format!("upsert risk for user {} failed: {}", user_id, e))
                    })?;
            }
            RiskRowMode::History => {
                use schema::risk_history::dsl as H;

                let row = NewRiskHistory::from(row);
                self.conn
                    .transaction::<_, diesel::result::Error, _>(|conn| {
                        diesel::delete(
                            H::risk_history.filter(H::user_id.eq(row.user_id).and(H::target_date.eq(row.target_date))),
                        )
                        .execute(conn)?;
                        diesel::insert_into(H::risk_history).values(&row).execute(conn)
                    })
                    .map_err(|e| {
                        PipelineError::Persistence(format!("record risk history for user {} failed: {}", user_id, e))
                    })?;
            }
        }
        Ok(())
    }

    fn current(&mut self, user_id: i64) -> Result<Option<RiskAssessment>, PipelineError> {
        let row: Option<RiskAssessmentRow> = match self.risk_mode {
            RiskRowMode::Current => {
                use schema::risk_assessments::dsl as R;

                R::risk_assessments
                    .filter(R::user_id.eq(user_id))
                    .select(RiskAssessmentRow::as_select())
                    .first(&mut self.conn)
                    .optional()
            }
            RiskRowMode::History => {
                use schema::risk_history::dsl as H;

                H::risk_history
                    .filter(H::user_id.eq(user_id))
                    .order((H::target_date.desc(), H::computed_at.desc()))
                    .select(RiskHistoryRow::as_select())
                    .first(&mut self.conn)
                    .optional()
                    .map(|r| r.map(RiskAssessmentRow::from))
            }
        }
        .map_err(|e| PipelineError::Persistence(format!("load risk for user {} failed: {}", user_id, e)))?;

        Ok(row.and_then(|r| {
            let domain = r.into_domain();
            if domain.is_none() {
                warn!("Stored risk for user {} has unknown level or mode; ignoring", user_id);
            }
            domain
        }))
    }
}

impl JobLock for PgStore {
    fn try_acquire(&mut self, job: Job) -> Result<bool, PipelineError> {
        diesel::sql_query("SELECT pg_try_advisory_lock($1) AS locked")
            .bind::<BigInt, _>(Self::lock_key(job))
            .get_result::<LockResult>(&mut self.conn)
            .map(|r| r.locked)
            .map_err(|e| PipelineError::Persistence(format!("acquire {} lock failed: {}", job.name(), e)))
    }

    fn release(&mut self, job: Job) -> Result<(), PipelineError> {
        diesel::sql_query("SELECT pg_advisory_unlock($1) AS locked")
            .bind::<BigInt, _>(Self::lock_key(job))
            .get_result::<LockResult>(&mut self.conn)
            .map(|_| ())
            .map_err(|e| PipelineError::Persistence(format!("release {} lock failed: {}", job.name(), e)))
    }
}
