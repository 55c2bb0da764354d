use crate::models::domain::GridCell;
use crate::risk::InputError;
use chrono::NaiveDate;
use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure of one unit of work (a grid cell, a user) inside a batch job.
///
/// None of these abort the surrounding batch; the job logs them and moves on.
#[derive(Debug)]
pub enum PipelineError {
    /// Network or upstream API failure; the unit is skipped this cycle.
    ExternalFetch(String),
    /// Non-finite or out-of-range model input; the sample is skipped.
    Input(InputError),
    /// Storage failure; the unit's transaction was rolled back.
    Persistence(String),
    /// Missing or unusable setup for the unit (e.g. no grid coordinates).
    Configuration(String),
    /// No usable forecast stored for the cell and day.
    NoForecast { cell: GridCell, date: NaiveDate },
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ExternalFetch(e) => write!(f, "external fetch failed: {}", e),
            PipelineError::Input(e) => write!(f, "input error: {}", e),
            PipelineError::Persistence(e) => write!(f, "persistence error: {}", e),
            PipelineError::Configuration(e) => write!(f, "configuration error: {}", e),
            PipelineError::NoForecast { cell, date } => {
                write!(f, "no usable forecast for cell {} on {}", cell, date)
            }
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Input(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InputError> for PipelineError {
    fn from(value: InputError) -> Self {
        PipelineError::Input(value)
    }
}

impl From<diesel::result::Error> for PipelineError {
    fn from(value: diesel::result::Error) -> Self {
        PipelineError::Persistence(value.to_string())
    }
}

impl PipelineError {
    /// Configuration problems are expected for half-registered users and are
    /// reported as skips rather than failures.
    pub fn is_skip(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}
