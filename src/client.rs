//! Blocking HTTP client for the village forecast API.
//!
//! - Uses `ureq` with a short global timeout; a slow upstream means "no data
//!   for this cell this cycle", never a stalled job.
//! - Decodes with `serde_path_to_error` so malformed payloads name the
//!   offending field in logs.

use crate::models::domain::GridCell;
use crate::models::kma::{Envelope, ForecastItem, RESULT_OK};
use chrono::NaiveDateTime;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://apis.data.go.kr/1360000/VilageFcstInfoService_2.0/getVilageFcst";
/// One bulletin for one cell is well under this many rows.
const PAGE_ROWS: &str = "1000";

#[derive(Debug)]
pub enum ForecastClientError {
    Transport(String),
    Http { status: u16, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
    Api { code: String, message: String },
}

impl core::fmt::Display for ForecastClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ForecastClientError::Transport(s) => write!(f, "transport error: {}", s),
            ForecastClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            ForecastClientError::Json(e) => write!(f, "json error at {}: {}", e.path(), e.inner()),
            ForecastClientError::Api { code, message } => write!(f, "api result {}: {}", code, message),
        }
    }
}

impl std::error::Error for ForecastClientError {}

impl From<serde_path_to_error::Error<serde_json::Error>> for ForecastClientError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        ForecastClientError::Json(value)
    }
}

/// Anything that can hand back the raw items of one bulletin for one cell.
pub trait ForecastSource {
    /// `issue` is the bulletin's base time on the source's local clock.
    fn fetch(&self, cell: GridCell, issue: NaiveDateTime) -> Result<Vec<ForecastItem>, ForecastClientError>;
}

pub struct ForecastClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl ForecastClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        ForecastClient {
            agent: config.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn get_body(&self, cell: GridCell, issue: NaiveDateTime) -> Result<String, ForecastClientError> {
        let base_date = issue.format("%Y%m%d").to_string();
        let base_time = issue.format("%H%M").to_string();

        let mut res = self
            .agent
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query("serviceKey", &self.api_key)
            .query("pageNo", "1")
            .query("numOfRows", PAGE_ROWS)
            .query("dataType", "JSON")
            .query("base_date", &base_date)
            .query("base_time", &base_time)
            .query("nx", cell.x.to_string())
            .query("ny", cell.y.to_string())
            .call()
            .map_err(|e| ForecastClientError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res.body_mut().read_to_string();
        if status != http::StatusCode::OK {
            let message = body.unwrap_or_else(|_| String::from("<no body>"));
            return Err(ForecastClientError::Http {
                status: status.as_u16(),
                message,
            });
        }
        body.map_err(|e| ForecastClientError::Transport(e.to_string()))
    }
}

/// Decode a response body and unwrap the result-code envelope.
pub fn parse_items(body: &str) -> Result<Vec<ForecastItem>, ForecastClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    let envelope: Envelope = serde_path_to_error::deserialize(de)?;
    let header = envelope.response.header;
    if header.result_code != RESULT_OK {
        return Err(ForecastClientError::Api {
            code: header.result_code,
            message: header.result_msg.unwrap_or_default(),
        });
    }
    Ok(envelope
        .response
        .body
        .and_then(|b| b.items)
        .map(|items| items.item)
        .unwrap_or_default())
}

impl ForecastSource for ForecastClient {
    fn fetch(&self, cell: GridCell, issue: NaiveDateTime) -> Result<Vec<ForecastItem>, ForecastClientError> {
        let body = self.get_body(cell, issue)?;
        parse_items(&body)
    }
}
