//! Wire types of the village forecast API (`getVilageFcst`).
//!
//! Only the fields the pipeline reads are modeled. The upstream service
//! answers errors with a header-only envelope, so `body` is optional.

use serde::{Deserialize, Serialize};

/// Result code the service returns for a successful call.
pub const RESULT_OK: &str = "00";

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub response: Response,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub header: Header,
    #[serde(default)]
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub result_code: String,
    #[serde(default)]
    pub result_msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default)]
    pub items: Option<Items>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Items {
    #[serde(default)]
    pub item: Vec<ForecastItem>,
}

/// Forecast element codes. Only the three the pipeline keeps are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Hourly temperature (°C).
    #[serde(rename = "TMP")]
    Temperature,
    /// Relative humidity (%).
    #[serde(rename = "REH")]
    Humidity,
    /// Precipitation probability (%).
    #[serde(rename = "POP")]
    RainProbability,
    #[serde(other)]
    Other,
}

/// One `(category, forecast date, forecast time, value)` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastItem {
    pub category: Category,
    /// `YYYYMMDD`
    pub fcst_date: String,
    /// `HHMM`
    pub fcst_time: String,
    /// Numeric for the categories we keep, free text for some others.
    pub fcst_value: String,
}

impl ForecastItem {
    pub fn new(
        category: Category,
        fcst_date: impl Into<String>,
        fcst_time: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ForecastItem {
            category,
            fcst_date: fcst_date.into(),
            fcst_time: fcst_time.into(),
            fcst_value: value.into(),
        }
    }
}
