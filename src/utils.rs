use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Round to one decimal place, the precision we persist readings at.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Interpret a wall-clock time in the forecast source's zone as UTC.
pub fn local_to_utc(local: NaiveDateTime, tz: FixedOffset) -> DateTime<Utc> {
    (local - Duration::seconds(i64::from(tz.local_minus_utc()))).and_utc()
}

pub fn utc_to_local(ts: DateTime<Utc>, tz: FixedOffset) -> NaiveDateTime {
    ts.with_timezone(&tz).naive_local()
}

/// `[start, end)` of a local calendar day, in UTC.
pub fn local_day_bounds(date: NaiveDate, tz: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_to_utc(date.and_time(NaiveTime::MIN), tz);
    (start, start + Duration::days(1))
}

/// `HH:MM` in the forecast source's zone.
pub fn format_local_hm(ts: DateTime<Utc>, tz: FixedOffset) -> String {
    utc_to_local(ts, tz).format("%H:%M").to_string()
}

/// Serialize a serde-backed enum into its string name (e.g. SCREAMING_SNAKE_CASE).
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// Inverse of [`serde_enum_name`].
pub fn parse_serde_enum<T: DeserializeOwned>(name: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
}
