//! Address geocoding (local search API, `KakaoAK` auth).

use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://dapi.kakao.com/v2/local/search/address.json";

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    pub latitude: f64,
    pub longitude: f64,
    /// Road address when the service knows one, lot-number address otherwise.
    pub canonical_address: String,
}

#[derive(Debug)]
pub enum GeocodeError {
    Transport(String),
    Http { status: u16, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
    NotFound(String),
    BadCoordinate(String),
}

impl core::fmt::Display for GeocodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GeocodeError::Transport(s) => write!(f, "transport error: {}", s),
            GeocodeError::Http { status, message } => write!(f, "http {}: {}", status, message),
            GeocodeError::Json(e) => write!(f, "json error at {}: {}", e.path(), e.inner()),
            GeocodeError::NotFound(a) => write!(f, "no match for address {:?}", a),
            GeocodeError::BadCoordinate(v) => write!(f, "unparsable coordinate {:?}", v),
        }
    }
}

impl std::error::Error for GeocodeError {}

pub trait Geocoder {
    fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    address_name: String,
    /// Longitude, as a decimal string.
    x: String,
    /// Latitude, as a decimal string.
    y: String,
    #[serde(default)]
    road_address: Option<RoadAddress>,
}

#[derive(Debug, Deserialize)]
struct RoadAddress {
    address_name: String,
}

pub struct GeocodeClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl GeocodeClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        GeocodeClient {
            agent: config.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl Geocoder for GeocodeClient {
    fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
        let mut res = self
            .agent
            .get(&self.base_url)
            .header("Authorization", &format!("KakaoAK {}", self.api_key))
            .query("query", address)
            .call()
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res.body_mut().read_to_string();
        if status != http::StatusCode::OK {
            return Err(GeocodeError::Http {
                status: status.as_u16(),
                message: body.unwrap_or_else(|_| String::from("<no body>")),
            });
        }
        let body = body.map_err(|e| GeocodeError::Transport(e.to_string()))?;
        parse_first_match(address, &body)
    }
}

/// `f64::from_str` also accepts `NaN` and `inf`; neither is a place.
fn parse_coordinate(raw: &str) -> Result<f64, GeocodeError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| GeocodeError::BadCoordinate(raw.to_string()))
}

fn parse_first_match(address: &str, body: &str) -> Result<GeocodedAddress, GeocodeError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    let parsed: SearchResponse = serde_path_to_error::deserialize(de).map_err(GeocodeError::Json)?;
    let doc = parsed
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::NotFound(address.to_string()))?;

    let longitude = parse_coordinate(&doc.x)?;
    let latitude = parse_coordinate(&doc.y)?;
    let canonical_address = doc.road_address.map(|r| r.address_name).unwrap_or(doc.address_name);

    Ok(GeocodedAddress {
        latitude,
        longitude,
        canonical_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_road_address_as_canonical_name() {
        let body = r#"{"documents":[{"address_name":"서울 중구 태평로1가 31",
            "x":"126.978652258309","y":"37.566826004661",
            "road_address":{"address_name":"서울 중구 세종대로 110"}}]}"#;
        let g = parse_first_match("seoul city hall", body).unwrap();
        assert_eq!(g.canonical_address, "서울 중구 세종대로 110");
        assert!((g.latitude - 37.5668).abs() < 1e-3);
        assert!((g.longitude - 126.9786).abs() < 1e-3);
    }

    #[test]
    fn falls_back_to_lot_address() {
        let body = r#"{"documents":[
            {"address_name":"제주 제주시 이도이동 1","x":"126.53","y":"33.50","road_address":null}]}"#;
        assert_eq!(parse_first_match("jeju", body).unwrap().canonical_address, "제주 제주시 이도이동 1");
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        for (x, y) in [("NaN", "37.5"), ("126.9", "inf"), ("-infinity", "NaN"), ("", "37.5")] {
            let body = format!(r#"{{"documents":[{{"address_name":"somewhere","x":"{}","y":"{}"}}]}}"#, x, y);
            match parse_first_match("somewhere", &body) {
                Err(GeocodeError::BadCoordinate(_)) => {}
                other => panic!("x={:?} y={:?}: unexpected {:?}", x, y, other),
            }
        }
    }

    #[test]
    fn empty_result_is_not_found() {
        match parse_first_match("nowhere", r#"{"documents":[]}"#) {
            Err(GeocodeError::NotFound(a)) => assert_eq!(a, "nowhere"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
