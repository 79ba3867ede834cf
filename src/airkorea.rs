//! AirKorea real-time fine dust API
//!
//! https://www.data.go.kr/data/15073861/openapi.do

use crate::error::FetchError;
use image::Rgba;
use reqwest::Client;
use serde::Deserialize;

pub const AIRKOREA_URL: &str =
    "http://apis.data.go.kr/B552584/ArpltnInforInqireSvc/getMsrstnAcctoRltmMesureDnsty";

/// Latest PM readings for a measuring station
#[derive(Debug, Clone, PartialEq)]
pub struct DustSnapshot {
    /// PM10 in µg/m³
    pub pm10: u32,
    /// PM2.5 in µg/m³
    pub pm25: u32,
    /// Measurement time as reported, e.g. "2024-05-01 13:00"
    pub observed_at: String,
}

impl DustSnapshot {
    /// Overall grade: the worse of the PM10 and PM2.5 grades
    pub fn grade(&self) -> DustGrade {
        DustGrade::from_pm10(self.pm10).max(DustGrade::from_pm25(self.pm25))
    }
}

/// Korean four-step air quality grade, ordered best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DustGrade {
    Good,
    Moderate,
    Bad,
    VeryBad,
}

impl DustGrade {
    pub fn from_pm10(value: u32) -> Self {
        match value {
            0..=30 => DustGrade::Good,
            31..=80 => DustGrade::Moderate,
            81..=150 => DustGrade::Bad,
            _ => DustGrade::VeryBad,
        }
    }

    pub fn from_pm25(value: u32) -> Self {
        match value {
            0..=15 => DustGrade::Good,
            16..=35 => DustGrade::Moderate,
            36..=75 => DustGrade::Bad,
            _ => DustGrade::VeryBad,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DustGrade::Good => "좋음",
            DustGrade::Moderate => "보통",
            DustGrade::Bad => "나쁨",
            DustGrade::VeryBad => "매우나쁨",
        }
    }

    /// Indicator dot color
    pub fn color(self) -> Rgba<u8> {
        match self {
            DustGrade::Good => Rgba([0, 0, 255, 255]),
            DustGrade::Moderate => Rgba([0, 128, 0, 255]),
            DustGrade::Bad => Rgba([255, 165, 0, 255]),
            DustGrade::VeryBad => Rgba([255, 0, 0, 255]),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    response: Response,
}

#[derive(Debug, Deserialize)]
struct Response {
    header: Header,
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    result_code: String,
    #[serde(default)]
    result_msg: String,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    items: Vec<Measurement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Measurement {
    pm10_value: Option<String>,
    pm25_value: Option<String>,
    #[serde(default)]
    data_time: Option<String>,
}

/// Hourly rows requested; the newest complete one wins
const RECENT_ROWS: &str = "6";

/// Fetch the latest measurement for `station`
pub async fn fetch_dust(
    client: &Client,
    url: &str,
    service_key: &str,
    station: &str,
) -> Result<DustSnapshot, FetchError> {
    let response = client
        .get(url)
        .query(&[
            ("serviceKey", service_key),
            ("returnType", "json"),
            ("numOfRows", RECENT_ROWS),
            ("pageNo", "1"),
            ("stationName", station),
            ("dataTerm", "DAILY"),
            ("ver", "1.3"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(FetchError::Status(response.status()));
    }

    let body = response.text().await?;
    parse_dust(&body)
}

/// Parse an AirKorea JSON payload into a snapshot
pub fn parse_dust(body: &str) -> Result<DustSnapshot, FetchError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| FetchError::Payload(format!("AirKorea response is not JSON: {}", e)))?;
    let response = envelope.response;

    if response.header.result_code != "00" {
        return Err(FetchError::Api {
            code: response.header.result_code,
            message: response.header.result_msg,
        });
    }

    // rows come newest first; an offline instrument leaves "-" in a row
    let mut first_error = None;
    for item in response.body.map(|body| body.items).unwrap_or_default() {
        match snapshot_from(item) {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => {
                tracing::debug!("Skipping incomplete AirKorea row: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error
        .unwrap_or_else(|| FetchError::Payload("AirKorea returned no measurements".to_string())))
}

fn snapshot_from(item: Measurement) -> Result<DustSnapshot, FetchError> {
    Ok(DustSnapshot {
        pm10: parse_reading("pm10Value", item.pm10_value.as_deref())?,
        pm25: parse_reading("pm25Value", item.pm25_value.as_deref())?,
        observed_at: item.data_time.unwrap_or_default(),
    })
}

/// Stations report "-" while an instrument is offline
fn parse_reading(field: &str, value: Option<&str>) -> Result<u32, FetchError> {
    let value = value.unwrap_or("-").trim();
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u32)
        .ok_or_else(|| FetchError::Payload(format!("{} unavailable: {:?}", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_is_worst_of_both() {
        let snapshot = DustSnapshot {
            pm10: 20,
            pm25: 40,
            observed_at: String::new(),
        };
        assert_eq!(snapshot.grade(), DustGrade::Bad);
        assert_eq!(snapshot.grade().label(), "나쁨");
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(DustGrade::from_pm10(30), DustGrade::Good);
        assert_eq!(DustGrade::from_pm10(31), DustGrade::Moderate);
        assert_eq!(DustGrade::from_pm10(150), DustGrade::Bad);
        assert_eq!(DustGrade::from_pm10(151), DustGrade::VeryBad);
        assert_eq!(DustGrade::from_pm25(15), DustGrade::Good);
        assert_eq!(DustGrade::from_pm25(35), DustGrade::Moderate);
        assert_eq!(DustGrade::from_pm25(75), DustGrade::Bad);
        assert_eq!(DustGrade::from_pm25(76), DustGrade::VeryBad);
    }

    #[test]
    fn test_parse_measurement() {
        let body = r#"{"response": {
            "header": {"resultCode": "00", "resultMsg": "NORMAL_CODE"},
            "body": {"totalCount": 24, "items": [
                {"pm10Value": "42", "pm25Value": "18", "dataTime": "2024-05-01 13:00"}
            ]}
        }}"#;

        let snapshot = parse_dust(body).unwrap();
        assert_eq!(snapshot.pm10, 42);
        assert_eq!(snapshot.pm25, 18);
        assert_eq!(snapshot.observed_at, "2024-05-01 13:00");
        assert_eq!(snapshot.grade(), DustGrade::Moderate);
    }

    #[test]
    fn test_offline_latest_row_uses_previous_hour() {
        let body = r#"{"response": {
            "header": {"resultCode": "00", "resultMsg": "NORMAL_CODE"},
            "body": {"items": [
                {"pm10Value": "-", "pm25Value": "11", "dataTime": "2024-05-01 14:00"},
                {"pm10Value": "55", "pm25Value": "12", "dataTime": "2024-05-01 13:00"},
                {"pm10Value": "60", "pm25Value": "14", "dataTime": "2024-05-01 12:00"}
            ]}
        }}"#;

        let snapshot = parse_dust(body).unwrap();
        assert_eq!((snapshot.pm10, snapshot.pm25), (55, 12));
        assert_eq!(snapshot.observed_at, "2024-05-01 13:00");
    }

    #[test]
    fn test_offline_instrument_is_an_error() {
        let body = r#"{"response": {
            "header": {"resultCode": "00", "resultMsg": "NORMAL_CODE"},
            "body": {"items": [{"pm10Value": "-", "pm25Value": "11"}]}
        }}"#;

        assert!(matches!(parse_dust(body), Err(FetchError::Payload(_))));
    }

    #[test]
    fn test_api_error_code() {
        let body = r#"{"response": {"header": {"resultCode": "30", "resultMsg": "SERVICE KEY IS NOT REGISTERED"}}}"#;

        match parse_dust(body) {
            Err(FetchError::Api { code, .. }) => assert_eq!(code, "30"),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_xml_error_page_is_payload_error() {
        let body = "<OpenAPI_ServiceResponse><cmmMsgHeader/></OpenAPI_ServiceResponse>";
        assert!(matches!(parse_dust(body), Err(FetchError::Payload(_))));
    }
}
