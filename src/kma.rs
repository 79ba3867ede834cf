//! Korea Meteorological Administration short-term forecast API
//!
//! Two endpoints are combined into one snapshot: the ultra-short nowcast
//! (current temperature and rainfall) and the ultra-short forecast (sky
//! condition, precipitation type and hourly rainfall for the next hours).

use crate::error::FetchError;
use chrono::{Duration, NaiveDateTime, Timelike};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const KMA_BASE_URL: &str = "http://apis.data.go.kr/1360000/VilageFcstInfoService_2.0";

/// Forecast slots this far in the past still count as current
const CURRENT_SLOT_TOLERANCE: Duration = Duration::minutes(30);
/// Look-ahead for the rain summary
const RAIN_HORIZON: Duration = Duration::hours(6);
/// Nowcast data for HH:00 is published at about HH:40
const NOWCAST_PUBLISH_MINUTE: u32 = 45;

/// KMA forecast grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPoint {
    pub nx: i32,
    pub ny: i32,
}

/// Weather condition shown on the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Clear,
    MostlyCloudy,
    Overcast,
    Rain,
    RainSnow,
    Snow,
    Shower,
    Drizzle,
    DrizzleSnowFlurry,
    SnowFlurry,
    Unknown,
}

impl Condition {
    pub const ALL: [Condition; 11] = [
        Condition::Clear,
        Condition::MostlyCloudy,
        Condition::Overcast,
        Condition::Rain,
        Condition::RainSnow,
        Condition::Snow,
        Condition::Shower,
        Condition::Drizzle,
        Condition::DrizzleSnowFlurry,
        Condition::SnowFlurry,
        Condition::Unknown,
    ];

    /// From the forecast SKY and PTY codes; precipitation wins over sky
    pub fn from_codes(sky: Option<u8>, pty: Option<u8>) -> Self {
        match pty.unwrap_or(0) {
            0 => match sky {
                Some(0..=2) => Condition::Clear,
                Some(3) => Condition::MostlyCloudy,
                Some(_) => Condition::Overcast,
                None => Condition::Unknown,
            },
            1 => Condition::Rain,
            2 => Condition::RainSnow,
            3 => Condition::Snow,
            4 => Condition::Shower,
            5 => Condition::Drizzle,
            6 => Condition::DrizzleSnowFlurry,
            7 => Condition::SnowFlurry,
            _ => Condition::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Condition::Clear => "맑음",
            Condition::MostlyCloudy => "구름 많음",
            Condition::Overcast => "흐림",
            Condition::Rain => "비",
            Condition::RainSnow => "비 또는 눈",
            Condition::Snow => "눈",
            Condition::Shower => "소나기",
            Condition::Drizzle => "빗방울",
            Condition::DrizzleSnowFlurry => "빗방울눈날림",
            Condition::SnowFlurry => "눈날림",
            Condition::Unknown => "정보없음",
        }
    }

    /// Icon file name looked up in the icons directory
    pub fn icon_file(self) -> &'static str {
        match self {
            Condition::Clear => "clear.png",
            Condition::MostlyCloudy => "mostly_cloudy.png",
            Condition::Overcast => "overcast.png",
            Condition::Rain | Condition::Drizzle => "rain.png",
            Condition::RainSnow | Condition::DrizzleSnowFlurry => "rain_snow.png",
            Condition::Snow | Condition::SnowFlurry => "snow.png",
            Condition::Shower => "shower.png",
            Condition::Unknown => "unknown.png",
        }
    }
}

/// Short label for a precipitation type code
pub fn precipitation_label(code: u8) -> &'static str {
    match code {
        1 => "비",
        2 => "비/눈",
        3 => "눈",
        4 => "소나기",
        5 => "빗방울",
        6 => "빗방울눈날림",
        7 => "눈날림",
        _ => "",
    }
}

/// Heaviest rain expected within the look-ahead
#[derive(Debug, Clone, PartialEq)]
pub struct RainForecast {
    /// Hourly rainfall in mm
    pub amount_mm: f32,
    /// Start of the forecast hour, "HH:MM"
    pub start: String,
    /// End of the forecast hour, "HH:MM"
    pub end: String,
    /// PTY precipitation type code
    pub type_code: u8,
}

impl RainForecast {
    pub fn type_label(&self) -> &'static str {
        precipitation_label(self.type_code)
    }
}

/// Everything the widget shows about the weather
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    /// Current temperature in °C
    pub temperature: Option<f32>,
    pub condition: Condition,
    pub rain_forecast: Option<RainForecast>,
    /// Rainfall over the last hour in mm
    pub current_rain_mm: f32,
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
    items: Items,
}

#[derive(Debug, Deserialize)]
struct Items {
    #[serde(default)]
    item: Vec<Item>,
}

/// Shared shape of nowcast and forecast items
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    category: String,
    #[serde(default)]
    obsr_value: Option<Value>,
    #[serde(default)]
    fcst_date: Option<String>,
    #[serde(default)]
    fcst_time: Option<String>,
    #[serde(default)]
    fcst_value: Option<Value>,
}

/// Base date/time for the nowcast endpoint ("YYYYMMDD", "HH00")
pub fn nowcast_base(now: NaiveDateTime) -> (String, String) {
    let base = published_hour(now);
    (base.format("%Y%m%d").to_string(), base.format("%H00").to_string())
}

/// Base date/time for the forecast endpoint ("YYYYMMDD", "HH30")
pub fn forecast_base(now: NaiveDateTime) -> (String, String) {
    let base = published_hour(now);
    (base.format("%Y%m%d").to_string(), base.format("%H30").to_string())
}

fn published_hour(now: NaiveDateTime) -> NaiveDateTime {
    if now.minute() < NOWCAST_PUBLISH_MINUTE {
        now - Duration::hours(1)
    } else {
        now
    }
}

/// Fetch nowcast and forecast and merge them. Fails only when both fail.
pub async fn fetch_weather(
    client: &Client,
    base_url: &str,
    service_key: &str,
    grid: GridPoint,
    now: NaiveDateTime,
) -> Result<WeatherSnapshot, FetchError> {
    let (date, time) = nowcast_base(now);
    let nowcast = get_items(client, base_url, "getUltraSrtNcst", service_key, grid, &date, &time, 10).await;

    let (date, time) = forecast_base(now);
    let forecast = get_items(client, base_url, "getUltraSrtFcst", service_key, grid, &date, &time, 60).await;

    match (nowcast, forecast) {
        (Err(e), Err(_)) => Err(e),
        (nowcast, forecast) => {
            let nowcast = nowcast.unwrap_or_else(|e| {
                tracing::warn!("KMA nowcast unavailable, using forecast only: {}", e);
                Vec::new()
            });
            let forecast = forecast.unwrap_or_else(|e| {
                tracing::warn!("KMA forecast unavailable, using nowcast only: {}", e);
                Vec::new()
            });
            Ok(build_snapshot(&nowcast, &forecast, now))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn get_items(
    client: &Client,
    base_url: &str,
    operation: &str,
    service_key: &str,
    grid: GridPoint,
    base_date: &str,
    base_time: &str,
    rows: u32,
) -> Result<Vec<Item>, FetchError> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), operation);
    let rows = rows.to_string();
    let nx = grid.nx.to_string();
    let ny = grid.ny.to_string();
    let response = client
        .get(&url)
        .query(&[
            ("serviceKey", service_key),
            ("pageNo", "1"),
            ("numOfRows", rows.as_str()),
            ("dataType", "JSON"),
            ("base_date", base_date),
            ("base_time", base_time),
            ("nx", nx.as_str()),
            ("ny", ny.as_str()),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(FetchError::Status(response.status()));
    }

    let body = response.text().await?;
    parse_items(&body)
}

/// Parse a KMA JSON payload into its item list
pub fn parse_items(body: &str) -> Result<Vec<Item>, FetchError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| FetchError::Payload(format!("KMA response is not JSON: {}", e)))?;
    let response = envelope.response;

    if response.header.result_code != "00" {
        return Err(FetchError::Api {
            code: response.header.result_code,
            message: response.header.result_msg,
        });
    }

    Ok(response.body.map(|body| body.items.item).unwrap_or_default())
}

/// Merge nowcast and forecast items into one snapshot relative to `now`
pub fn build_snapshot(nowcast: &[Item], forecast: &[Item], now: NaiveDateTime) -> WeatherSnapshot {
    let mut temperature = None;
    let mut current_rain_mm = 0.0;

    for item in nowcast {
        let value = item.obsr_value.as_ref().map(value_text).unwrap_or_default();
        match item.category.as_str() {
            "T1H" => temperature = value.trim().parse::<f32>().ok(),
            "RN1" => current_rain_mm = parse_rain_amount(&value),
            _ => {}
        }
    }

    let slots = group_slots(forecast);
    let current = current_slot(&slots, now);

    let condition = match current {
        Some(values) => Condition::from_codes(code(values, "SKY"), code(values, "PTY")),
        None => Condition::Unknown,
    };

    if temperature.is_none() {
        temperature = current
            .and_then(|values| values.get("T1H"))
            .and_then(|v| v.trim().parse::<f32>().ok());
    }

    WeatherSnapshot {
        temperature,
        condition,
        rain_forecast: max_rain(&slots, now),
        current_rain_mm,
    }
}

type Slots = BTreeMap<NaiveDateTime, HashMap<String, String>>;

fn group_slots(forecast: &[Item]) -> Slots {
    let mut slots = Slots::new();
    for item in forecast {
        let (Some(date), Some(time)) = (&item.fcst_date, &item.fcst_time) else {
            continue;
        };
        let Ok(at) = NaiveDateTime::parse_from_str(&format!("{}{}", date, time), "%Y%m%d%H%M") else {
            continue;
        };
        let value = item.fcst_value.as_ref().map(value_text).unwrap_or_default();
        slots
            .entry(at)
            .or_default()
            .insert(item.category.clone(), value);
    }
    slots
}

/// Slot closest to `now` among those not older than the tolerance
fn current_slot(slots: &Slots, now: NaiveDateTime) -> Option<&HashMap<String, String>> {
    slots
        .range(now - CURRENT_SLOT_TOLERANCE..)
        .min_by_key(|(at, _)| (**at - now).num_seconds().abs())
        .map(|(_, values)| values)
}

fn max_rain(slots: &Slots, now: NaiveDateTime) -> Option<RainForecast> {
    let mut best: Option<RainForecast> = None;

    for (at, values) in slots.range(now..=now + RAIN_HORIZON) {
        let type_code = code(values, "PTY").unwrap_or(0);
        let amount = values.get("RN1").map(|v| parse_rain_amount(v)).unwrap_or(0.0);
        if type_code == 0 || amount <= 0.0 {
            continue;
        }
        if best.as_ref().is_some_and(|b| b.amount_mm >= amount) {
            continue;
        }
        best = Some(RainForecast {
            amount_mm: amount,
            start: at.format("%H:%M").to_string(),
            end: (*at + Duration::hours(1)).format("%H:%M").to_string(),
            type_code,
        });
    }

    best
}

fn code(values: &HashMap<String, String>, category: &str) -> Option<u8> {
    values.get(category).and_then(|v| v.trim().parse().ok())
}

/// KMA mixes numeric and string values depending on endpoint
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rain amounts come as "1.5", "1.0mm", "30.0~50.0mm", "강수없음" or "-".
/// The first number found wins; anything without one means no rain.
pub fn parse_rain_amount(value: &str) -> f32 {
    let start = value.find(|c: char| c.is_ascii_digit());
    let Some(start) = start else {
        return 0.0;
    };
    let number: String = value[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn fcst(time: &str, category: &str, value: &str) -> Item {
        Item {
            category: category.to_string(),
            obsr_value: None,
            fcst_date: Some("20240501".to_string()),
            fcst_time: Some(time.to_string()),
            fcst_value: Some(Value::String(value.to_string())),
        }
    }

    fn obsr(category: &str, value: Value) -> Item {
        Item {
            category: category.to_string(),
            obsr_value: Some(value),
            fcst_date: None,
            fcst_time: None,
            fcst_value: None,
        }
    }

    #[test]
    fn test_base_times() {
        assert_eq!(nowcast_base(at(10, 50)), ("20240501".into(), "1000".into()));
        assert_eq!(nowcast_base(at(10, 44)), ("20240501".into(), "0900".into()));
        assert_eq!(forecast_base(at(10, 44)), ("20240501".into(), "0930".into()));
        // Just after midnight the base rolls back to the previous day
        assert_eq!(nowcast_base(at(0, 10)), ("20240430".into(), "2300".into()));
    }

    #[test]
    fn test_parse_rain_amount() {
        assert_eq!(parse_rain_amount("강수없음"), 0.0);
        assert_eq!(parse_rain_amount("-"), 0.0);
        assert_eq!(parse_rain_amount("null"), 0.0);
        assert_eq!(parse_rain_amount("1.5"), 1.5);
        assert_eq!(parse_rain_amount("4.0mm"), 4.0);
        assert_eq!(parse_rain_amount("30.0~50.0mm"), 30.0);
    }

    #[test]
    fn test_condition_codes() {
        assert_eq!(Condition::from_codes(Some(1), Some(0)), Condition::Clear);
        assert_eq!(Condition::from_codes(Some(3), None), Condition::MostlyCloudy);
        assert_eq!(Condition::from_codes(Some(4), Some(0)), Condition::Overcast);
        assert_eq!(Condition::from_codes(Some(1), Some(4)), Condition::Shower);
        assert_eq!(Condition::from_codes(None, None), Condition::Unknown);
        assert_eq!(Condition::Shower.label(), "소나기");
    }

    #[test]
    fn test_build_snapshot() {
        let nowcast = vec![
            obsr("T1H", Value::String("21.7".into())),
            obsr("RN1", Value::String("0".into())),
            obsr("REH", Value::from(60)),
        ];
        let forecast = vec![
            // stale slot outside the tolerance
            fcst("0900", "SKY", "1"),
            fcst("0900", "PTY", "0"),
            fcst("1100", "SKY", "4"),
            fcst("1100", "PTY", "0"),
            fcst("1100", "RN1", "강수없음"),
            fcst("1300", "SKY", "4"),
            fcst("1300", "PTY", "1"),
            fcst("1300", "RN1", "2.0mm"),
            fcst("1400", "SKY", "4"),
            fcst("1400", "PTY", "4"),
            fcst("1400", "RN1", "5.0mm"),
            fcst("1500", "PTY", "1"),
            fcst("1500", "RN1", "1.0mm"),
        ];

        let snapshot = build_snapshot(&nowcast, &forecast, at(10, 40));

        assert_eq!(snapshot.temperature, Some(21.7));
        assert_eq!(snapshot.condition, Condition::Overcast);
        assert_eq!(snapshot.current_rain_mm, 0.0);

        let rain = snapshot.rain_forecast.unwrap();
        assert_eq!(rain.amount_mm, 5.0);
        assert_eq!(rain.start, "14:00");
        assert_eq!(rain.end, "15:00");
        assert_eq!(rain.type_label(), "소나기");
    }

    #[test]
    fn test_forecast_backfills_temperature() {
        let forecast = vec![fcst("1100", "T1H", "18"), fcst("1100", "SKY", "3")];

        let snapshot = build_snapshot(&[], &forecast, at(10, 50));

        assert_eq!(snapshot.temperature, Some(18.0));
        assert_eq!(snapshot.condition, Condition::MostlyCloudy);
        assert_eq!(snapshot.rain_forecast, None);
    }

    #[test]
    fn test_rain_beyond_horizon_is_ignored() {
        let forecast = vec![fcst("1800", "PTY", "1"), fcst("1800", "RN1", "3.0mm")];
        let snapshot = build_snapshot(&[], &forecast, at(10, 0));
        assert_eq!(snapshot.rain_forecast, None);
    }

    #[test]
    fn test_parse_items() {
        let body = r#"{"response": {
            "header": {"resultCode": "00", "resultMsg": "NORMAL_SERVICE"},
            "body": {"dataType": "JSON", "items": {"item": [
                {"baseDate": "20240501", "baseTime": "1000", "category": "T1H",
                 "nx": 61, "ny": 115, "obsrValue": "21.7"}
            ]}}
        }}"#;

        let items = parse_items(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "T1H");

        let error = r#"{"response": {"header": {"resultCode": "03", "resultMsg": "NO_DATA"}}}"#;
        assert!(matches!(parse_items(error), Err(FetchError::Api { .. })));
    }
}
