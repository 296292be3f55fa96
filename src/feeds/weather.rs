//! OpenWeatherMap current conditions and 5-day forecast

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Severity;
use crate::cache::{CacheEngine, CacheRequest, Fetcher, ResponseSource};
use crate::config::WeatherConfig;
use crate::error::{Error, Result};
use crate::geo::Coordinates;

/// Condition codes treated as severe: thunderstorms, heavy rain, heavy snow,
/// and hazardous atmosphere (dust, ash, squalls, tornado)
const SEVERE_CONDITIONS: &[u32] = &[
    200, 201, 202, 210, 211, 212, 221, 230, 231, 232, 502, 503, 504, 522, 531, 602, 622, 731,
    751, 761, 762, 771, 781,
];

/// Volcanic ash and tornado
const DANGER_CONDITIONS: &[u32] = &[762, 781];

/// Strong breeze or higher, in m/s
const HIGH_WIND_MS: f64 = 10.8;

/// Heavy rain, in mm over the reporting window
const HEAVY_RAIN_MM: f64 = 7.6;

const COMPASS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Eight-point compass direction for a bearing in degrees
pub fn wind_direction(degrees: f64) -> &'static str {
    let index = (degrees.rem_euclid(360.0) / 45.0).round() as usize % COMPASS.len();
    COMPASS[index]
}

/// Whether a reading is severe, and how loudly to say so
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeatherAlert {
    pub severe: bool,
    pub level: Severity,
}

impl WeatherAlert {
    pub fn assess(condition_id: u32, wind_speed_ms: f64, rain_mm: f64) -> Self {
        let severe = SEVERE_CONDITIONS.contains(&condition_id)
            || wind_speed_ms >= HIGH_WIND_MS
            || rain_mm >= HEAVY_RAIN_MM;

        let level = if !severe {
            Severity::Info
        } else if DANGER_CONDITIONS.contains(&condition_id) {
            Severity::Danger
        } else {
            Severity::Warning
        };

        Self { severe, level }
    }
}

/// One weather reading, current or forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherConditions {
    pub observed_at: Option<DateTime<Utc>>,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity: Option<u8>,
    pub condition_id: u32,
    pub condition: String,
    pub description: String,
    pub icon_url: Option<String>,
    pub wind_speed_ms: f64,
    pub wind_direction: Option<&'static str>,
    pub rain_mm: f64,
    pub alert: WeatherAlert,
}

/// Current conditions and where they came from
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub location: Option<String>,
    pub conditions: WeatherConditions,
    pub source: ResponseSource,
}

/// Three-hourly forecast entries, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub city: Option<String>,
    pub entries: Vec<WeatherConditions>,
    pub source: ResponseSource,
}

impl Forecast {
    /// The first entry flagged severe, if any
    pub fn first_severe(&self) -> Option<&WeatherConditions> {
        self.entries.iter().find(|entry| entry.alert.severe)
    }
}

#[derive(Debug, Deserialize)]
struct Reading {
    dt: Option<i64>,
    main: MainBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    wind: WindBlock,
    #[serde(default)]
    rain: Option<RainBlock>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    feels_like: f64,
    humidity: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    id: u32,
    main: String,
    description: String,
    icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WindBlock {
    #[serde(default)]
    speed: f64,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RainBlock {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastBody {
    #[serde(default)]
    list: Vec<Reading>,
    city: Option<CityBlock>,
}

#[derive(Debug, Deserialize)]
struct CityBlock {
    name: Option<String>,
}

impl Reading {
    fn into_conditions(self) -> Result<WeatherConditions> {
        let condition = self.weather.into_iter().next().ok_or_else(|| {
            crate::error::ApiError::InvalidResponse("weather reading without conditions".into())
        })?;
        let rain_mm = self
            .rain
            .and_then(|rain| rain.one_hour.or(rain.three_hours))
            .unwrap_or(0.0);

        Ok(WeatherConditions {
            observed_at: self.dt.and_then(|dt| DateTime::from_timestamp(dt, 0)),
            temperature_c: self.main.temp,
            feels_like_c: self.main.feels_like,
            humidity: self.main.humidity,
            alert: WeatherAlert::assess(condition.id, self.wind.speed, rain_mm),
            condition_id: condition.id,
            condition: condition.main,
            description: condition.description,
            icon_url: condition
                .icon
                .map(|icon| format!("https://openweathermap.org/img/wn/{}@2x.png", icon)),
            wind_speed_ms: self.wind.speed,
            wind_direction: self.wind.deg.map(wind_direction),
            rain_mm,
        })
    }
}

/// Parse a current-weather body into the location name and its conditions
pub fn parse_current(body: &[u8]) -> Result<(Option<String>, WeatherConditions)> {
    let mut reading: Reading = serde_json::from_slice(body)?;
    let location = reading.name.take();
    Ok((location, reading.into_conditions()?))
}

/// Parse a forecast body; entries without conditions are skipped
pub fn parse_forecast(body: &[u8]) -> Result<(Option<String>, Vec<WeatherConditions>)> {
    let forecast: ForecastBody = serde_json::from_slice(body)?;
    let mut entries: Vec<WeatherConditions> = forecast
        .list
        .into_iter()
        .filter_map(|reading| reading.into_conditions().ok())
        .collect();
    entries.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));
    Ok((forecast.city.and_then(|c| c.name), entries))
}

pub struct WeatherFeed<F: Fetcher + 'static> {
    engine: Arc<CacheEngine<F>>,
    config: WeatherConfig,
}

impl<F: Fetcher + 'static> WeatherFeed<F> {
    /// Fails with `MissingApiKey` when no key is configured
    pub fn new(engine: Arc<CacheEngine<F>>, config: WeatherConfig) -> Result<Self> {
        config.api_key()?;
        Ok(Self { engine, config })
    }

    /// URL of the current-weather request for `at`
    pub fn current_url(&self, at: Coordinates) -> Result<Url> {
        self.endpoint("weather", at)
    }

    /// URL of the forecast request for `at`
    pub fn forecast_url(&self, at: Coordinates) -> Result<Url> {
        self.endpoint("forecast", at)
    }

    fn endpoint(&self, path: &str, at: Coordinates) -> Result<Url> {
        let base = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        Url::parse_with_params(
            &base,
            &[
                ("lat", at.lat.to_string()),
                ("lon", at.lon.to_string()),
                ("units", "metric".to_string()),
                ("appid", self.config.api_key()?.to_string()),
            ],
        )
        .map_err(|e| Error::InvalidUrl {
            url: base.clone(),
            reason: e.to_string(),
        })
    }

    /// Current conditions at `at`, from the network or the last cached copy
    pub async fn current(&self, at: Coordinates) -> Result<WeatherReport> {
        let url = self.current_url(at)?;
        let response = self.engine.handle(&CacheRequest::get(url.as_str())).await?;
        let (location, conditions) = parse_current(&response.body)?;
        if conditions.alert.severe {
            log::info!(
                "Severe weather at {}: {}",
                location.as_deref().unwrap_or("current location"),
                conditions.description
            );
        }
        Ok(WeatherReport {
            location,
            conditions,
            source: response.source,
        })
    }

    /// Five-day forecast at `at`, from the network or the last cached copy
    pub async fn forecast(&self, at: Coordinates) -> Result<Forecast> {
        let url = self.forecast_url(at)?;
        let response = self.engine.handle(&CacheRequest::get(url.as_str())).await?;
        let (city, entries) = parse_forecast(&response.body)?;
        log::debug!("{} forecast entries ({:?})", entries.len(), response.source);
        Ok(Forecast {
            city,
            entries,
            source: response.source,
        })
    }
}
