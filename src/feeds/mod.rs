//! Live-data feeds read through the cache engine
//!
//! Both feeds are routed as live data, so the last good copy stays
//! available offline and reports say when they are serving it.

pub mod seismic;
pub mod weather;

use serde::Serialize;

pub use seismic::{
    DEFAULT_RADIUS_KM, NEPAL_CENTER, Quake, SeismicFeed, SeismicReport, USGS_DAY_FEED, parse_feed,
};
pub use weather::{Forecast, WeatherAlert, WeatherConditions, WeatherFeed, WeatherReport};

/// Alert level shown next to a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}
