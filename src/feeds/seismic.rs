//! USGS seismic feed, read through the cache engine
//!
//! The feed URL is routed as live data, so the last good copy keeps the
//! quake list available offline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Severity;
use crate::cache::{CacheEngine, CacheRequest, Fetcher, ResponseSource};
use crate::error::Result;
use crate::geo::Coordinates;

pub const USGS_DAY_FEED: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/2.5_day.geojson";

/// Approximate geographic centre of Nepal
pub const NEPAL_CENTER: Coordinates = Coordinates {
    lat: 28.3949,
    lon: 84.124,
};

pub const DEFAULT_RADIUS_KM: f64 = 500.0;

impl Severity {
    pub fn from_magnitude(magnitude: f64) -> Self {
        if magnitude >= 6.0 {
            Severity::Danger
        } else if magnitude >= 4.5 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quake {
    pub magnitude: f64,
    pub place: String,
    pub time: Option<DateTime<Utc>>,
    pub depth_km: Option<f64>,
    pub url: Option<String>,
    pub location: Coordinates,
    pub distance_km: f64,
    pub severity: Severity,
}

/// Quakes near Nepal and where the data came from
#[derive(Debug, Clone, PartialEq)]
pub struct SeismicReport {
    pub quakes: Vec<Quake>,
    pub source: ResponseSource,
}

impl SeismicReport {
    /// True when the list came from the cached copy rather than the network
    pub fn is_stale(&self) -> bool {
        self.source != ResponseSource::Network
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    mag: Option<f64>,
    place: Option<String>,
    time: Option<i64>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lon, lat, depth]`
    coordinates: Vec<f64>,
}

/// Parse a GeoJSON summary and keep quakes within `radius_km` of `center`,
/// newest first. Features without a magnitude or position are skipped.
pub fn parse_feed(body: &[u8], center: Coordinates, radius_km: f64) -> Result<Vec<Quake>> {
    let collection: FeatureCollection = serde_json::from_slice(body)?;

    let mut quakes: Vec<Quake> = collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let magnitude = feature.properties.mag?;
            let coords = feature.geometry?.coordinates;
            let (lon, lat) = (*coords.first()?, *coords.get(1)?);
            let location = Coordinates::new(lat, lon);
            let distance_km = center.distance_to(&location) / 1000.0;
            if distance_km > radius_km {
                return None;
            }

            Some(Quake {
                magnitude,
                place: feature
                    .properties
                    .place
                    .unwrap_or_else(|| "Unknown location".to_string()),
                time: feature
                    .properties
                    .time
                    .and_then(DateTime::from_timestamp_millis),
                depth_km: coords.get(2).copied(),
                url: feature.properties.url,
                location,
                distance_km,
                severity: Severity::from_magnitude(magnitude),
            })
        })
        .collect();

    quakes.sort_by(|a, b| b.time.cmp(&a.time));
    Ok(quakes)
}

pub struct SeismicFeed<F: Fetcher + 'static> {
    engine: Arc<CacheEngine<F>>,
    url: String,
    center: Coordinates,
    radius_km: f64,
}

impl<F: Fetcher + 'static> SeismicFeed<F> {
    pub fn new(engine: Arc<CacheEngine<F>>) -> Self {
        Self {
            engine,
            url: USGS_DAY_FEED.to_string(),
            center: NEPAL_CENTER,
            radius_km: DEFAULT_RADIUS_KM,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    /// Recent quakes near Nepal, from the network or the last cached copy
    pub async fn recent(&self) -> Result<SeismicReport> {
        let response = self.engine.handle(&CacheRequest::get(&self.url)).await?;
        let quakes = parse_feed(&response.body, self.center, self.radius_km)?;
        log::debug!(
            "{} quakes within {} km ({:?})",
            quakes.len(),
            self.radius_km,
            response.source
        );
        Ok(SeismicReport {
            quakes,
            source: response.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchedResponse;
    use crate::cache::mock::MockFetcher;
    use crate::config::CacheConfig;
    use crate::connectivity::ConnectivityState;
    use crate::error::Error;
    use crate::store::MemoryStore;

    const FEED: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"mag": 4.7, "place": "12 km NE of Gorkha, Nepal", "time": 1700000000000, "url": "https://earthquake.usgs.gov/eq/1"},
                "geometry": {"type": "Point", "coordinates": [84.7, 28.1, 10.0]}
            },
            {
                "type": "Feature",
                "properties": {"mag": 6.3, "place": "Western Nepal", "time": 1700000500000, "url": null},
                "geometry": {"type": "Point", "coordinates": [82.2, 28.8, 15.5]}
            },
            {
                "type": "Feature",
                "properties": {"mag": 5.1, "place": "Off the coast of Japan", "time": 1700000600000},
                "geometry": {"type": "Point", "coordinates": [142.3, 38.3, 30.0]}
            },
            {
                "type": "Feature",
                "properties": {"mag": null, "place": "Unreviewed"},
                "geometry": {"type": "Point", "coordinates": [84.1, 28.3, 5.0]}
            }
        ]
    }"#;

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::from_magnitude(6.0), Severity::Danger);
        assert_eq!(Severity::from_magnitude(5.99), Severity::Warning);
        assert_eq!(Severity::from_magnitude(4.5), Severity::Warning);
        assert_eq!(Severity::from_magnitude(4.49), Severity::Info);
    }

    #[test]
    fn test_parse_filters_by_distance() {
        let quakes = parse_feed(FEED.as_bytes(), NEPAL_CENTER, DEFAULT_RADIUS_KM).unwrap();

        assert_eq!(quakes.len(), 2);
        // Newest first
        assert_eq!(quakes[0].place, "Western Nepal");
        assert_eq!(quakes[0].severity, Severity::Danger);
        assert_eq!(quakes[0].depth_km, Some(15.5));
        assert_eq!(quakes[1].severity, Severity::Warning);
        assert_eq!(quakes[1].url.as_deref(), Some("https://earthquake.usgs.gov/eq/1"));
        assert!(quakes.iter().all(|q| q.distance_km <= DEFAULT_RADIUS_KM));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = parse_feed(b"<html>", NEPAL_CENTER, DEFAULT_RADIUS_KM);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_recent_serves_cached_copy_when_feed_fails() {
        let fetcher = MockFetcher::new().serve(USGS_DAY_FEED, FetchedResponse::ok(FEED));
        let engine = Arc::new(
            CacheEngine::new(
                Arc::new(MemoryStore::new()),
                fetcher,
                CacheConfig::default(),
                ConnectivityState::default(),
            )
            .unwrap(),
        );
        let feed = SeismicFeed::new(engine.clone());

        let fresh = feed.recent().await.unwrap();
        assert!(!fresh.is_stale());
        assert_eq!(fresh.quakes.len(), 2);

        engine.fetcher().fail(USGS_DAY_FEED);
        let cached = feed.recent().await.unwrap();
        assert!(cached.is_stale());
        assert_eq!(cached.quakes, fresh.quakes);
    }
}
