//! Shelter discovery across Overpass mirrors
//!
//! Mirrors are tried in rotation. A mirror that cannot be reached hands the
//! same radius to the next one; a mirror that answers with nothing widens the
//! radius (by the growth factor, up to the ceiling) before the next one is
//! asked. The search ends at the first non-empty answer, at an empty answer
//! on the ceiling radius, or when every mirror has failed at the current
//! radius.

pub mod known;
pub mod plan;

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::Serialize;

use crate::client::{Element, ElementKind, OverpassApi};
use crate::config::ShelterSearchConfig;
use crate::error::{Error, Result};
use crate::geo::Coordinates;

pub use known::{KnownShelter, KnownShelterMatch, known_shelters, nearest_known};
use plan::{SearchPlan, Step};

/// A shelter found near the query origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShelterCandidate {
    pub id: i64,
    pub kind: ElementKind,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Haversine distance from the query origin
    pub distance_m: f64,
    pub tags: BTreeMap<String, String>,
}

/// Outcome of a completed search
#[derive(Debug, Clone, PartialEq)]
pub enum ShelterSearch {
    Found {
        shelters: Vec<ShelterCandidate>,
        radius_m: f64,
        endpoint: String,
    },
    /// The backend was reachable but had nothing within the ceiling radius
    NoneFound { radius_m: f64 },
}

impl ShelterSearch {
    pub fn shelters(&self) -> &[ShelterCandidate] {
        match self {
            ShelterSearch::Found { shelters, .. } => shelters,
            ShelterSearch::NoneFound { .. } => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shelters().is_empty()
    }

    /// Message suitable for showing to the user
    pub fn message(&self) -> String {
        match self {
            ShelterSearch::Found {
                shelters, radius_m, ..
            } => format!(
                "Found {} shelter{} within {} km.",
                shelters.len(),
                if shelters.len() == 1 { "" } else { "s" },
                format_km(*radius_m)
            ),
            ShelterSearch::NoneFound { radius_m } => format!(
                "No shelters found within {} km. Try checking official sources.",
                format_km(*radius_m)
            ),
        }
    }
}

fn format_km(meters: f64) -> String {
    let km = meters / 1000.0;
    if km.fract() == 0.0 {
        format!("{:.0}", km)
    } else {
        format!("{:.1}", km)
    }
}

/// Turn raw elements into candidates sorted nearest first.
///
/// Elements that cannot be placed are dropped. Equal distances keep the
/// backend's order.
pub fn rank_candidates(origin: Coordinates, elements: Vec<Element>) -> Vec<ShelterCandidate> {
    let mut shelters: Vec<ShelterCandidate> = elements
        .into_iter()
        .filter_map(|element| {
            let at = element.coordinates()?;
            Some(ShelterCandidate {
                id: element.id,
                kind: element.kind,
                name: element.name().to_string(),
                lat: at.lat,
                lon: at.lon,
                distance_m: origin.distance_to(&at),
                tags: element.tags,
            })
        })
        .collect();

    shelters.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    shelters
}

/// Finds shelters near a point using any [`OverpassApi`] backend
pub struct ShelterFinder<C: OverpassApi> {
    client: C,
    config: ShelterSearchConfig,
}

impl<C: OverpassApi> ShelterFinder<C> {
    pub fn new(client: C, config: ShelterSearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ShelterSearchConfig {
        &self.config
    }

    /// Search for shelters around `origin`.
    ///
    /// Fails with [`Error::NoLocation`] before any network call when the
    /// origin is unknown, and with [`Error::AllEndpointsFailed`] when no
    /// mirror could be reached at the current radius.
    pub async fn find_shelters(&self, origin: Option<Coordinates>) -> Result<ShelterSearch> {
        let origin = origin.ok_or(Error::NoLocation)?;

        let mut plan = SearchPlan::new(&self.config);
        let mut step = plan.start();
        let mut last_error = String::from("no mirror was queried");

        loop {
            match step {
                Step::Query { endpoint, radius_m } => {
                    let url = &self.config.endpoints[endpoint];
                    debug!("Querying {} for shelters within {:.0} m", url, radius_m);

                    match self.client.query_shelters(url, origin, radius_m).await {
                        Err(err) => {
                            warn!("Shelter mirror {} failed: {}", url, err);
                            last_error = err.to_string();
                            step = plan.on_transport_failure();
                        }
                        Ok(elements) => {
                            let shelters = rank_candidates(origin, elements);
                            if !shelters.is_empty() {
                                info!(
                                    "Found {} shelters within {:.0} m via {}",
                                    shelters.len(),
                                    radius_m,
                                    url
                                );
                                return Ok(ShelterSearch::Found {
                                    shelters,
                                    radius_m,
                                    endpoint: url.clone(),
                                });
                            }
                            debug!("No shelters within {:.0} m at {}", radius_m, url);
                            step = plan.on_empty();
                        }
                    }
                }
                Step::NoneFound { radius_m } => {
                    info!("No shelters found within {:.0} m", radius_m);
                    return Ok(ShelterSearch::NoneFound { radius_m });
                }
                Step::Exhausted => {
                    return Err(Error::AllEndpointsFailed {
                        attempts: plan.attempts(),
                        last_error,
                    });
                }
            }
        }
    }

    /// Bundled shelters near `origin`, for when discovery cannot reach any mirror
    pub fn nearest_known(&self, origin: Coordinates) -> Vec<KnownShelterMatch> {
        nearest_known(origin)
    }
}
