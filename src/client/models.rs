//! Overpass API response types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

/// Name used when an element carries no `name` tag
pub const UNNAMED_SHELTER: &str = "Unnamed Shelter";

/// Top-level Overpass JSON response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// OSM element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    /// Relations and anything else the query did not ask for
    #[serde(other)]
    Other,
}

/// Center point emitted by `out center` for ways
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// One located element from an Overpass answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: ElementKind,

    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Center>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Element {
    /// Where the element is, if it can be placed.
    ///
    /// Nodes carry their own position, ways only their `center`.
    pub fn coordinates(&self) -> Option<Coordinates> {
        let (lat, lon) = match self.kind {
            ElementKind::Node => (self.lat?, self.lon?),
            ElementKind::Way => {
                let center = self.center?;
                (center.lat, center.lon)
            }
            ElementKind::Other => return None,
        };

        if lat.is_finite() && lon.is_finite() {
            Some(Coordinates::new(lat, lon))
        } else {
            None
        }
    }

    pub fn name(&self) -> &str {
        self.tags
            .get("name")
            .map(String::as_str)
            .unwrap_or(UNNAMED_SHELTER)
    }
}
