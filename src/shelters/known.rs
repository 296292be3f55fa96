//! Shelters bundled with the app for use when no mirror can be reached

use serde::Serialize;

use crate::geo::Coordinates;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnownShelter {
    pub name: &'static str,
    pub location: Coordinates,
    pub capacity: u32,
    pub facility: &'static str,
}

/// A bundled shelter with its distance from the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnownShelterMatch {
    pub shelter: KnownShelter,
    pub distance_m: f64,
}

pub fn known_shelters() -> Vec<KnownShelter> {
    vec![
        KnownShelter {
            name: "Kathmandu Emergency Shelter",
            location: Coordinates::new(27.7172, 85.3240),
            capacity: 500,
            facility: "School",
        },
        KnownShelter {
            name: "Bhaktapur Relief Center",
            location: Coordinates::new(27.6710, 85.4298),
            capacity: 300,
            facility: "Community Center",
        },
        KnownShelter {
            name: "Lalitpur Safe Haven",
            location: Coordinates::new(27.6588, 85.3247),
            capacity: 250,
            facility: "Government Building",
        },
    ]
}

/// Bundled shelters ordered by distance from `origin`
pub fn nearest_known(origin: Coordinates) -> Vec<KnownShelterMatch> {
    let mut matches: Vec<KnownShelterMatch> = known_shelters()
        .into_iter()
        .map(|shelter| KnownShelterMatch {
            distance_m: origin.distance_to(&shelter.location),
            shelter,
        })
        .collect();
    matches.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_known_from_bhaktapur() {
        let matches = nearest_known(Coordinates::new(27.672, 85.428));
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].shelter.name, "Bhaktapur Relief Center");
        assert!(matches.windows(2).all(|w| w[0].distance_m <= w[1].distance_m));
    }

    #[test]
    fn test_nearest_known_from_patan() {
        let matches = nearest_known(Coordinates::new(27.66, 85.325));
        assert_eq!(matches[0].shelter.name, "Lalitpur Safe Haven");
        assert!(matches[0].distance_m < 500.0);
    }
}
