//! Overpass API client used for shelter discovery

use async_trait::async_trait;

use crate::error::ApiError;
use crate::geo::Coordinates;

#[cfg(test)]
pub mod mock;
pub mod models;
pub mod overpass;
pub mod rate_limit;

#[cfg(test)]
pub use mock::{MockOverpassClient, MockReply};
pub use models::{Center, Element, ElementKind, OverpassResponse};
pub use overpass::{OverpassClient, build_query};

/// A geo backend that can answer "shelters around a point" queries.
///
/// Any `Err` is a transport-level failure of that one mirror; callers fail
/// over to the next mirror.
#[async_trait]
pub trait OverpassApi: Send + Sync {
    /// Query `endpoint` for shelter elements within `radius_m` of `origin`
    async fn query_shelters(
        &self,
        endpoint: &str,
        origin: Coordinates,
        radius_m: f64,
    ) -> std::result::Result<Vec<Element>, ApiError>;
}
