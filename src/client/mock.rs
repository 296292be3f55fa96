//! Mock Overpass client for testing
//!
//! Replies are scripted per call; every call is recorded so tests can
//! assert which mirror was asked and at what radius.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::OverpassApi;
use super::models::{Center, Element, ElementKind};
use crate::error::ApiError;
use crate::geo::Coordinates;

/// A scripted answer for one query
#[derive(Debug, Clone)]
pub enum MockReply {
    Elements(Vec<Element>),
    Fail(ApiError),
}

/// A recorded query
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub endpoint: String,
    pub radius_m: f64,
}

/// Mock Overpass backend.
///
/// # Example
/// ```ignore
/// let mock = MockOverpassClient::new()
///     .failing_endpoint("https://a")
///     .with_replies(vec![MockReply::Elements(vec![node(1, 27.7, 85.3, "Shelter")])]);
/// ```
#[derive(Default)]
pub struct MockOverpassClient {
    /// Replies consumed in call order
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    /// Endpoints that always fail regardless of script
    failing: HashSet<String>,
    /// Reply used once the script runs dry
    fallback: Option<MockReply>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockOverpassClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = Arc::new(Mutex::new(replies.into()));
        self
    }

    /// Every query to `endpoint` fails with a network error
    pub fn failing_endpoint(mut self, endpoint: &str) -> Self {
        self.failing.insert(endpoint.to_string());
        self
    }

    /// Reply returned once scripted replies are exhausted
    pub fn otherwise(mut self, reply: MockReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl OverpassApi for MockOverpassClient {
    async fn query_shelters(
        &self,
        endpoint: &str,
        _origin: Coordinates,
        radius_m: f64,
    ) -> std::result::Result<Vec<Element>, ApiError> {
        self.calls.lock().await.push(MockCall {
            endpoint: endpoint.to_string(),
            radius_m,
        });

        if self.failing.contains(endpoint) {
            return Err(ApiError::Network(format!("{} unreachable", endpoint)));
        }

        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or(MockReply::Elements(Vec::new()));

        match reply {
            MockReply::Elements(elements) => Ok(elements),
            MockReply::Fail(err) => Err(err),
        }
    }
}

/// A shelter node
pub fn node(id: i64, lat: f64, lon: f64, name: &str) -> Element {
    let mut tags = BTreeMap::new();
    tags.insert("amenity".to_string(), "shelter".to_string());
    tags.insert("name".to_string(), name.to_string());
    Element {
        kind: ElementKind::Node,
        id,
        lat: Some(lat),
        lon: Some(lon),
        center: None,
        tags,
    }
}

/// A shelter way with an optional center
pub fn way(id: i64, center: Option<(f64, f64)>) -> Element {
    let mut tags = BTreeMap::new();
    tags.insert("emergency".to_string(), "shelter".to_string());
    Element {
        kind: ElementKind::Way,
        id,
        lat: None,
        lon: None,
        center: center.map(|(lat, lon)| Center { lat, lon }),
        tags,
    }
}
