//! reqwest-backed Overpass API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};

use super::models::{Element, OverpassResponse};
use super::rate_limit::MirrorRateLimiters;
use super::OverpassApi;
use crate::config::ShelterSearchConfig;
use crate::error::{ApiError, Result};
use crate::geo::Coordinates;

const USER_AGENT: &str = concat!("safenepal/", env!("CARGO_PKG_VERSION"));

/// Build the Overpass QL query for shelters around a point.
///
/// Matches nodes and ways tagged `amenity=shelter` or `emergency=shelter`;
/// `out center` gives ways a representative point.
pub fn build_query(origin: Coordinates, radius_m: f64, timeout: Duration) -> String {
    let around = format!("(around:{:.0},{},{})", radius_m, origin.lat, origin.lon);
    format!(
        "[out:json][timeout:{timeout}];\n\
         (\n  \
         node[\"amenity\"=\"shelter\"]{around};\n  \
         node[\"emergency\"=\"shelter\"]{around};\n  \
         way[\"amenity\"=\"shelter\"]{around};\n  \
         way[\"emergency\"=\"shelter\"]{around};\n\
         );\n\
         out center;",
        timeout = timeout.as_secs(),
        around = around,
    )
}

/// Overpass API client talking to any number of mirrors
pub struct OverpassClient {
    http: HttpClient,
    timeout: Duration,
    limiters: MirrorRateLimiters,
}

impl OverpassClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            timeout,
            limiters: MirrorRateLimiters::default(),
        })
    }

    pub fn from_config(config: &ShelterSearchConfig) -> Result<Self> {
        Self::new(config.timeout())
    }
}

#[async_trait]
impl OverpassApi for OverpassClient {
    async fn query_shelters(
        &self,
        endpoint: &str,
        origin: Coordinates,
        radius_m: f64,
    ) -> std::result::Result<Vec<Element>, ApiError> {
        self.limiters.wait_for(endpoint).await;

        let query = build_query(origin, radius_m, self.timeout);
        let response = self
            .http
            .post(endpoint)
            .form(&[("data", query.as_str())])
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let data = response.json::<OverpassResponse>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse Overpass response: {}", e))
                })?;
                Ok(data.elements)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.limiters.activate(endpoint).await;
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimit(Duration::from_secs(retry_after)))
            }
            StatusCode::GATEWAY_TIMEOUT => Err(ApiError::Timeout),
            _ => Err(ApiError::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kathmandu() -> Coordinates {
        Coordinates::new(27.7172, 85.324)
    }

    #[test]
    fn test_client_creation() {
        let client = OverpassClient::new(Duration::from_secs(25));
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_query() {
        let query = build_query(kathmandu(), 5000.0, Duration::from_secs(25));

        assert!(query.starts_with("[out:json][timeout:25];"));
        assert!(query.contains("node[\"amenity\"=\"shelter\"](around:5000,27.7172,85.324);"));
        assert!(query.contains("node[\"emergency\"=\"shelter\"](around:5000,27.7172,85.324);"));
        assert!(query.contains("way[\"amenity\"=\"shelter\"](around:5000,27.7172,85.324);"));
        assert!(query.contains("way[\"emergency\"=\"shelter\"](around:5000,27.7172,85.324);"));
        assert!(query.ends_with("out center;"));
    }

    #[tokio::test]
    async fn test_query_parses_elements() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/interpreter")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(mockito::Matcher::Regex("data=".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"elements": [
                    {"type": "node", "id": 11, "lat": 27.72, "lon": 85.33, "tags": {"name": "Ratna Park"}}
                ]}"#,
            )
            .create_async()
            .await;

        let client = OverpassClient::new(Duration::from_secs(5)).unwrap();
        let endpoint = format!("{}/api/interpreter", server.url());
        let elements = client
            .query_shelters(&endpoint, kathmandu(), 5000.0)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].name(), "Ratna Park");
    }

    #[tokio::test]
    async fn test_server_error_is_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/interpreter")
            .with_status(502)
            .create_async()
            .await;

        let client = OverpassClient::new(Duration::from_secs(5)).unwrap();
        let endpoint = format!("{}/api/interpreter", server.url());
        let err = client
            .query_shelters(&endpoint, kathmandu(), 5000.0)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Status(502)));
    }

    #[tokio::test]
    async fn test_rate_limit_activates_limiter() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/interpreter")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let client = OverpassClient::new(Duration::from_secs(5)).unwrap();
        let endpoint = format!("{}/api/interpreter", server.url());
        let err = client
            .query_shelters(&endpoint, kathmandu(), 5000.0)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::RateLimit(d) if d == Duration::from_secs(7)));
        assert!(client.limiters.is_active(&endpoint).await);
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/interpreter")
            .with_status(200)
            .with_body("<html>busy</html>")
            .create_async()
            .await;

        let client = OverpassClient::new(Duration::from_secs(5)).unwrap();
        let endpoint = format!("{}/api/interpreter", server.url());
        let err = client
            .query_shelters(&endpoint, kathmandu(), 5000.0)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
