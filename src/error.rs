//! Error types for the SafeNepal offline layer

use std::time::Duration;
use thiserror::Error;

/// Result type alias for SafeNepal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the library
#[derive(Debug, Error)]
pub enum Error {
    #[error("Location unavailable. Enable location to find nearby shelters.")]
    NoLocation,

    #[error(
        "Could not reach shelter services after {attempts} attempts (last error: {last_error}). \
         The Overpass API may be down or your network is offline."
    )]
    AllEndpointsFailed { attempts: usize, last_error: String },

    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("No cached data available for {0}")]
    NoCachedData(String),

    #[error("Preload of generation {generation} failed at {key}: {reason}")]
    PreloadFailed {
        generation: String,
        key: String,
        reason: String,
    },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Network-level errors from mirrors, asset hosts and live-data feeds
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Network("Failed to connect".to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Durable store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Could not determine a cache directory for the local store")]
    NoHome,

    #[error("Corrupt store entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("OpenWeatherMap API key not configured. Set weather.api_key in the config file.")]
    MissingApiKey,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl Error {
    /// True when the error means a remote service could not be reached,
    /// as opposed to a local or configuration problem.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Api(_) | Error::AllEndpointsFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_location_message() {
        let err = Error::NoLocation;
        assert!(err.to_string().contains("Enable location"));
    }

    #[test]
    fn test_all_endpoints_failed_message() {
        let err = Error::AllEndpointsFailed {
            attempts: 3,
            last_error: "Request timed out".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Could not reach shelter services"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_storage_unavailable_message() {
        let err = Error::StorageUnavailable("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_no_cached_data_message() {
        let err = Error::NoCachedData("https://earthquake.usgs.gov/feed".to_string());
        assert!(err.to_string().contains("earthquake.usgs.gov"));
    }

    #[test]
    fn test_preload_failed_message() {
        let err = Error::PreloadFailed {
            generation: "v3".to_string(),
            key: "/style.css".to_string(),
            reason: "Unexpected HTTP status 404".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("v3"));
        assert!(msg.contains("/style.css"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn test_invalid_url_message() {
        let err = Error::InvalidUrl {
            url: "http://[::1".to_string(),
            reason: "invalid IPv6 address".to_string(),
        };
        assert!(err.to_string().contains("http://[::1"));
    }

    #[test]
    fn test_api_error_rate_limit() {
        let err = ApiError::RateLimit(Duration::from_secs(30));
        let msg = err.to_string();
        assert!(msg.contains("Rate limit"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_api_error_status() {
        let err = ApiError::Status(504);
        assert!(err.to_string().contains("504"));
    }

    #[test]
    fn test_error_from_api_error() {
        let err: Error = ApiError::Timeout.into();

        match err {
            Error::Api(ApiError::Timeout) => (),
            _ => panic!("Expected Error::Api(ApiError::Timeout)"),
        }
    }

    #[test]
    fn test_error_from_store_error() {
        let err: Error = StoreError::NoHome.into();

        match err {
            Error::Store(StoreError::NoHome) => (),
            _ => panic!("Expected Error::Store(StoreError::NoHome)"),
        }
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::Api(ApiError::Timeout).is_transport());
        assert!(
            Error::AllEndpointsFailed {
                attempts: 1,
                last_error: String::new()
            }
            .is_transport()
        );
        assert!(!Error::NoLocation.is_transport());
        assert!(!Error::NoCachedData("x".to_string()).is_transport());
    }

    #[test]
    fn test_config_error_missing_api_key() {
        let err = ConfigError::MissingApiKey;
        assert!(err.to_string().contains("weather.api_key"));
    }

    #[test]
    fn test_config_error_from_yaml_error() {
        let yaml_str = "invalid: [yaml: content";
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let config_err: ConfigError = yaml_err.into();

        match config_err {
            ConfigError::ParseError(_) => (),
            _ => panic!("Expected ConfigError::ParseError"),
        }
    }
}
