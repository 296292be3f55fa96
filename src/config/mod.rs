//! Configuration management for the SafeNepal offline layer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::routes::{RouteClass, RouteRule};
use crate::error::{ConfigError, Result};

/// Library configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shelter discovery settings
    #[serde(default)]
    pub shelters: ShelterSearchConfig,

    /// Cache strategy settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Offline action queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Connectivity monitor settings
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Durable store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Weather feed credentials
    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Overpass mirror search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelterSearchConfig {
    /// Radius of the first query, in meters
    #[serde(default = "default_initial_radius")]
    pub initial_radius_m: f64,

    /// Multiplier applied after an empty answer
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,

    /// Radius ceiling, in meters
    #[serde(default = "default_max_radius")]
    pub max_radius_m: f64,

    /// Mirror endpoints, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Per-mirror request timeout in seconds (also sent as the query timeout hint)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_initial_radius() -> f64 {
    5_000.0
}

fn default_growth_factor() -> f64 {
    2.0
}

fn default_max_radius() -> f64 {
    50_000.0
}

fn default_endpoints() -> Vec<String> {
    vec![
        "https://overpass-api.de/api/interpreter".to_string(),
        "https://lz4.overpass-api.de/api/interpreter".to_string(),
        "https://overpass.kumi.systems/api/interpreter".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    25
}

impl Default for ShelterSearchConfig {
    fn default() -> Self {
        Self {
            initial_radius_m: default_initial_radius(),
            growth_factor: default_growth_factor(),
            max_radius_m: default_max_radius(),
            endpoints: default_endpoints(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ShelterSearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the search parameters can terminate and make progress
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::Invalid("at least one shelter endpoint is required".into()).into());
        }
        if !(self.initial_radius_m.is_finite() && self.initial_radius_m > 0.0) {
            return Err(ConfigError::Invalid(
                "initial_radius_m must be a positive finite number".into(),
            )
            .into());
        }
        if !(self.growth_factor.is_finite() && self.growth_factor > 1.0) {
            return Err(ConfigError::Invalid(
                "growth_factor must be a finite number greater than 1".into(),
            )
            .into());
        }
        if !self.max_radius_m.is_finite() {
            return Err(ConfigError::Invalid("max_radius_m must be a finite number".into()).into());
        }
        if self.max_radius_m < self.initial_radius_m {
            return Err(ConfigError::Invalid(
                "max_radius_m must not be below initial_radius_m".into(),
            )
            .into());
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()).into());
        }
        Ok(())
    }
}

/// Cache strategy engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Generation installed and activated by default
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Origin that relative manifest entries resolve against
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Cross-origin hosts whose assets may be cached
    #[serde(default = "default_allowlist")]
    pub allowlist: Vec<String>,

    /// Explicit route classification, first match wins
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteRule>,

    /// Static assets preloaded at install time
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Page served to HTML requests when the network is unreachable
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Maximum concurrent manifest fetches during install
    #[serde(default = "default_preload_concurrency")]
    pub preload_concurrency: usize,
}

fn default_generation() -> String {
    "safenepal-cache-v2".to_string()
}

fn default_origin() -> String {
    "http://localhost".to_string()
}

fn default_allowlist() -> Vec<String> {
    vec![
        "cdn.jsdelivr.net".to_string(),
        "cdnjs.cloudflare.com".to_string(),
        "fonts.googleapis.com".to_string(),
    ]
}

fn default_routes() -> Vec<RouteRule> {
    vec![
        RouteRule::host("api.openweathermap.org", RouteClass::LiveData),
        RouteRule::host("earthquake.usgs.gov", RouteClass::LiveData),
    ]
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/offline.html",
        "/safety.html",
        "/contacts.html",
        "/shelters.html",
        "/simulation.html",
        "/community-reports.html",
        "/style.css",
        "/js/earthquake-api.js",
        "/js/weather-api.js",
        "/js/maps.js",
        "/js/contacts.js",
        "/js/offline.js",
        "/js/language.js",
        "/js/notifications.js",
        "/js/settings.js",
        "/js/push-service.js",
        "/js/simulation.js",
        "/js/community-reports.js",
        "/manifest.json",
        "/images/logo.svg",
        "/images/icons/icon-72x72.png",
        "/images/icons/icon-96x96.png",
        "/images/icons/icon-128x128.png",
        "/images/icons/icon-144x144.png",
        "/images/icons/icon-152x152.png",
        "/images/icons/icon-192x192.png",
        "/images/icons/icon-384x384.png",
        "/images/icons/icon-512x512.png",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0-alpha1/dist/css/bootstrap.min.css",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0-alpha1/dist/js/bootstrap.bundle.min.js",
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
        "https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;500;600;700&display=swap",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_offline_page() -> String {
    "/offline.html".to_string()
}

fn default_preload_concurrency() -> usize {
    8
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            origin: default_origin(),
            allowlist: default_allowlist(),
            routes: default_routes(),
            manifest: default_manifest(),
            offline_page: default_offline_page(),
            preload_concurrency: default_preload_concurrency(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.generation.trim().is_empty() {
            return Err(ConfigError::Invalid("cache generation must not be empty".into()).into());
        }
        url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid(format!("cache origin {}: {}", self.origin, e)))?;
        if self.preload_concurrency == 0 {
            return Err(ConfigError::Invalid("preload_concurrency must be positive".into()).into());
        }
        Ok(())
    }
}

/// Offline action queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Failed deliveries before an action is dead-lettered (0 = never)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

/// Connectivity monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Quiet period after an online transition before flushing
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl ConnectivityConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Durable store location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the store database; defaults to the user cache dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// OpenWeatherMap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
}

fn default_weather_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_base_url(),
        }
    }
}

impl WeatherConfig {
    /// The configured API key, or `MissingApiKey`
    pub fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey.into()),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".safenepal").join("config.yaml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path()?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.shelters.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.shelters.initial_radius_m, 5_000.0);
        assert_eq!(config.shelters.max_radius_m, 50_000.0);
        assert_eq!(config.shelters.growth_factor, 2.0);
        assert_eq!(config.shelters.endpoints.len(), 3);
        assert_eq!(config.shelters.timeout(), Duration::from_secs(25));
        assert_eq!(config.queue.max_attempts, 10);
        assert_eq!(config.connectivity.debounce(), Duration::from_millis(500));
        assert!(config.cache.manifest.contains(&"/offline.html".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "shelters:\n  initial_radius_m: 1000\nqueue:\n  max_attempts: 3\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.shelters.initial_radius_m, 1_000.0);
        assert_eq!(config.shelters.max_radius_m, 50_000.0);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.cache.generation, "safenepal-cache-v2");
    }

    #[test]
    fn test_validate_rejects_empty_endpoints() {
        let mut config = Config::default();
        config.shelters.endpoints.clear();

        match config.validate() {
            Err(Error::Config(ConfigError::Invalid(msg))) => assert!(msg.contains("endpoint")),
            other => panic!("Expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_shrinking_growth() {
        let mut config = Config::default();
        config.shelters.growth_factor = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_radii() {
        let yaml = "shelters:\n  max_radius_m: .nan\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.shelters.max_radius_m.is_nan());
        match config.validate() {
            Err(Error::Config(ConfigError::Invalid(msg))) => assert!(msg.contains("max_radius_m")),
            other => panic!("Expected invalid config, got {:?}", other),
        }

        for (initial, max) in [
            (f64::INFINITY, f64::INFINITY),
            (f64::NAN, 50_000.0),
            (5_000.0, f64::INFINITY),
        ] {
            let mut config = Config::default();
            config.shelters.initial_radius_m = initial;
            config.shelters.max_radius_m = max;
            assert!(config.validate().is_err(), "accepted {} / {}", initial, max);
        }

        let mut config = Config::default();
        config.shelters.growth_factor = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let mut config = Config::default();
        config.cache.origin = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.cache.generation = "safenepal-cache-v3".to_string();
        config.save_to(path.clone()).unwrap();

        let loaded = Config::load_from(path).unwrap();
        assert_eq!(loaded.cache.generation, "safenepal-cache-v3");
        assert_eq!(loaded.cache.routes.len(), 2);
    }

    #[test]
    fn test_weather_key_required() {
        let mut weather = WeatherConfig::default();
        assert!(matches!(
            weather.api_key(),
            Err(Error::Config(ConfigError::MissingApiKey))
        ));

        weather.api_key = Some("  ".to_string());
        assert!(weather.api_key().is_err());

        weather.api_key = Some("abc123".to_string());
        assert_eq!(weather.api_key().unwrap(), "abc123");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::load_from(dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(Error::Config(ConfigError::NotFound(_)))));
    }
}
