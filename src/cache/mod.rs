//! Cache strategy engine
//!
//! Serves requests cache-first (static assets) or network-first (live
//! data) on top of the durable store. Static assets live in versioned
//! generations: a generation is preloaded from the manifest all-or-nothing,
//! and activating it purges every other generation.
//!
//! Entries are stored in the `cache/<generation>` namespace keyed by the
//! absolute URL. The active generation is recorded in the `meta` namespace.
//! An install writes into a private staging namespace and swaps it in only
//! once every entry is stored.

pub mod fetch;
#[cfg(test)]
pub mod mock;
pub mod preload;
pub mod routes;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use url::Url;

use crate::config::CacheConfig;
use crate::connectivity::ConnectivityState;
use crate::error::{ApiError, Error, Result};
use crate::store::{LocalStore, StoredEntry};

pub use fetch::{FetchedResponse, Fetcher, HttpFetcher};
pub use preload::PreloadFailure;
pub use routes::{RouteClass, RouteRule, RouteTable};

const CACHE_PREFIX: &str = "cache/";
const STAGING_PREFIX: &str = "staging/";
const META_NAMESPACE: &str = "meta";
const ACTIVE_GENERATION_KEY: &str = "active_generation";

/// Store namespace of a cache generation
pub fn generation_namespace(generation: &str) -> String {
    format!("{}{}", CACHE_PREFIX, generation)
}

/// A GET request handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub url: String,
    /// Value of the `Accept` header, if any
    pub accept: Option<String>,
}

impl CacheRequest {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            accept: None,
        }
    }

    /// A page navigation, eligible for the offline page
    pub fn navigate(url: &str) -> Self {
        Self {
            url: url.to_string(),
            accept: Some("text/html".to_string()),
        }
    }

    pub fn accepts_html(&self) -> bool {
        self.accept
            .as_deref()
            .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The offline page, standing in for an unreachable page
    OfflineFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub source: ResponseSource,
}

impl CacheResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn from_network(response: FetchedResponse) -> Self {
        Self {
            status: response.status,
            body: response.body,
            content_type: response.content_type,
            source: ResponseSource::Network,
        }
    }

    fn from_cache(resource: CachedResource, source: ResponseSource) -> Self {
        Self {
            status: 200,
            body: resource.payload,
            content_type: resource.content_type,
            source,
        }
    }
}

/// A stored copy of a fetched resource
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResource {
    pub key: String,
    pub payload: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub generation: String,
}

// Stored layout: content type, a newline, then the raw body.
fn encode_entry(content_type: Option<&str>, body: &[u8]) -> Vec<u8> {
    let header = content_type.unwrap_or("");
    let mut data = Vec::with_capacity(header.len() + 1 + body.len());
    data.extend_from_slice(header.as_bytes());
    data.push(b'\n');
    data.extend_from_slice(body);
    data
}

fn decode_entry(entry: StoredEntry, generation: &str) -> CachedResource {
    let (content_type, payload) = match entry.data.iter().position(|b| *b == b'\n') {
        Some(split) => {
            let header = String::from_utf8_lossy(&entry.data[..split]).into_owned();
            let content_type = (!header.is_empty()).then_some(header);
            (content_type, entry.data[split + 1..].to_vec())
        }
        None => (None, entry.data),
    };
    CachedResource {
        key: entry.key,
        payload,
        content_type,
        fetched_at: entry.stored_at,
        generation: generation.to_string(),
    }
}

/// Result of prefetching one URL
#[derive(Debug, Clone)]
pub struct PrefetchOutcome {
    pub url: String,
    pub result: std::result::Result<(), ApiError>,
}

/// Size of the active generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub generation: String,
    pub entries: usize,
    pub bytes: u64,
}

/// Cache-first / network-first request handling over a [`LocalStore`]
pub struct CacheEngine<F: Fetcher + 'static> {
    store: Arc<dyn LocalStore>,
    fetcher: Arc<F>,
    routes: RouteTable,
    config: CacheConfig,
    connectivity: ConnectivityState,
}

impl<F: Fetcher + 'static> CacheEngine<F> {
    pub fn new(
        store: Arc<dyn LocalStore>,
        fetcher: F,
        config: CacheConfig,
        connectivity: ConnectivityState,
    ) -> Result<Self> {
        config.validate()?;
        let routes = RouteTable::from_config(&config)?;
        Ok(Self {
            store,
            fetcher: Arc::new(fetcher),
            routes,
            config,
            connectivity,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Serve a request according to its route class
    pub async fn handle(&self, request: &CacheRequest) -> Result<CacheResponse> {
        let url = self.routes.resolve(&request.url)?;
        match self.routes.classify(&url) {
            RouteClass::StaticAsset => self.cache_first(request, &url).await,
            RouteClass::LiveData => self.network_first(&url).await,
            RouteClass::Passthrough => self.passthrough(request, &url).await,
        }
    }

    async fn cache_first(&self, request: &CacheRequest, url: &Url) -> Result<CacheResponse> {
        let generation = self.active_generation()?;
        if let Some(resource) = self.lookup(&generation, url.as_str())? {
            debug!("Cache hit for {}", url);
            return Ok(CacheResponse::from_cache(resource, ResponseSource::Cache));
        }

        if !self.connectivity.is_online() {
            debug!("Offline, skipping network for {}", url);
            return self.offline_fallback(request, url, None);
        }

        match self.fetcher.fetch(url).await {
            Ok(response) => {
                if response.status == 200 {
                    self.remember(&generation, url, &response);
                }
                Ok(CacheResponse::from_network(response))
            }
            Err(err) => {
                debug!("Fetch of {} failed: {}", url, err);
                self.offline_fallback(request, url, Some(err))
            }
        }
    }

    async fn network_first(&self, url: &Url) -> Result<CacheResponse> {
        let generation = self.active_generation()?;

        if self.connectivity.is_online() {
            match self.fetcher.fetch(url).await {
                Ok(response) if response.is_success() => {
                    self.remember(&generation, url, &response);
                    return Ok(CacheResponse::from_network(response));
                }
                Ok(response) => {
                    warn!("{} answered {}, trying cached copy", url, response.status);
                }
                Err(err) => {
                    warn!("Fetch of {} failed ({}), trying cached copy", url, err);
                }
            }
        } else {
            debug!("Offline, serving {} from cache", url);
        }

        match self.lookup(&generation, url.as_str())? {
            Some(resource) => Ok(CacheResponse::from_cache(resource, ResponseSource::Cache)),
            None => Err(Error::NoCachedData(url.to_string())),
        }
    }

    async fn passthrough(&self, request: &CacheRequest, url: &Url) -> Result<CacheResponse> {
        if !self.connectivity.is_online() {
            return self.offline_fallback(request, url, None);
        }
        match self.fetcher.fetch(url).await {
            Ok(response) => Ok(CacheResponse::from_network(response)),
            Err(err) => self.offline_fallback(request, url, Some(err)),
        }
    }

    /// The offline page for page requests, otherwise the fetch error
    fn offline_fallback(
        &self,
        request: &CacheRequest,
        url: &Url,
        cause: Option<ApiError>,
    ) -> Result<CacheResponse> {
        if request.accepts_html() {
            let generation = self.active_generation()?;
            let page = self.routes.resolve(&self.config.offline_page)?;
            if let Some(resource) = self.lookup(&generation, page.as_str())? {
                debug!("Serving offline page for {}", url);
                return Ok(CacheResponse::from_cache(
                    resource,
                    ResponseSource::OfflineFallback,
                ));
            }
        }

        match cause {
            Some(err) => Err(err.into()),
            None => Err(Error::NoCachedData(url.to_string())),
        }
    }

    fn lookup(&self, generation: &str, key: &str) -> Result<Option<CachedResource>> {
        let entry = self.store.get(&generation_namespace(generation), key)?;
        Ok(entry.map(|e| decode_entry(e, generation)))
    }

    // Cache writes are best effort; the response is served either way.
    fn remember(&self, generation: &str, url: &Url, response: &FetchedResponse) {
        let data = encode_entry(response.content_type.as_deref(), &response.body);
        if let Err(e) = self
            .store
            .put(&generation_namespace(generation), url.as_str(), &data)
        {
            warn!("Failed to cache {}: {}", url, e);
        }
    }

    /// The cached copy of `url` in the active generation
    pub fn cached(&self, url: &str) -> Result<Option<CachedResource>> {
        let url = self.routes.resolve(url)?;
        self.lookup(&self.active_generation()?, url.as_str())
    }

    /// Whether `url` is cached in the active generation
    pub fn is_available(&self, url: &str) -> Result<bool> {
        Ok(self.cached(url)?.is_some())
    }

    /// Generation currently serving static assets
    pub fn active_generation(&self) -> Result<String> {
        let stored = self.store.get(META_NAMESPACE, ACTIVE_GENERATION_KEY)?;
        Ok(stored
            .map(|e| String::from_utf8_lossy(&e.data).into_owned())
            .unwrap_or_else(|| self.config.generation.clone()))
    }

    /// Preload the manifest into `generation`.
    ///
    /// Nothing is kept unless every manifest entry was fetched with a 200.
    /// The active generation is not touched.
    pub async fn install(&self, generation: &str) -> Result<usize> {
        let namespace = generation_namespace(generation);
        let failed = |key: String, reason: String| Error::PreloadFailed {
            generation: generation.to_string(),
            key,
            reason,
        };

        let mut urls = Vec::with_capacity(self.config.manifest.len());
        for entry in &self.config.manifest {
            let url = self
                .routes
                .resolve(entry)
                .map_err(|e| failed(entry.clone(), e.to_string()))?;
            urls.push(url);
        }

        info!(
            "Installing cache generation {} ({} resources)",
            generation,
            urls.len()
        );
        let fetched = preload::fetch_all(self.fetcher.clone(), urls, self.config.preload_concurrency)
            .await
            .map_err(|f| {
                warn!("Install of {} failed at {}: {}", generation, f.url, f.reason);
                failed(f.url, f.reason)
            })?;

        let staging = format!(
            "{}{}/{}",
            STAGING_PREFIX,
            generation,
            self.store.next_sequence(STAGING_PREFIX)?
        );
        for (url, response) in &fetched {
            let data = encode_entry(response.content_type.as_deref(), &response.body);
            if let Err(e) = self.store.put(&staging, url.as_str(), &data) {
                self.discard_staging(&staging);
                return Err(failed(url.to_string(), e.to_string()));
            }
        }
        if let Err(e) = self.store.replace_namespace(&staging, &namespace) {
            self.discard_staging(&staging);
            return Err(failed(namespace, e.to_string()));
        }

        info!("Installed {} resources into {}", fetched.len(), generation);
        Ok(fetched.len())
    }

    fn discard_staging(&self, staging: &str) {
        if let Err(e) = self.store.clear_namespace(staging) {
            warn!("Failed to discard staged install {}: {}", staging, e);
        }
    }

    /// Make `generation` the active one and drop every other generation
    pub fn activate(&self, generation: &str) -> Result<()> {
        self.store
            .put(META_NAMESPACE, ACTIVE_GENERATION_KEY, generation.as_bytes())?;

        let keep = generation_namespace(generation);
        for namespace in self.store.namespaces()? {
            if namespace.starts_with(CACHE_PREFIX) && namespace != keep {
                let removed = self.store.clear_namespace(&namespace)?;
                info!("Purged stale cache {} ({} entries)", namespace, removed);
            }
        }

        info!("Activated cache generation {}", generation);
        Ok(())
    }

    /// Install, then activate only if the install succeeded
    pub async fn install_and_activate(&self, generation: &str) -> Result<usize> {
        let count = self.install(generation).await?;
        self.activate(generation)?;
        Ok(count)
    }

    /// Fetch and cache extra URLs into the active generation.
    ///
    /// Each URL is attempted independently; failures are reported, not raised.
    pub async fn prefetch(&self, urls: &[&str]) -> Result<Vec<PrefetchOutcome>> {
        let generation = self.active_generation()?;
        let mut outcomes = Vec::with_capacity(urls.len());

        for raw in urls {
            let url = self.routes.resolve(raw)?;
            let result = match self.fetcher.fetch(&url).await {
                Ok(response) if response.status == 200 => {
                    self.remember(&generation, &url, &response);
                    Ok(())
                }
                Ok(response) => Err(ApiError::Status(response.status)),
                Err(err) => Err(err),
            };
            if let Err(e) = &result {
                debug!("Prefetch of {} failed: {}", url, e);
            }
            outcomes.push(PrefetchOutcome {
                url: url.to_string(),
                result,
            });
        }

        Ok(outcomes)
    }

    /// Drop every cache generation and any leftover staged install,
    /// returning how many entries were removed
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for namespace in self.store.namespaces()? {
            if namespace.starts_with(CACHE_PREFIX) || namespace.starts_with(STAGING_PREFIX) {
                removed += self.store.clear_namespace(&namespace)?;
            }
        }
        info!("Cleared {} cached entries", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let generation = self.active_generation()?;
        let entries = self.store.list(&generation_namespace(&generation))?;
        Ok(CacheStats {
            entries: entries.len(),
            bytes: entries.iter().map(|e| e.data.len() as u64).sum(),
            generation,
        })
    }
}
