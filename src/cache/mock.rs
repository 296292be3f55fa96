//! Scripted fetcher for cache engine tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use super::fetch::{FetchedResponse, Fetcher};
use crate::error::ApiError;

/// Serves fixed responses by exact URL; anything unknown fails as a
/// network error. Routes can be changed while the engine holds the fetcher.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Result<FetchedResponse, ApiError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, response: FetchedResponse) -> Self {
        self.set(url, response);
        self
    }

    pub fn set(&self, url: &str, response: FetchedResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(response));
    }

    /// Make `url` fail at the transport level
    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Err(ApiError::Network(format!("{} unreachable", url))),
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResponse, ApiError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.routes
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| Err(ApiError::Network(format!("no route for {}", url))))
    }
}
