//! Bounded concurrent fetching of a generation's manifest

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use url::Url;

use super::fetch::{FetchedResponse, Fetcher};
use crate::error::ApiError;

type FetchFuture =
    Pin<Box<dyn Future<Output = (Url, std::result::Result<FetchedResponse, ApiError>)> + Send>>;

/// The manifest entry that stopped a preload
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadFailure {
    pub url: String,
    pub reason: String,
}

/// Fetch every URL, at most `max_concurrent` at a time.
///
/// Only a 200 counts as success. The first failure stops the preload and no
/// new requests are started after it. Results come back in completion order.
pub async fn fetch_all<F>(
    fetcher: Arc<F>,
    urls: Vec<Url>,
    max_concurrent: usize,
) -> std::result::Result<Vec<(Url, FetchedResponse)>, PreloadFailure>
where
    F: Fetcher + ?Sized + 'static,
{
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    debug!(
        "Preloading {} resources with max {} concurrent",
        urls.len(),
        max_concurrent
    );

    let mut fetched = Vec::with_capacity(urls.len());
    let mut in_flight: FuturesUnordered<FetchFuture> = FuturesUnordered::new();
    let mut queued = urls.into_iter();

    let make_future = |url: Url| -> FetchFuture {
        let fetcher = fetcher.clone();
        Box::pin(async move {
            let result = fetcher.fetch(&url).await;
            (url, result)
        })
    };

    for url in queued.by_ref().take(max_concurrent.max(1)) {
        in_flight.push(make_future(url));
    }

    while let Some((url, result)) = in_flight.next().await {
        let response = match result {
            Ok(response) if response.status == 200 => response,
            Ok(response) => {
                return Err(PreloadFailure {
                    url: url.to_string(),
                    reason: ApiError::Status(response.status).to_string(),
                });
            }
            Err(err) => {
                return Err(PreloadFailure {
                    url: url.to_string(),
                    reason: err.to_string(),
                });
            }
        };
        debug!("Preloaded {} ({} bytes)", url, response.body.len());
        fetched.push((url, response));

        if let Some(next) = queued.next() {
            in_flight.push(make_future(next));
        }
    }

    Ok(fetched)
}
