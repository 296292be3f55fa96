//! Functional tests against the live public services
//!
//! Opt-in, since they depend on Overpass mirrors and the USGS feed being up:
//!
//! ```bash
//! cargo test --features functional-tests --test functional
//! ```

use std::sync::Arc;
use std::time::Duration;

use safenepal::config::{CacheConfig, ShelterSearchConfig};
use safenepal::feeds::SeismicFeed;
use safenepal::{
    CacheEngine, ConnectivityState, Coordinates, HttpFetcher, MemoryStore, OverpassClient,
    ResponseSource, ShelterFinder, ShelterSearch,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
#[cfg_attr(not(feature = "functional-tests"), ignore)]
async fn test_live_shelter_search_in_kathmandu() {
    init_logging();
    let config = ShelterSearchConfig::default();
    let finder = ShelterFinder::new(OverpassClient::from_config(&config).unwrap(), config).unwrap();

    let search = finder
        .find_shelters(Some(Coordinates::new(27.7172, 85.3240)))
        .await
        .unwrap();

    if let ShelterSearch::Found { shelters, .. } = &search {
        assert!(
            shelters
                .windows(2)
                .all(|w| w[0].distance_m <= w[1].distance_m)
        );
    }
    println!("{}", search.message());
}

#[tokio::test]
#[cfg_attr(not(feature = "functional-tests"), ignore)]
async fn test_live_seismic_feed() {
    init_logging();
    let engine = CacheEngine::new(
        Arc::new(MemoryStore::new()),
        HttpFetcher::new(Duration::from_secs(30)).unwrap(),
        CacheConfig::default(),
        ConnectivityState::default(),
    )
    .unwrap();
    let feed = SeismicFeed::new(Arc::new(engine));

    let report = feed.recent().await.unwrap();

    assert_eq!(report.source, ResponseSource::Network);
    assert!(report.quakes.iter().all(|q| q.distance_km <= 500.0));
}
