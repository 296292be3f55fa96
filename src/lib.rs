//! SafeNepal offline layer
//!
//! Shelter discovery over Overpass mirrors, a durable offline action queue,
//! a cache strategy engine with versioned generations, the connectivity
//! monitor that ties the queue to network transitions, and the seismic and
//! weather feeds that read through the cache.
//!
//! The crate installs no logger; it reports through the `log` facade.

pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod feeds;
pub mod geo;
pub mod queue;
pub mod shelters;
pub mod store;

pub use cache::{CacheEngine, CacheRequest, CacheResponse, HttpFetcher, ResponseSource};
pub use client::OverpassClient;
pub use config::Config;
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal, ConnectivityState};
pub use error::{Error, Result};
pub use geo::{Coordinates, haversine_distance};
pub use queue::{ActionKind, ActionQueue, FlushReport, PendingAction, SyncBackend};
pub use shelters::{ShelterCandidate, ShelterFinder, ShelterSearch};
pub use store::{LocalStore, MemoryStore, SqliteStore};
