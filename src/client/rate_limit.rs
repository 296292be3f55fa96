//! Per-mirror rate limiting for Overpass endpoints
//!
//! Reactive: a mirror is only throttled after it has answered 429. Public
//! Overpass instances hand out a couple of query slots per client, so once a
//! mirror pushes back we pace further queries to it.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use tokio::sync::RwLock;

/// Queries per minute allowed against a mirror once it has rate limited us
pub const THROTTLED_QUERIES_PER_MINUTE: u32 = 10;

/// Rate limiter state for a single mirror.
pub struct MirrorRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    active: AtomicBool,
    endpoint: String,
}

impl MirrorRateLimiter {
    pub fn new(endpoint: impl Into<String>, per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: RateLimiter::direct(quota),
            active: AtomicBool::new(false),
            endpoint: endpoint.into(),
        }
    }

    /// Activate rate limiting for this mirror.
    pub fn activate(&self) {
        let was_active = self.active.swap(true, Ordering::SeqCst);
        if !was_active {
            debug!("Rate limiting activated for {}", self.endpoint);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for permission if rate limiting is active.
    pub async fn wait_if_active(&self) {
        if self.is_active() {
            debug!("Waiting for rate limiter on {}", self.endpoint);
            self.limiter.until_ready().await;
        }
    }
}

/// Lazily created limiters, one per mirror URL.
pub struct MirrorRateLimiters {
    limiters: RwLock<HashMap<String, Arc<MirrorRateLimiter>>>,
    per_minute: u32,
}

impl Default for MirrorRateLimiters {
    fn default() -> Self {
        Self::new(THROTTLED_QUERIES_PER_MINUTE)
    }
}

impl MirrorRateLimiters {
    pub fn new(per_minute: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            per_minute,
        }
    }

    async fn limiter(&self, endpoint: &str) -> Arc<MirrorRateLimiter> {
        if let Some(limiter) = self.limiters.read().await.get(endpoint) {
            return limiter.clone();
        }

        let mut limiters = self.limiters.write().await;
        limiters
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(MirrorRateLimiter::new(endpoint, self.per_minute)))
            .clone()
    }

    /// Wait for permission to query a mirror (no-op unless it was throttled).
    pub async fn wait_for(&self, endpoint: &str) {
        let limiter = self.limiter(endpoint).await;
        limiter.wait_if_active().await;
    }

    /// Throttle a mirror (called on 429).
    pub async fn activate(&self, endpoint: &str) {
        self.limiter(endpoint).await.activate();
    }

    pub async fn is_active(&self, endpoint: &str) -> bool {
        self.limiters
            .read()
            .await
            .get(endpoint)
            .is_some_and(|l| l.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIRROR: &str = "https://overpass-api.de/api/interpreter";

    #[test]
    fn test_mirror_rate_limiter_activation() {
        let limiter = MirrorRateLimiter::new(MIRROR, 10);
        assert!(!limiter.is_active());

        limiter.activate();
        assert!(limiter.is_active());

        // Second activation should be idempotent
        limiter.activate();
        assert!(limiter.is_active());
    }

    #[tokio::test]
    async fn test_limiters_are_per_mirror() {
        let set = MirrorRateLimiters::default();
        set.activate(MIRROR).await;

        assert!(set.is_active(MIRROR).await);
        assert!(!set.is_active("https://lz4.overpass-api.de/api/interpreter").await);
    }

    #[tokio::test]
    async fn test_wait_for_inactive_mirror_returns_immediately() {
        let set = MirrorRateLimiters::new(1);
        for _ in 0..5 {
            set.wait_for(MIRROR).await;
        }
        assert!(!set.is_active(MIRROR).await);
    }

    #[tokio::test]
    async fn test_zero_quota_falls_back_to_minimum() {
        let set = MirrorRateLimiters::new(0);
        set.activate(MIRROR).await;
        // First cell is always available
        set.wait_for(MIRROR).await;
        assert!(set.is_active(MIRROR).await);
    }
}
