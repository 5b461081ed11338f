//! Sliding-window rate limiting, keyed by client IP.
//!
//! Every request records a hit in a [`WindowStore`] and gets back the number
//! of hits inside the window, itself included. Past the limit the request is
//! answered with `429 Too Many Requests` and a `Retry-After` of one window.
//!
//! A store models the four-step pipeline a shared backend (a Redis sorted
//! set, say) runs atomically: drop hits older than the window, add this one,
//! count, refresh the key's expiry. The bundled [`MemoryWindowStore`] does
//! the same per key in a sharded map. It is consistent within one process
//! only: behind a load balancer each instance enforces its own limit.
//!
//! If the store fails, the request is let through and the error is logged.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use http::StatusCode;
use http::header::RETRY_AFTER;
use dashmap::DashMap;
use tracing::{error, warn};

use super::{Middleware, Next};
use crate::config::RateLimitConfig;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, thiserror::Error)]
#[error("rate limit store: {0}")]
pub struct WindowStoreError(pub String);

/// Backing store for hit windows.
pub trait WindowStore: Send + Sync + 'static {
    /// Records a hit for `key` at `now` and returns the number of hits in
    /// `(now - window, now]`.
    fn hit<'a>(
        &'a self,
        key: &'a str,
        now: Instant,
        window: Duration,
    ) -> BoxFuture<'a, Result<usize, WindowStoreError>>;
}

// ── MemoryWindowStore ─────────────────────────────────────────────────────────

/// Process-local hit windows.
///
/// Each hit only prunes its own key. Keys that went idle are swept every
/// [`SWEEP_EVERY`] hits, so the map does not grow with every address seen.
#[derive(Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, VecDeque<Instant>>,
    hits: AtomicUsize,
}

/// Hits between two sweeps of idle keys.
const SWEEP_EVERY: usize = 1024;

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, key: &str, now: Instant, window: Duration) -> usize {
        let count = {
            let mut hits = self.windows.entry(key.to_owned()).or_default();
            while hits.front().is_some_and(|&first| now.duration_since(first) >= window) {
                hits.pop_front();
            }
            hits.push_back(now);
            hits.len()
        };

        if self.hits.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now, window);
        }
        count
    }

    /// Drops keys whose latest hit has left the window.
    fn sweep(&self, now: Instant, window: Duration) {
        self.windows.retain(|_, hits| hits.back().is_some_and(|&last| now.duration_since(last) < window));
    }
}

impl WindowStore for MemoryWindowStore {
    fn hit<'a>(
        &'a self,
        key: &'a str,
        now: Instant,
        window: Duration,
    ) -> BoxFuture<'a, Result<usize, WindowStoreError>> {
        let count = self.record(key, now, window);
        Box::pin(async move { Ok(count) })
    }
}

// ── RateLimit ─────────────────────────────────────────────────────────────────

pub struct RateLimit {
    limit: usize,
    window: Duration,
    store: Arc<dyn WindowStore>,
}

impl RateLimit {
    /// `limit` requests per `window` per client, in process memory.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::with_store(limit, window, MemoryWindowStore::new())
    }

    pub fn with_store(limit: usize, window: Duration, store: impl WindowStore) -> Self {
        Self { limit, window, store: Arc::new(store) }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, config.window())
    }

    fn retry_after(&self) -> String {
        self.window.as_secs().max(1).to_string()
    }
}

impl Middleware for RateLimit {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(ip) = req.client_addr().map(|a| a.ip()) else {
                warn!(path = req.path(), "no client address; request not rate limited");
                return next.run(req).await;
            };
            let key = client_key(ip);

            match self.store.hit(&key, Instant::now(), self.window).await {
                Ok(count) if count > self.limit => {
                    warn!(client = %key, count, limit = self.limit, "rate limit exceeded");
                    Response::builder()
                        .status(StatusCode::TOO_MANY_REQUESTS)
                        .header(RETRY_AFTER.as_str(), &self.retry_after())
                        .text("Rate limit exceeded")
                }
                Ok(_) => next.run(req).await,
                Err(e) => {
                    error!(client = %key, error = %e, "rate limit store failed; allowing request");
                    next.run(req).await
                }
            }
        })
    }
}

fn client_key(ip: IpAddr) -> String {
    format!("ratelimit:{ip}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_slide() {
        let store = MemoryWindowStore::new();
        let start = Instant::now();
        let window = Duration::from_secs(1);

        assert_eq!(store.record("a", start, window), 1);
        assert_eq!(store.record("a", start + Duration::from_millis(500), window), 2);
        assert_eq!(store.record("b", start + Duration::from_millis(600), window), 1);
        // The first hit has aged out.
        assert_eq!(store.record("a", start + Duration::from_millis(1100), window), 2);
    }

    #[test]
    fn a_hit_leaves_other_keys_alone() {
        let store = MemoryWindowStore::new();
        let start = Instant::now();
        let window = Duration::from_secs(1);
        store.record("a", start, window);
        store.record("b", start + Duration::from_secs(5), window);
        assert_eq!(store.windows.len(), 2);
        assert_eq!(store.windows.get("a").map(|hits| hits.len()), Some(1));
    }

    #[test]
    fn sweeps_drop_idle_keys() {
        let store = MemoryWindowStore::new();
        let start = Instant::now();
        let window = Duration::from_secs(1);
        store.record("idle", start, window);
        for _ in 1..SWEEP_EVERY {
            store.record("busy", start + Duration::from_secs(5), window);
        }
        assert!(store.windows.get("idle").is_none());
        assert!(store.windows.get("busy").is_some());
    }

    #[test]
    fn retry_after_is_at_least_a_second() {
        assert_eq!(RateLimit::new(5, Duration::from_millis(200)).retry_after(), "1");
        assert_eq!(RateLimit::new(5, Duration::from_secs(60)).retry_after(), "60");
    }
}
