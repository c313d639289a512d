use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const PRUNE_THRESHOLD: usize = 1024;

/// Sliding-window limiter keyed by caller and route template.
///
/// Buckets whose hits have all left the window are dropped once the map
/// grows past a threshold.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Record a hit and report whether it fits the window, plus the slots left.
    pub fn allow(&self, key: &str, route: &str) -> (bool, u32) {
        self.allow_at(key, route, Instant::now())
    }

    fn allow_at(&self, key: &str, route: &str, now: Instant) -> (bool, u32) {
        if self.buckets.len() >= PRUNE_THRESHOLD {
            self.prune_at(now);
        }

        let window = self.window;
        let mut entry = self.buckets.entry(format!("{key}:{route}")).or_default();
        entry.retain(|hit| now.duration_since(*hit) < window);

        let remaining = self.max_requests.saturating_sub(entry.len() as u32);
        if remaining == 0 {
            return (false, 0);
        }
        entry.push(now);
        (true, remaining - 1)
    }

    fn prune_at(&self, now: Instant) {
        let window = self.window;
        self.buckets
            .retain(|_, hits| hits.last().is_some_and(|hit| now.duration_since(*hit) < window));
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}
