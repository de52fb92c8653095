//! Sliding-window rate limiting keyed by `(category, identity)`.
//!
//! The key table is bounded. When it is full, the least recently used key
//! is evicted before a new one is admitted. The lock is held only for the
//! single read-modify-write inside [`RateLimiter::allow`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default bound on tracked keys.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Groups of related operations with their own limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCategory {
    /// PIN submissions.
    Auth,
    /// Plugin executions.
    PluginExecution,
    /// Calls to the dispatcher entry point.
    Api,
}

impl RateCategory {
    /// Label used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::PluginExecution => "plugin_execution",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for RateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One category's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Window length.
    pub window: Duration,
    /// Requests allowed within the window.
    pub max_requests: u32,
}

impl RateWindow {
    /// Build a window.
    #[must_use]
    pub const fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }
}

/// Limits for every category plus the key bound.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum distinct keys tracked.
    pub max_keys: usize,
    /// PIN submissions.
    pub auth: RateWindow,
    /// Plugin executions.
    pub plugin_execution: RateWindow,
    /// Dispatcher calls.
    pub api: RateWindow,
}

impl RateLimiterConfig {
    fn window(&self, category: RateCategory) -> RateWindow {
        match category {
            RateCategory::Auth => self.auth,
            RateCategory::PluginExecution => self.plugin_execution,
            RateCategory::Api => self.api,
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_keys: DEFAULT_MAX_KEYS,
            auth: RateWindow::new(Duration::from_secs(300), 5),
            plugin_execution: RateWindow::new(Duration::from_secs(60), 30),
            api: RateWindow::new(Duration::from_secs(60), 120),
        }
    }
}

type Key = (RateCategory, String);

#[derive(Debug)]
struct Bucket {
    hits: VecDeque<Instant>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct RateState {
    buckets: HashMap<Key, Bucket>,
    /// `last_used` tick → key, oldest first.
    recency: BTreeMap<u64, Key>,
    tick: u64,
}

impl RateState {
    fn touch(&mut self, key: &Key) {
        self.tick = self.tick.saturating_add(1);
        let tick = self.tick;
        if let Some(bucket) = self.buckets.get_mut(key) {
            self.recency.remove(&bucket.last_used);
            bucket.last_used = tick;
        }
        self.recency.insert(tick, key.clone());
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        self.buckets.remove(&key);
        debug!(category = %key.0, "Evicted least recently used rate limit key");
        true
    }
}

/// Bounded sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<RateState>,
}

impl RateLimiter {
    /// Build a limiter.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RateState::default()),
        }
    }

    /// Record an attempt and report whether it is within the limit.
    ///
    /// Denied attempts are not recorded, so a caller that stops retrying
    /// regains capacity once earlier hits leave the window.
    pub fn allow(&self, category: RateCategory, identity: &str) -> bool {
        let limits = self.config.window(category);
        let key: Key = (category, identity.to_string());
        let now = Instant::now();

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if !state.buckets.contains_key(&key) {
            while state.buckets.len() >= self.config.max_keys.max(1) {
                if !state.evict_lru() {
                    break;
                }
            }
            state.buckets.insert(
                key.clone(),
                Bucket {
                    hits: VecDeque::new(),
                    last_used: 0,
                },
            );
        }
        state.touch(&key);

        let Some(bucket) = state.buckets.get_mut(&key) else {
            return false;
        };
        while let Some(front) = bucket.hits.front() {
            if now.saturating_duration_since(*front) >= limits.window {
                bucket.hits.pop_front();
            } else {
                break;
            }
        }

        let limit = usize::try_from(limits.max_requests).unwrap_or(usize::MAX);
        if bucket.hits.len() < limit {
            bucket.hits.push_back(now);
            true
        } else {
            warn!(category = %category, "Rate limit exceeded");
            false
        }
    }

    /// Clear all state.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.buckets.clear();
        state.recency.clear();
    }

    /// Clear every category's state for one identity.
    pub fn reset_identity(&self, identity: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let doomed: Vec<(Key, u64)> = state
            .buckets
            .iter()
            .filter(|((_, id), _)| id == identity)
            .map(|(k, b)| (k.clone(), b.last_used))
            .collect();
        for (key, tick) in doomed {
            state.buckets.remove(&key);
            state.recency.remove(&tick);
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_keys: usize, max_requests: u32) -> RateLimiter {
        let window = RateWindow::new(Duration::from_secs(60), max_requests);
        RateLimiter::new(RateLimiterConfig {
            max_keys,
            auth: window,
            plugin_execution: window,
            api: window,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let l = limiter(100, 2);
        assert!(l.allow(RateCategory::Api, "a"));
        assert!(l.allow(RateCategory::Api, "a"));
        assert!(!l.allow(RateCategory::Api, "a"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(l.allow(RateCategory::Api, "a"));
    }

    #[tokio::test(start_paused = true)]
    async fn categories_and_identities_are_independent() {
        let l = limiter(100, 1);
        assert!(l.allow(RateCategory::Api, "a"));
        assert!(l.allow(RateCategory::Auth, "a"));
        assert!(l.allow(RateCategory::Api, "b"));
        assert!(!l.allow(RateCategory::Api, "a"));
    }

    #[tokio::test(start_paused = true)]
    async fn table_is_bounded_with_lru_eviction() {
        let l = limiter(2, 1);
        assert!(l.allow(RateCategory::Api, "a"));
        assert!(l.allow(RateCategory::Api, "b"));
        // Touch "a" so "b" becomes least recently used.
        assert!(!l.allow(RateCategory::Api, "a"));
        assert!(l.allow(RateCategory::Api, "c"));
        assert_eq!(l.tracked_keys(), 2);

        // "a" survived with its hit, "b" was evicted and starts fresh.
        assert!(!l.allow(RateCategory::Api, "a"));
        assert!(l.allow(RateCategory::Api, "b"));
        assert_eq!(l.tracked_keys(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_identity_only_clears_that_identity() {
        let l = limiter(100, 1);
        assert!(l.allow(RateCategory::Api, "a"));
        assert!(l.allow(RateCategory::Auth, "a"));
        assert!(l.allow(RateCategory::Api, "b"));

        l.reset_identity("a");
        assert!(l.allow(RateCategory::Api, "a"));
        assert!(l.allow(RateCategory::Auth, "a"));
        assert!(!l.allow(RateCategory::Api, "b"));

        l.reset();
        assert_eq!(l.tracked_keys(), 0);
        assert!(l.allow(RateCategory::Api, "b"));
    }
}
