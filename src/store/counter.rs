//! Fixed-window request counters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{mapref::entry::Entry, DashMap};

use super::ExpiringStore;

/// Requests seen from one identifier in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCounter {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl RateLimitCounter {
    /// First request of a new window, or `None` when the window end is
    /// past the representable date range.
    pub fn start(now: DateTime<Utc>, window: TimeDelta) -> Option<Self> {
        Some(Self {
            count: 1,
            window_reset_at: now.checked_add_signed(window)?,
        })
    }

    /// The window is `[reset - window, reset)`; at `reset` it is over.
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.window_reset_at <= now
    }
}

/// Storage for rate-limit counters.
#[async_trait]
pub trait RateLimitStore: ExpiringStore {
    async fn get(&self, key: &str) -> Option<RateLimitCounter>;

    async fn set(&self, key: &str, counter: RateLimitCounter);

    async fn delete(&self, key: &str) -> bool;

    /// Record one request for `key` and return the updated counter.
    ///
    /// Starts a new window when none exists or the current one has elapsed;
    /// otherwise increments. Must be atomic per key. `None` when a new window
    /// cannot be represented; the stored counter is left as it was.
    async fn hit(&self, key: &str, window: TimeDelta, now: DateTime<Utc>) -> Option<RateLimitCounter>;
}

/// In-process counter store.
#[derive(Clone, Default)]
pub struct MemoryRateLimitStore {
    inner: Arc<DashMap<String, RateLimitCounter>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiringStore for MemoryRateLimitStore {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, counter| !counter.window_elapsed(now));
        before.saturating_sub(self.inner.len())
    }

    async fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn get(&self, key: &str) -> Option<RateLimitCounter> {
        self.inner.get(key).map(|r| *r.value())
    }

    async fn set(&self, key: &str, counter: RateLimitCounter) {
        self.inner.insert(key.to_string(), counter);
    }

    async fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    async fn hit(&self, key: &str, window: TimeDelta, now: DateTime<Utc>) -> Option<RateLimitCounter> {
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let counter = entry.get_mut();
                if counter.window_elapsed(now) {
                    *counter = RateLimitCounter::start(now, window)?;
                } else {
                    counter.count = counter.count.saturating_add(1);
                }
                Some(*counter)
            }
            Entry::Vacant(entry) => {
                let counter = RateLimitCounter::start(now, window)?;
                Some(*entry.insert(counter))
            }
        }
    }
}
