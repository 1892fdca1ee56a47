//! Volatile gate state.
//!
//! # Data Flow
//! ```text
//! csrf guard     → CsrfTokenStore  (session id → token record)
//! rate limiter   → RateLimitStore  (identifier → window counter)
//! sweeper task   → ExpiringStore::sweep (periodic purge of dead records)
//! ```
//!
//! # Design Decisions
//! - Stores are traits so a shared cache can replace the in-process maps
//! - Each read-modify-write is a single trait call, never split by an await
//! - In-memory implementations use `DashMap` entry locking
//! - Nothing survives a restart

pub mod counter;
pub mod csrf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use counter::{MemoryRateLimitStore, RateLimitCounter, RateLimitStore};
pub use csrf::{CsrfTokenRecord, CsrfTokenStore, MemoryCsrfTokenStore, TokenCheck};

/// A store whose records expire and must be purged periodically.
#[async_trait]
pub trait ExpiringStore: Send + Sync + 'static {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Delete every record that is dead at `now`. Returns how many went.
    async fn sweep(&self, now: DateTime<Utc>) -> usize;

    /// Number of records currently held.
    async fn len(&self) -> usize;
}
