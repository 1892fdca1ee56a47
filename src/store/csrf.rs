//! CSRF token records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use subtle::ConstantTimeEq;

use super::ExpiringStore;

/// The one active token for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfTokenRecord {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CsrfTokenRecord {
    /// Still usable at `expires_at` itself; dead strictly after it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Constant-time comparison against a candidate token.
    pub fn matches(&self, candidate: &str) -> bool {
        self.token.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

/// Outcome of checking a candidate token against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// Token matched and has been consumed.
    Valid,
    /// No record for the session.
    Missing,
    /// Record had expired; it has been purged.
    Expired,
    /// Record exists but the candidate differs; record kept.
    Mismatch,
}

/// Storage for per-session CSRF tokens.
#[async_trait]
pub trait CsrfTokenStore: ExpiringStore {
    async fn get(&self, session_id: &str) -> Option<CsrfTokenRecord>;

    /// Store a record, replacing any previous one for the session.
    async fn set(&self, session_id: &str, record: CsrfTokenRecord);

    async fn delete(&self, session_id: &str) -> bool;

    /// Check `candidate` and consume the record on success, atomically.
    async fn consume(&self, session_id: &str, candidate: &str, now: DateTime<Utc>) -> TokenCheck;
}

/// In-process token store.
#[derive(Clone, Default)]
pub struct MemoryCsrfTokenStore {
    inner: Arc<DashMap<String, CsrfTokenRecord>>,
}

impl MemoryCsrfTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiringStore for MemoryCsrfTokenStore {
    fn name(&self) -> &'static str {
        "csrf"
    }

    async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.inner.len())
    }

    async fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl CsrfTokenStore for MemoryCsrfTokenStore {
    async fn get(&self, session_id: &str) -> Option<CsrfTokenRecord> {
        self.inner.get(session_id).map(|r| r.value().clone())
    }

    async fn set(&self, session_id: &str, record: CsrfTokenRecord) {
        self.inner.insert(session_id.to_string(), record);
    }

    async fn delete(&self, session_id: &str) -> bool {
        self.inner.remove(session_id).is_some()
    }

    async fn consume(&self, session_id: &str, candidate: &str, now: DateTime<Utc>) -> TokenCheck {
        match self.inner.entry(session_id.to_string()) {
            Entry::Vacant(_) => TokenCheck::Missing,
            Entry::Occupied(entry) => {
                if entry.get().is_expired(now) {
                    entry.remove();
                    TokenCheck::Expired
                } else if entry.get().matches(candidate) {
                    entry.remove();
                    TokenCheck::Valid
                } else {
                    TokenCheck::Mismatch
                }
            }
        }
    }
}
