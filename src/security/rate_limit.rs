//! Fixed-window rate limiting middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use crate::config::RateLimitProfile;
use crate::error::GateError;
use crate::observability::metrics;
use crate::store::RateLimitStore;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// How callers are told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Per client address, taken from proxy headers.
    ClientIp,
    /// One bucket shared by everyone.
    Static(String),
}

impl Identifier {
    pub fn resolve(&self, headers: &HeaderMap) -> String {
        match self {
            Identifier::ClientIp => format!("ip:{}", client_ip(headers)),
            Identifier::Static(id) => id.clone(),
        }
    }
}

/// Client address as reported by the fronting proxy.
///
/// First entry of `x-forwarded-for`, then `x-real-ip`, then `"unknown"`.
/// Neither header is authenticated.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

/// Result of counting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the window resets, rounded up.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// `X-RateLimit-*` headers describing this decision.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        let reset = self.reset_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&reset) {
            headers.insert(X_RATELIMIT_RESET, value);
        }
        headers
    }
}

/// One named limiter profile bound to a counter store.
pub struct RateLimiter {
    name: String,
    profile: RateLimitProfile,
    window: TimeDelta,
    identifier: Identifier,
    enabled: bool,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(
        name: impl Into<String>,
        profile: RateLimitProfile,
        store: Arc<dyn RateLimitStore>,
    ) -> Self {
        let window = TimeDelta::from_std(profile.window()).unwrap_or(TimeDelta::MAX);
        let identifier = match &profile.identifier {
            Some(id) => Identifier::Static(id.clone()),
            None => Identifier::ClientIp,
        };

        Self {
            name: name.into(),
            profile,
            window,
            identifier,
            enabled: true,
            store,
        }
    }

    /// A disabled limiter passes everything through without counting.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Count a request from `identifier` at `now`.
    pub async fn check(&self, identifier: &str, now: DateTime<Utc>) -> Result<RateLimitDecision, GateError> {
        let key = format!("{}:{}", self.name, identifier);
        let counter = self
            .store
            .hit(&key, self.window, now)
            .await
            .ok_or_else(|| GateError::internal(format!("rate limit window for '{}' is out of range", self.name)))?;

        let remaining_ms = (counter.window_reset_at - now).num_milliseconds().max(0);
        Ok(RateLimitDecision {
            allowed: counter.count <= self.profile.max,
            limit: self.profile.max,
            remaining: self.profile.max.saturating_sub(counter.count),
            reset_at: counter.window_reset_at,
            retry_after_secs: u64::try_from((remaining_ms + 999) / 1000).unwrap_or(0),
        })
    }

    /// Count the request and turn a refusal into a gate error.
    ///
    /// On success returns the headers to merge into the handler's response.
    pub async fn enforce(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Result<HeaderMap, GateError> {
        if !self.enabled {
            return Ok(HeaderMap::new());
        }

        let identifier = self.identifier.resolve(headers);
        let decision = self.check(&identifier, now).await?;

        if decision.allowed {
            return Ok(decision.headers());
        }

        tracing::warn!(
            profile = %self.name,
            client = %identifier,
            retry_after_secs = decision.retry_after_secs,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(&self.name);

        Err(GateError::RateLimitExceeded {
            profile: self.name.clone(),
            message: self.profile.message.clone(),
            retry_after_secs: decision.retry_after_secs,
            headers: decision.headers(),
        })
    }
}

/// Middleware function for fixed-window rate limiting.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match limiter.enforce(request.headers(), Utc::now()).await {
        Ok(headers) => {
            let mut response = next.run(request).await;
            for (name, value) in headers.iter() {
                response.headers_mut().insert(name.clone(), value.clone());
            }
            response
        }
        Err(err) => err.into_response(),
    }
}
