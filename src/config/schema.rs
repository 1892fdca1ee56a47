//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::principal::Principal;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, timeouts, body limit).
    pub listener: ListenerConfig,

    /// CSRF token settings.
    pub csrf: CsrfConfig,

    /// Rate limiting profiles.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Static sessions for the built-in session provider.
    pub sessions: Vec<SessionConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// CSRF token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// Interval between sweeps of expired tokens, in seconds.
    pub sweep_interval_secs: u64,

    /// Largest form body buffered when looking for a `csrf_token` field.
    pub max_form_bytes: usize,
}

impl CsrfConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 60 * 60,
            sweep_interval_secs: 5 * 60,
            max_form_bytes: 64 * 1024,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Interval between sweeps of elapsed counters, in seconds.
    pub sweep_interval_secs: u64,

    /// Authentication endpoints (sign-in, registration).
    #[serde(default = "RateLimitProfile::auth")]
    pub auth: RateLimitProfile,

    /// Content CRUD endpoints.
    #[serde(default = "RateLimitProfile::content")]
    pub content: RateLimitProfile,

    /// Media uploads.
    #[serde(default = "RateLimitProfile::upload")]
    pub upload: RateLimitProfile,

    /// Everything else under the API.
    #[serde(default = "RateLimitProfile::api")]
    pub api: RateLimitProfile,
}

impl RateLimitConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// All profiles with their names.
    pub fn profiles(&self) -> [(&'static str, &RateLimitProfile); 4] {
        [
            ("auth", &self.auth),
            ("content", &self.content),
            ("upload", &self.upload),
            ("api", &self.api),
        ]
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 5 * 60,
            auth: RateLimitProfile::auth(),
            content: RateLimitProfile::content(),
            upload: RateLimitProfile::upload(),
            api: RateLimitProfile::api(),
        }
    }
}

/// One fixed-window rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitProfile {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests allowed per window.
    pub max: u32,

    /// Message returned when the limit is hit.
    pub message: String,

    /// Fixed identifier shared by all callers. Unset means per client IP.
    pub identifier: Option<String>,
}

impl RateLimitProfile {
    pub fn new(window_secs: u64, max: u32, message: impl Into<String>) -> Self {
        Self {
            window_secs,
            max,
            message: message.into(),
            identifier: None,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn auth() -> Self {
        Self::new(
            15 * 60,
            5,
            "Too many authentication attempts, please try again later.",
        )
    }

    pub fn content() -> Self {
        Self::new(60, 30, "Too many content requests, please try again later.")
    }

    pub fn upload() -> Self {
        Self::new(60, 5, "Too many upload attempts, please try again later.")
    }

    pub fn api() -> Self {
        Self::new(
            15 * 60,
            100,
            "API rate limit exceeded, please try again later.",
        )
    }
}

impl Default for RateLimitProfile {
    fn default() -> Self {
        Self::new(15 * 60, 100, "Too many requests, please try again later.")
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A principal known to the static session provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Bearer token or session id that resolves to this principal.
    pub token: String,

    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,

    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl SessionConfig {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            permissions: self.permissions.clone(),
        }
    }
}
