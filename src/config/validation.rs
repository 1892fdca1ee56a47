//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows, quotas, TTLs, intervals > 0 and at most a year)
//! - Detect duplicate session tokens
//! - Check the bind addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Upper bound for TTLs, windows and sweep intervals, in seconds.
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Checks a duration field is in `1..=MAX_DURATION_SECS`.
fn check_duration(errors: &mut Vec<ValidationError>, field: impl Into<String>, secs: u64) {
    if secs == 0 {
        errors.push(ValidationError::new(field, "must be > 0"));
    } else if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::new(
            field,
            format!("must be at most {MAX_DURATION_SECS} seconds"),
        ));
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    check_duration(&mut errors, "csrf.token_ttl_secs", config.csrf.token_ttl_secs);
    check_duration(&mut errors, "csrf.sweep_interval_secs", config.csrf.sweep_interval_secs);

    check_duration(
        &mut errors,
        "rate_limit.sweep_interval_secs",
        config.rate_limit.sweep_interval_secs,
    );
    for (name, profile) in config.rate_limit.profiles() {
        check_duration(&mut errors, format!("rate_limit.{name}.window_secs"), profile.window_secs);
        if profile.max == 0 {
            errors.push(ValidationError::new(format!("rate_limit.{name}.max"), "must be > 0"));
        }
        if matches!(&profile.identifier, Some(id) if id.trim().is_empty()) {
            errors.push(ValidationError::new(
                format!("rate_limit.{name}.identifier"),
                "must not be blank",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut tokens = HashSet::new();
    for (i, session) in config.sessions.iter().enumerate() {
        if session.token.trim().is_empty() {
            errors.push(ValidationError::new(format!("sessions[{i}].token"), "must not be blank"));
        } else if !tokens.insert(session.token.as_str()) {
            errors.push(ValidationError::new(
                format!("sessions[{i}].token"),
                "duplicates an earlier session token",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
