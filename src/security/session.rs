//! Session collaborator.
//!
//! Authentication itself (sign-in, JWT renewal, expiry) lives outside this
//! crate. The gates only need a way to turn a request into an optional
//! [`Principal`], which is what [`SessionProvider`] describes.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, request::Parts, HeaderMap};

use crate::config::SessionConfig;
use crate::security::principal::Principal;

/// Header carrying the caller's session identifier.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Failure of the session backend itself (not an unauthenticated caller).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the principal behind a request.
///
/// `Ok(None)` means the caller is not signed in; `Err` means the backend
/// could not answer.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    async fn resolve(&self, parts: &Parts) -> Result<Option<Principal>, SessionError>;
}

/// Session id sent by the client, if any.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Session provider backed by a fixed token → principal table.
///
/// Stands in for the real identity provider in development and tests.
/// A request is matched by its bearer token first, then by `x-session-id`.
#[derive(Debug, Default, Clone)]
pub struct StaticSessionProvider {
    sessions: HashMap<String, Principal>,
}

impl StaticSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(sessions: &[SessionConfig]) -> Self {
        let mut provider = Self::new();
        for session in sessions {
            provider.insert(session.token.clone(), session.principal());
        }
        provider
    }

    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.sessions.insert(token.into(), principal);
    }

    pub fn with_session(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.insert(token, principal);
        self
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn resolve(&self, parts: &Parts) -> Result<Option<Principal>, SessionError> {
        let token = bearer_token(&parts.headers).or_else(|| session_id(&parts.headers));
        Ok(token.and_then(|t| self.sessions.get(t).cloned()))
    }
}
