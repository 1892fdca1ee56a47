//! Authorization gate middleware.
//! Enforces role and permission requirements in front of a handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GateError;
use crate::observability::metrics;
use crate::security::principal::Principal;
use crate::security::requirement::Requirement;
use crate::security::session::SessionProvider;

/// State for one gated route: where principals come from and what they need.
#[derive(Clone)]
pub struct AuthorizationGate {
    sessions: Arc<dyn SessionProvider>,
    requirement: Arc<Requirement>,
}

impl AuthorizationGate {
    pub fn new(sessions: Arc<dyn SessionProvider>, requirement: impl Into<Requirement>) -> Self {
        Self {
            sessions,
            requirement: Arc::new(requirement.into()),
        }
    }

    /// Resolve the principal and check it against the requirement.
    pub async fn authorize(&self, parts: &Parts) -> Result<Principal, GateError> {
        let principal = self
            .sessions
            .resolve(parts)
            .await
            .map_err(GateError::internal)?;

        let Some(principal) = principal else {
            metrics::record_authorization_denied("unauthenticated");
            return Err(GateError::Unauthorized);
        };

        if !self.requirement.is_satisfied_by(&principal) {
            tracing::warn!(
                principal = %principal.id,
                role = %principal.role,
                requirement = %self.requirement,
                path = %parts.uri.path(),
                "Authorization denied"
            );
            metrics::record_authorization_denied("forbidden");
            return Err(GateError::Forbidden);
        }

        Ok(principal)
    }
}

/// Middleware function for the authorization gate.
///
/// On success the principal is attached to the request extensions, where
/// handlers pick it up with `Extension<Principal>`.
pub async fn authorization_middleware(
    State(gate): State<AuthorizationGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    match gate.authorize(&parts).await {
        Ok(principal) => {
            tracing::debug!(principal = %principal.id, requirement = %gate.requirement, "Authorized");
            parts.extensions.insert(principal);
            next.run(Request::from_parts(parts, body)).await
        }
        Err(err) => err.into_response(),
    }
}
