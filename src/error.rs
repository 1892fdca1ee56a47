//! Gate error taxonomy.
//!
//! Every gate produces its full error response (status, body, headers)
//! through [`GateError`]'s `IntoResponse` implementation. Internal causes are
//! logged and never written to the response body.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors that terminate the gating chain.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No principal could be resolved for the request.
    #[error("unauthorized")]
    Unauthorized,

    /// The request carries no session identifier.
    #[error("session id required")]
    SessionRequired,

    /// The principal fails a role or permission requirement.
    #[error("insufficient permissions")]
    Forbidden,

    /// A state-changing request carries no CSRF token.
    #[error("CSRF token required")]
    CsrfTokenMissing,

    /// The CSRF token is unknown, expired, already used or wrong.
    #[error("invalid CSRF token")]
    CsrfTokenInvalid,

    /// A form body could not be buffered within the configured limit.
    #[error("request body too large")]
    BodyTooLarge,

    /// The caller exceeded its request quota for the current window.
    #[error("rate limit exceeded for profile '{profile}'")]
    RateLimitExceeded {
        profile: String,
        message: String,
        retry_after_secs: u64,
        headers: HeaderMap,
    },

    /// Unexpected failure inside a gate.
    #[error("internal gate failure: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl GateError {
    /// Wrap an unexpected failure.
    pub fn internal<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        GateError::Internal(source.into())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::Unauthorized | GateError::SessionRequired => StatusCode::UNAUTHORIZED,
            GateError::Forbidden | GateError::CsrfTokenMissing | GateError::CsrfTokenInvalid => {
                StatusCode::FORBIDDEN
            }
            GateError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message written to the `error` field of the response body.
    pub fn public_message(&self) -> &str {
        match self {
            GateError::Unauthorized => "Unauthorized",
            GateError::SessionRequired => "Session ID required",
            GateError::Forbidden => "Insufficient permissions",
            GateError::CsrfTokenMissing => "CSRF token required",
            GateError::CsrfTokenInvalid => "Invalid CSRF token",
            GateError::BodyTooLarge => "Request body too large",
            GateError::RateLimitExceeded { message, .. } => message,
            GateError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            GateError::RateLimitExceeded {
                message,
                retry_after_secs,
                mut headers,
                ..
            } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                let body = Json(json!({
                    "error": message,
                    "retryAfter": retry_after_secs,
                }));
                (status, headers, body).into_response()
            }
            GateError::Internal(source) => {
                tracing::error!(error = %source, "Gate failed with internal error");
                (status, Json(json!({ "error": "Internal server error" }))).into_response()
            }
            other => (status, Json(json!({ "error": other.public_message() }))).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GateError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(GateError::SessionRequired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(GateError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(GateError::CsrfTokenMissing.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(GateError::CsrfTokenInvalid.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(GateError::BodyTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            GateError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_forbidden_body() {
        let response = GateError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Insufficient permissions" })
        );
    }

    #[tokio::test]
    async fn test_internal_error_does_not_leak_cause() {
        let response = GateError::internal("database password is hunter2").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_rate_limit_response_carries_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", HeaderValue::from(5u32));

        let response = GateError::RateLimitExceeded {
            profile: "auth".into(),
            message: "slow down".into(),
            retry_after_secs: 42,
            headers,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(
            body_json(response).await,
            json!({ "error": "slow down", "retryAfter": 42 })
        );
    }
}
