//! CSRF guard middleware.
//!
//! One token per session, issued on `GET`, spent by the next state-changing
//! request. Tokens live in a [`CsrfTokenStore`] and are purged by the sweeper
//! once expired.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, request::Parts, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde_json::json;

use crate::config::CsrfConfig;
use crate::error::GateError;
use crate::observability::metrics;
use crate::security::session::session_id;
use crate::store::{CsrfTokenRecord, CsrfTokenStore, TokenCheck};

pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";
pub const CSRF_FORM_FIELD: &str = "csrf_token";

/// 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Body encodings searched for a `csrf_token` field.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FormKind {
    UrlEncoded,
    Multipart { boundary: String },
}

#[derive(Clone)]
pub struct CsrfGuard {
    store: Arc<dyn CsrfTokenStore>,
    ttl: TimeDelta,
    max_form_bytes: usize,
}

impl CsrfGuard {
    pub fn new(store: Arc<dyn CsrfTokenStore>, config: &CsrfConfig) -> Self {
        Self {
            store,
            ttl: TimeDelta::from_std(config.token_ttl()).unwrap_or(TimeDelta::MAX),
            max_form_bytes: config.max_form_bytes,
        }
    }

    /// Issue a fresh token for the session, replacing any previous one.
    pub async fn issue(&self, session_id: &str, now: DateTime<Utc>) -> Result<String, GateError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| GateError::internal("CSRF token expiry is out of range"))?;

        let token = generate_token();
        let record = CsrfTokenRecord {
            token: token.clone(),
            expires_at,
        };
        self.store.set(session_id, record).await;

        metrics::record_csrf_issued();
        tracing::debug!(session = %session_id, "CSRF token issued");
        Ok(token)
    }

    /// Check a candidate token and spend it on success.
    pub async fn validate(
        &self,
        session_id: &str,
        candidate: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), GateError> {
        let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
            metrics::record_csrf_validation("missing");
            return Err(GateError::CsrfTokenMissing);
        };

        let outcome = match self.store.consume(session_id, candidate, now).await {
            TokenCheck::Valid => {
                metrics::record_csrf_validation("valid");
                return Ok(());
            }
            TokenCheck::Missing => "absent",
            TokenCheck::Expired => "expired",
            TokenCheck::Mismatch => "mismatch",
        };

        tracing::warn!(session = %session_id, outcome, "CSRF validation failed");
        metrics::record_csrf_validation(outcome);
        Err(GateError::CsrfTokenInvalid)
    }

    /// Pull the candidate token out of the request.
    ///
    /// A non-empty header wins. Otherwise a url-encoded or multipart body is
    /// buffered, searched for `csrf_token`, and put back so the handler
    /// still sees it.
    async fn candidate(&self, request: Request<Body>) -> Result<(Request<Body>, Option<String>), GateError> {
        let header_token = request
            .headers()
            .get(CSRF_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);
        if header_token.is_some() {
            return Ok((request, header_token));
        }

        let (parts, body) = request.into_parts();
        let Some(kind) = form_kind(&parts) else {
            return Ok((Request::from_parts(parts, body), None));
        };

        let bytes: Bytes = axum::body::to_bytes(body, self.max_form_bytes)
            .await
            .map_err(|_| GateError::BodyTooLarge)?;

        let token = match kind {
            FormKind::UrlEncoded => url::form_urlencoded::parse(&bytes)
                .find(|(key, _)| key == CSRF_FORM_FIELD)
                .map(|(_, value)| value.into_owned()),
            FormKind::Multipart { boundary } => multipart_field(bytes.clone(), boundary).await,
        };

        Ok((Request::from_parts(parts, Body::from(bytes)), token))
    }
}

fn form_kind(parts: &Parts) -> Option<FormKind> {
    let content_type = parts.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Some(FormKind::UrlEncoded);
    }
    if content_type.starts_with("multipart/form-data") {
        let boundary = multer::parse_boundary(content_type).ok()?;
        return Some(FormKind::Multipart { boundary });
    }
    None
}

/// First `csrf_token` text part of a buffered multipart body.
///
/// A body that does not parse carries no token.
async fn multipart_field(bytes: Bytes, boundary: String) -> Option<String> {
    let stream = futures_util::stream::iter([Ok::<_, Infallible>(bytes)]);
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some(CSRF_FORM_FIELD) {
            return field.text().await.ok();
        }
    }
    None
}

/// Middleware function for the CSRF guard.
pub async fn csrf_middleware(
    State(guard): State<CsrfGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(session) = session_id(request.headers()).map(str::to_owned) else {
        return GateError::SessionRequired.into_response();
    };

    let method = request.method().clone();
    match method {
        Method::GET => match guard.issue(&session, Utc::now()).await {
            Ok(token) => Json(json!({ "csrfToken": token })).into_response(),
            Err(err) => err.into_response(),
        },
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH => {
            let (request, candidate) = match guard.candidate(request).await {
                Ok(found) => found,
                Err(err) => return err.into_response(),
            };
            match guard.validate(&session, candidate.as_deref(), Utc::now()).await {
                Ok(()) => next.run(request).await,
                Err(err) => err.into_response(),
            }
        }
        _ => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCsrfTokenStore;
    use axum::{http::StatusCode, middleware, routing::any, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(Arc::new(MemoryCsrfTokenStore::new()), &CsrfConfig::default())
    }

    fn app(guard: CsrfGuard, calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/form",
                any(move |body: String| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        body
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(guard, csrf_middleware))
    }

    fn request(method: &str, session: Option<&str>, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri("/form");
        if let Some(session) = session {
            builder = builder.header("x-session-id", session);
        }
        if let Some(token) = token {
            builder = builder.header(CSRF_TOKEN_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_issue_use_and_reuse() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = app(guard(), calls.clone());

        let resp = app.clone().oneshot(request("GET", Some("s1"), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let token = json_body(resp).await["csrfToken"].as_str().unwrap().to_string();
        assert_eq!(token.len(), 64);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let resp = app
            .clone()
            .oneshot(request("POST", Some("s1"), Some(&token)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let resp = app
            .clone()
            .oneshot(request("POST", Some("s1"), Some(&token)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["error"], "Invalid CSRF token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_session_id_on_any_method() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = app(guard(), calls.clone());

        for method in ["GET", "POST"] {
            let resp = app.clone().oneshot(request(method, None, Some("x"))).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(resp).await["error"], "Session ID required");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mutation_without_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resp = app(guard(), calls.clone())
            .oneshot(request("DELETE", Some("s1"), None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["error"], "CSRF token required");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_form_field_fallback_keeps_body() {
        let guard = guard();
        let token = guard.issue("s1", Utc::now()).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let form = format!("title=Hello+World&csrf_token={token}");
        let req = Request::builder()
            .method("PUT")
            .uri("/form")
            .header("x-session-id", "s1")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.clone()))
            .unwrap();

        let resp = app(guard, calls.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, form.as_bytes());
    }

    #[tokio::test]
    async fn test_multipart_field_fallback_keeps_body() {
        let guard = guard();
        let token = guard.issue("s1", Utc::now()).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let form = format!(
            "--XX\r\nContent-Disposition: form-data; name=\"alt\"\r\n\r\ncover\r\n\
             --XX\r\nContent-Disposition: form-data; name=\"csrf_token\"\r\n\r\n{token}\r\n\
             --XX--\r\n"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/form")
            .header("x-session-id", "s1")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XX")
            .body(Body::from(form.clone()))
            .unwrap();

        let resp = app(guard, calls.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, form.as_bytes());
    }

    #[tokio::test]
    async fn test_multipart_without_token_field() {
        let form = "--XX\r\nContent-Disposition: form-data; name=\"alt\"\r\n\r\ncover\r\n--XX--\r\n";
        let req = Request::builder()
            .method("POST")
            .uri("/form")
            .header("x-session-id", "s1")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XX")
            .body(Body::from(form))
            .unwrap();

        let resp = app(guard(), Arc::new(AtomicUsize::new(0))).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["error"], "CSRF token required");
    }

    #[tokio::test]
    async fn test_empty_header_falls_back_to_form_field() {
        let guard = guard();
        let token = guard.issue("s1", Utc::now()).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let req = Request::builder()
            .method("POST")
            .uri("/form")
            .header("x-session-id", "s1")
            .header(CSRF_TOKEN_HEADER, "")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("csrf_token={token}")))
            .unwrap();

        let resp = app(guard, calls.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_is_internal_error() {
        let guard = CsrfGuard::new(
            Arc::new(MemoryCsrfTokenStore::new()),
            &CsrfConfig {
                token_ttl_secs: 10_000_000_000_000,
                ..CsrfConfig::default()
            },
        );

        assert!(matches!(
            guard.issue("s1", Utc::now()).await,
            Err(GateError::Internal(_))
        ));

        let resp = app(guard, Arc::new(AtomicUsize::new(0)))
            .oneshot(request("GET", Some("s1"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_oversized_form_is_rejected() {
        let guard = CsrfGuard::new(
            Arc::new(MemoryCsrfTokenStore::new()),
            &CsrfConfig {
                max_form_bytes: 8,
                ..CsrfConfig::default()
            },
        );
        let req = Request::builder()
            .method("POST")
            .uri("/form")
            .header("x-session-id", "s1")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("csrf_token=0123456789abcdef"))
            .unwrap();

        let resp = app(guard, Arc::new(AtomicUsize::new(0))).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_other_methods_pass_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resp = app(guard(), calls.clone())
            .oneshot(request("OPTIONS", Some("s1"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_is_invalid_and_purged() {
        let store = Arc::new(MemoryCsrfTokenStore::new());
        let guard = CsrfGuard::new(store.clone(), &CsrfConfig::default());
        let issued_at = Utc::now() - TimeDelta::hours(2);
        let token = guard.issue("s1", issued_at).await.unwrap();

        let err = guard.validate("s1", Some(&token), Utc::now()).await.unwrap_err();
        assert!(matches!(err, GateError::CsrfTokenInvalid));
        assert!(store.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_token_valid_until_expiry_instant() {
        let guard = guard();
        let now = Utc::now();
        let token = guard.issue("s1", now).await.unwrap();
        assert!(guard.validate("s1", Some(&token), now + TimeDelta::hours(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_mismatch_keeps_the_real_token() {
        let guard = guard();
        let now = Utc::now();
        let token = guard.issue("s1", now).await.unwrap();

        assert!(guard.validate("s1", Some("forged"), now).await.is_err());
        assert!(guard.validate("s1", Some(&token), now).await.is_ok());
    }

    #[tokio::test]
    async fn test_new_token_supersedes_old() {
        let guard = guard();
        let now = Utc::now();
        let first = guard.issue("s1", now).await.unwrap();
        let second = guard.issue("s1", now).await.unwrap();

        assert!(guard.validate("s1", Some(&first), now).await.is_err());
        assert!(guard.validate("s1", Some(&second), now).await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let guard = guard();
        let now = Utc::now();
        let token = guard.issue("s1", now).await.unwrap();

        let err = guard.validate("s2", Some(&token), now).await.unwrap_err();
        assert!(matches!(err, GateError::CsrfTokenInvalid));
    }
}
