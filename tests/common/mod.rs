//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

use cms_gate::config::{GatewayConfig, SessionConfig};
use cms_gate::http::HttpServer;
use cms_gate::lifecycle::Shutdown;

pub const ADMIN: &str = "admin-session";
pub const EDITOR: &str = "editor-session";
pub const VIEWER: &str = "viewer-session";

fn session(token: &str, id: &str, role: &str, permissions: &[&str]) -> SessionConfig {
    SessionConfig {
        token: token.to_string(),
        id: id.to_string(),
        name: format!("{id} user"),
        email: format!("{id}@example.com"),
        role: role.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
    }
}

/// Default config plus three principals. Each principal's token doubles as
/// its session id, so one `x-session-id` header drives both the
/// authorization gate and the CSRF guard.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.sessions = vec![
        session(
            ADMIN,
            "u-admin",
            "admin",
            &["content:view", "content:create", "content:edit", "content:delete", "users:manage"],
        ),
        session(
            EDITOR,
            "u-editor",
            "editor",
            &["content:view", "content:create", "content:edit", "media:view", "media:upload"],
        ),
        session(VIEWER, "u-viewer", "viewer", &["content:view", "media:view"]),
    ];
    config
}

pub fn app() -> Router {
    HttpServer::new(test_config()).router()
}

pub fn app_with(config: GatewayConfig) -> Router {
    HttpServer::new(config).router()
}

/// Request builder with an optional session id and client address.
pub fn request(method: &str, uri: &str, session: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.10");
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    builder
}

pub fn json_request(method: &str, uri: &str, session: Option<&str>, csrf: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = request(method, uri, session).header("content-type", "application/json");
    if let Some(token) = csrf {
        builder = builder.header("x-csrf-token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Issue a CSRF token for `session` through the public endpoint.
pub async fn csrf_token(app: &Router, session: &str) -> String {
    let response = send(
        app,
        request("GET", "/api/csrf-token", Some(session))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), 200);
    body_json(response).await["csrfToken"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Start a real server on an ephemeral port.
pub async fn start_server(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(config);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });

    (addr, shutdown)
}
