//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with every API route and its gate chain
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Own the gate stores and their sweepers
//! - Serve until the shutdown broadcast fires
//!
//! # Gate order
//! ```text
//! rate limit → authorization gate → CSRF guard (mutations) → handler
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    handler::Handler,
    http::{Request, StatusCode},
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, RateLimitProfile};
use crate::http::handlers;
use crate::http::request::{request_id, MakeRequestUuid};
use crate::lifecycle::{Shutdown, Sweeper};
use crate::security::principal::ADMIN_ROLE;
use crate::security::{
    authorization_middleware, csrf_middleware, rate_limit_middleware, AccessPolicy,
    AuthorizationGate, CsrfGuard, RateLimiter, Requirement, SessionProvider,
    StaticSessionProvider,
};
use crate::store::{CsrfTokenStore, MemoryCsrfTokenStore, MemoryRateLimitStore, RateLimitStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sessions: Arc<dyn SessionProvider>,
    pub csrf_store: Arc<dyn CsrfTokenStore>,
    pub rate_limit_store: Arc<dyn RateLimitStore>,
}

/// HTTP server for the gated API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Server with in-memory stores and the sessions declared in config.
    pub fn new(config: GatewayConfig) -> Self {
        let sessions = Arc::new(StaticSessionProvider::from_config(&config.sessions));
        Self::with_sessions(config, sessions)
    }

    /// Server with in-memory stores and a custom session provider.
    pub fn with_sessions(config: GatewayConfig, sessions: Arc<dyn SessionProvider>) -> Self {
        let state = AppState {
            config: Arc::new(config),
            sessions,
            csrf_store: Arc::new(MemoryCsrfTokenStore::new()),
            rate_limit_store: Arc::new(MemoryRateLimitStore::new()),
        };
        Self::with_state(state)
    }

    /// Server over fully caller-supplied state (shared stores, say).
    pub fn with_state(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// The complete application, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum router with all gate chains and middleware layers.
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();
        let sessions = state.sessions.clone();
        let counters = state.rate_limit_store.clone();

        let limit = |name: &str, profile: &RateLimitProfile| {
            let limiter = RateLimiter::new(name, profile.clone(), counters.clone())
                .with_enabled(config.rate_limit.enabled);
            middleware::from_fn_with_state(Arc::new(limiter), rate_limit_middleware)
        };
        let gate = |requirement: Requirement| {
            middleware::from_fn_with_state(
                AuthorizationGate::new(sessions.clone(), requirement),
                authorization_middleware,
            )
        };
        let csrf = middleware::from_fn_with_state(
            CsrfGuard::new(state.csrf_store.clone(), &config.csrf),
            csrf_middleware,
        );

        let auth_limit = limit("auth", &config.rate_limit.auth);
        let api_limit = limit("api", &config.rate_limit.api);

        let upload_policy = AccessPolicy {
            required_any_permission: Some(vec!["media:upload".into(), "content:edit".into()]),
            ..AccessPolicy::default()
        };

        let api = Router::new()
            .route("/api/health", get(handlers::health))
            .route(
                "/api/csrf-token",
                get(handlers::csrf_token_info)
                    .post(handlers::csrf_echo)
                    .put(handlers::csrf_echo)
                    .delete(handlers::csrf_delete)
                    .route_layer(csrf.clone()),
            )
            .route(
                "/api/auth/session",
                get(handlers::session
                    .layer(gate(Requirement::authenticated()))
                    .layer(api_limit.clone())),
            )
            .route(
                "/api/users/register",
                post(handlers::register.layer(auth_limit)),
            )
            .route(
                "/api/content",
                get(handlers::list_content.layer(gate(Requirement::permission("content:view"))))
                    .post(
                        handlers::create_content
                            .layer(csrf.clone())
                            .layer(gate(Requirement::permission("content:create"))),
                    )
                    .put(
                        handlers::update_content
                            .layer(csrf.clone())
                            .layer(gate(Requirement::permission("content:edit"))),
                    )
                    .delete(
                        handlers::delete_content
                            .layer(csrf.clone())
                            .layer(gate(Requirement::permission("content:delete"))),
                    )
                    .route_layer(limit("content", &config.rate_limit.content)),
            )
            .route(
                "/api/media",
                get(handlers::list_media.layer(gate(Requirement::permission("media:view")))).post(
                    handlers::upload_media
                        .layer(csrf.clone())
                        .layer(gate(upload_policy.requirement()))
                        .layer(limit("upload", &config.rate_limit.upload)),
                ),
            )
            .route(
                "/api/admin/gate",
                get(handlers::gate_stats
                    .layer(gate(Requirement::role(ADMIN_ROLE)))
                    .layer(api_limit)),
            )
            .with_state(state);

        api.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.listener.request_timeout_secs),
        ))
        .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id(request.headers()),
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Sweepers for both stores run alongside and stop with the server.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit_enabled = self.state.config.rate_limit.enabled,
            "HTTP server starting"
        );

        let sweepers = [
            Sweeper::new(
                self.state.csrf_store.clone(),
                self.state.config.csrf.sweep_interval(),
            )
            .spawn(shutdown),
            Sweeper::new(
                self.state.rate_limit_store.clone(),
                self.state.config.rate_limit.sweep_interval(),
            )
            .spawn(shutdown),
        ];

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await;

        // Stop the sweepers even when serving ended on an error.
        shutdown.trigger();
        for sweeper in sweepers {
            if let Err(e) = sweeper.await {
                tracing::warn!(error = %e, "Sweeper task ended abnormally");
            }
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
