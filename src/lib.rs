//! Request gating for a CMS admin API: authorization, CSRF and rate limits.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::schema::GatewayConfig;
pub use error::GateError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
