//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gates and sweepers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters)
//!     → http::request (request ids on every span)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all gates
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
