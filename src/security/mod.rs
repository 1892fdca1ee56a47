//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-profile fixed window, 429 on overflow)
//!     → access_control.rs (principal + role/permission requirement)
//!     → csrf.rs (one-time token on state-changing methods)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Each gate is a hard boundary: a rejection never reaches the handler
//! - Fail closed: backend failures become 500, never a pass
//! - No trust in client input

pub mod access_control;
pub mod csrf;
pub mod principal;
pub mod rate_limit;
pub mod requirement;
pub mod session;

pub use access_control::{authorization_middleware, AuthorizationGate};
pub use csrf::{csrf_middleware, CsrfGuard};
pub use principal::Principal;
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use requirement::{AccessPolicy, Requirement};
pub use session::{SessionProvider, StaticSessionProvider};
