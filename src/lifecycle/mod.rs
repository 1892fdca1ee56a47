//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Sweepers (sweeper.rs):
//!     Every interval → purge expired records → until shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast channel stops every background task
//! - Sweepers start with the server, not lazily on first request

pub mod shutdown;
pub mod signals;
pub mod sweeper;

pub use shutdown::Shutdown;
pub use sweeper::Sweeper;
