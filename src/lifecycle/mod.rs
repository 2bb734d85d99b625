//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Save inventory → Trigger → Monitors acknowledge → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One coordinator per process, passed explicitly to every subsystem
//! - Shutdown is requested exactly once
//! - Shutdown has timeout: waiting for acknowledgements is bounded

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownListener, ShutdownLock};
