//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Monitor loop (monitor.rs), one per backend:
//!     Periodic timer
//!     → Drain request counters into smoothed averages
//!     → Probe health URL (probe.rs)
//!     → Update state.rs
//!
//! State machine (state.rs):
//!     Healthy ←→ Unhealthy
//! ```
//!
//! # Design Decisions
//! - Lock order is always request counters, then stats
//! - The stats lock is released while a probe is in flight
//! - Probe failures are logged and counted, never escalated

pub mod monitor;
pub mod probe;
pub mod state;
