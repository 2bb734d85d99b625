//! Backend inventory and per-backend statistics.
//!
//! # Data Flow
//! ```text
//! Proxied request
//!     → collector.rs (StatsTransport counts in-flight, latency, errors)
//!     → health::monitor drains counters every period
//!     → stats.rs (smoothed latency/failure rate, health)
//!     → backend.rs (Healthy / Connections / Transport for the selector)
//!
//! inventory.rs owns all backends:
//!     inventory file → droplet.rs → Backend (monitor spawned) → save / close
//! ```
//!
//! # Design Decisions
//! - The selector only reads; it never mutates health
//! - Lock order: collector before stats, everywhere

pub mod backend;
pub mod collector;
pub mod droplet;
pub mod ewma;
pub mod inventory;
pub mod stats;
