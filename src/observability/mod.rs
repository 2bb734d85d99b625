//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Monitor loops and inventory produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (per-backend gauges and counters)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are updated once per monitor tick, not per request
//! - Metric calls are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
