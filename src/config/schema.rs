//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Per-backend monitoring settings.
    pub backend: BackendConfig,

    /// Persisted inventory settings.
    pub inventory: InventoryConfig,

    /// Shutdown coordination settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Settings shared by every backend in the inventory.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Age, in seconds, of the smoothed latency average.
    pub latency_avg: u32,

    /// Timeout for establishing connections to the backend.
    pub dial_timeout_ms: u64,

    /// Total timeout of a single health probe.
    pub health_timeout_ms: u64,

    /// Period of the monitor loop.
    pub monitor_interval_ms: u64,

    /// Backend is marked unhealthy once consecutive probe failures exceed this.
    pub failure_threshold: u32,
}

impl BackendConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            latency_avg: 10,
            dial_timeout_ms: 5_000,
            health_timeout_ms: 2_000,
            monitor_interval_ms: 1_000,
            failure_threshold: 5,
        }
    }
}

/// Inventory file configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Path of the persisted droplet list.
    pub path: PathBuf,

    /// Write the inventory back to `path` before shutting down.
    pub save_on_shutdown: bool,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("inventory.toml"),
            save_on_shutdown: true,
        }
    }
}

/// Shutdown coordination configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for background tasks to acknowledge shutdown.
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
