//! Backend inventory.
//!
//! # Responsibilities
//! - Own every backend the load balancer may select from
//! - Load and save the persisted droplet list
//! - Stop all monitoring on close
//!
//! # Design Decisions
//! - A load either yields every backend or fails; no partial inventories
//! - Saving is refused once shutdown has started
//! - Only droplet identity is persisted, never runtime stats

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use crate::config::BackendConfig;
use crate::health::probe::parse_health_url;
use crate::lifecycle::Shutdown;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::droplet::{Droplet, Droplets};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to access inventory file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse inventory file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize inventory: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid droplet {id}: {reason}")]
    InvalidRecord { id: u64, reason: String },
    #[error("unable to save inventory, shutdown in progress")]
    ShuttingDown,
}

/// Aggregate statistics across the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FleetStats {
    pub backends: usize,
    pub healthy: usize,
    /// Mean smoothed latency of healthy backends.
    pub mean_latency: f64,
    /// Mean smoothed failure rate of healthy backends.
    pub mean_failure_rate: f64,
    pub connections: usize,
}

/// Contains all backends in the inventory.
#[derive(Debug)]
pub struct Inventory {
    backends: RwLock<Vec<Arc<Backend>>>,
    config: BackendConfig,
    shutdown: Shutdown,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new(config: BackendConfig, shutdown: Shutdown) -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
            config,
            shutdown,
        }
    }

    /// Read an inventory file and start monitoring every droplet in it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn load(
        path: impl AsRef<Path>,
        config: BackendConfig,
        shutdown: Shutdown,
    ) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let droplets = read_droplets(path)?;

        // Build everything first so a bad record leaves no monitors behind.
        let mut backends = Vec::with_capacity(droplets.len());
        for droplet in droplets {
            let id = droplet.id;
            match Backend::new(droplet, &config, &shutdown) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => {
                    for backend in &backends {
                        backend.close();
                    }
                    return Err(InventoryError::InvalidRecord {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(path = %path.display(), backends = backends.len(), "Inventory loaded");

        Ok(Self {
            backends: RwLock::new(backends),
            config,
            shutdown,
        })
    }

    /// Save all droplets in the inventory to `path`, overwriting it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), InventoryError> {
        let path = path.as_ref();
        let _lock = self.shutdown.lock().ok_or(InventoryError::ShuttingDown)?;

        let document = Droplets {
            droplets: self.droplets(),
        };
        let text = toml::to_string(&document)?;

        fs::write(path, text).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(path = %path.display(), backends = document.droplets.len(), "Inventory saved");
        Ok(())
    }

    /// Close all backends, stopping their monitors.
    pub fn close(&self) {
        for backend in self.read().iter() {
            backend.close();
        }
    }

    /// Start monitoring a new droplet.
    pub fn add(&self, droplet: Droplet) -> Result<Arc<Backend>, InventoryError> {
        let id = droplet.id;
        let mut backends = self.write();
        if backends.iter().any(|b| b.id() == id) {
            return Err(InventoryError::InvalidRecord {
                id,
                reason: "duplicate id".into(),
            });
        }

        let backend = Backend::new(droplet, &self.config, &self.shutdown)
            .map(Arc::new)
            .map_err(|e| InventoryError::InvalidRecord {
                id,
                reason: e.to_string(),
            })?;
        backends.push(backend.clone());
        Ok(backend)
    }

    /// Remove a backend and stop monitoring it.
    pub fn remove(&self, id: u64) -> Option<Arc<Backend>> {
        let removed = {
            let mut backends = self.write();
            let index = backends.iter().position(|b| b.id() == id)?;
            backends.remove(index)
        };
        removed.close();
        Some(removed)
    }

    pub fn get(&self, id: u64) -> Option<Arc<Backend>> {
        self.read().iter().find(|b| b.id() == id).cloned()
    }

    /// Snapshot of all backends in insertion order.
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.read().clone()
    }

    pub fn droplets(&self) -> Vec<Droplet> {
        self.read().iter().map(|b| b.droplet().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Aggregate latency and failure rate for the provisioning engine.
    pub fn fleet_stats(&self) -> FleetStats {
        let backends = self.read();
        let mut fleet = FleetStats {
            backends: backends.len(),
            ..FleetStats::default()
        };

        for backend in backends.iter() {
            fleet.connections += backend.connections();
            let stats = backend.stats();
            if stats.healthy {
                fleet.healthy += 1;
                fleet.mean_latency += stats.latency;
                fleet.mean_failure_rate += stats.failure_rate;
            }
        }
        if fleet.healthy > 0 {
            fleet.mean_latency /= fleet.healthy as f64;
            fleet.mean_failure_rate /= fleet.healthy as f64;
        }
        fleet
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Backend>>> {
        self.backends.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Backend>>> {
        self.backends.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read and validate the droplets in an inventory file without starting
/// any monitors.
pub fn read_droplets(path: &Path) -> Result<Vec<Droplet>, InventoryError> {
    let text = fs::read_to_string(path).map_err(|source| InventoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Droplets = toml::from_str(&text).map_err(|source| InventoryError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_droplets(&document.droplets)?;
    Ok(document.droplets)
}

fn validate_droplets(droplets: &[Droplet]) -> Result<(), InventoryError> {
    let mut seen = HashSet::new();
    for droplet in droplets {
        if !seen.insert(droplet.id) {
            return Err(InventoryError::InvalidRecord {
                id: droplet.id,
                reason: "duplicate id".into(),
            });
        }
        if droplet.server_host.trim().is_empty() {
            return Err(InventoryError::InvalidRecord {
                id: droplet.id,
                reason: "empty server-host".into(),
            });
        }
        if let Some(url) = droplet.health_url() {
            parse_health_url(url).map_err(|e| InventoryError::InvalidRecord {
                id: droplet.id,
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}
