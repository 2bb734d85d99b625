//! Droplet balancer (v1)
//!
//! Monitors every droplet in the inventory and keeps their health and
//! traffic statistics current for the load-balancing selector.
//!
//! # Architecture Overview
//!
//! ```text
//!     Proxied request ──▶ Backend::transport() ──▶ droplet
//!                              │
//!                              ▼ counters
//!                       ┌──────────────┐   every period   ┌──────────────┐
//!                       │StatsCollector│ ───────────────▶ │    Stats     │
//!                       └──────────────┘    (monitor)     │ EWMA + health│
//!                                               │         └──────┬───────┘
//!                                    health probe│                │
//!                                               ▼                ▼
//!                                           droplet       selector / autoscaler
//!
//!     Inventory: load ─▶ Backends (one monitor each) ─▶ save ─▶ close
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;

use droplet_balancer::config::{loader::load_config, BalancerConfig};
use droplet_balancer::lifecycle::{signals::shutdown_signal, Shutdown};
use droplet_balancer::observability::{logging, metrics};
use droplet_balancer::Inventory;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "droplet-balancer")]
#[command(about = "Backend health and traffic statistics for droplet inventories", long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inventory file, overriding `inventory.path` from the configuration.
    #[arg(short, long)]
    inventory: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => BalancerConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    tracing::info!("droplet-balancer v0.1.0 starting");
    tracing::info!(
        latency_avg = config.backend.latency_avg,
        health_timeout_ms = config.backend.health_timeout_ms,
        monitor_interval_ms = config.backend.monitor_interval_ms,
        failure_threshold = config.backend.failure_threshold,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new(config.shutdown.timeout());
    let inventory_path = args
        .inventory
        .unwrap_or_else(|| config.inventory.path.clone());

    let inventory = if inventory_path.exists() {
        Inventory::load(&inventory_path, config.backend.clone(), shutdown.clone())?
    } else {
        tracing::warn!(
            path = %inventory_path.display(),
            "Inventory file not found, starting with an empty inventory"
        );
        Inventory::new(config.backend.clone(), shutdown.clone())
    };
    let inventory = Arc::new(inventory);

    let reporter = tokio::spawn(report_fleet(inventory.clone(), shutdown.clone()));

    shutdown_signal().await;

    if config.inventory.save_on_shutdown {
        if let Err(e) = inventory.save(&inventory_path) {
            tracing::error!(error = %e, "Failed to save inventory");
        }
    }

    shutdown.trigger().await;
    if !shutdown.wait().await {
        tracing::warn!("Some monitors did not stop in time");
    }
    inventory.close();
    if let Err(e) = reporter.await {
        tracing::warn!(error = %e, "Fleet reporter task failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Periodically log aggregate fleet statistics.
async fn report_fleet(inventory: Arc<Inventory>, shutdown: Shutdown) {
    let mut listener = shutdown.listener();
    let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fleet = inventory.fleet_stats();
                tracing::info!(
                    backends = fleet.backends,
                    healthy = fleet.healthy,
                    connections = fleet.connections,
                    mean_latency = fleet.mean_latency,
                    mean_failure_rate = fleet.mean_failure_rate,
                    "Fleet status"
                );
            }
            _ = listener.recv() => break,
        }
    }

    listener.acknowledge();
}
