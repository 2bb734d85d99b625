//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single running droplet
//! - Measure every request routed through its transport
//! - Own the monitor loop that keeps its stats and health current
//!
//! # Design Decisions
//! - The monitor loop is spawned on construction and runs until `close`,
//!   process shutdown, or the backend being dropped
//! - Only the monitor loop writes health; the request path only counts

use std::sync::Arc;
use axum::body::Body;
use chrono::{DateTime, Utc};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::watch;
use crate::config::BackendConfig;
use crate::health::monitor::HealthMonitor;
use crate::health::probe::{HealthProbe, ProbeError};
use crate::lifecycle::Shutdown;
use crate::load_balancer::collector::{StatsCollector, StatsTransport};
use crate::load_balancer::droplet::Droplet;
use crate::load_balancer::stats::{Stats, StatsSnapshot};

/// Client used to forward proxied requests to a backend.
pub type HttpClient = Client<HttpConnector, Body>;

/// A single running droplet instance.
#[derive(Debug)]
pub struct Backend {
    droplet: Droplet,
    started: DateTime<Utc>,
    collector: Arc<StatsCollector>,
    stats: Arc<Stats>,
    transport: StatsTransport<HttpClient>,
    close: watch::Sender<bool>,
    /// Its sender lives in the monitor task.
    done: watch::Receiver<()>,
}

impl Backend {
    /// Create a backend and start monitoring it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        droplet: Droplet,
        config: &BackendConfig,
        shutdown: &Shutdown,
    ) -> Result<Self, ProbeError> {
        let probe = droplet
            .health_url()
            .map(|url| HealthProbe::new(url, config.health_timeout()))
            .transpose()?;

        let collector = Arc::new(StatsCollector::new());
        let stats = Arc::new(Stats::new(
            config.latency_avg,
            config.failure_threshold,
            probe.is_none(),
        ));

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.dial_timeout()));
        let client: HttpClient = Client::builder(TokioExecutor::new()).build(connector);
        let transport = StatsTransport::new(client, collector.clone());

        let (close, close_rx) = watch::channel(false);
        let (done_tx, done) = watch::channel(());

        let monitor = HealthMonitor::new(
            droplet.name.clone(),
            collector.clone(),
            stats.clone(),
            probe,
            config.monitor_interval(),
        );
        let listener = shutdown.listener();
        tokio::spawn(async move {
            monitor.run(close_rx, listener).await;
            drop(done_tx);
        });

        tracing::info!(
            id = droplet.id,
            name = %droplet.name,
            host = %droplet.server_host,
            health_url = %droplet.health_url,
            "Backend added"
        );

        Ok(Self {
            droplet,
            started: Utc::now(),
            collector,
            stats,
            transport,
            close,
            done,
        })
    }

    pub fn id(&self) -> u64 {
        self.droplet.id
    }

    pub fn name(&self) -> &str {
        &self.droplet.name
    }

    pub fn droplet(&self) -> &Droplet {
        &self.droplet
    }

    /// When this backend started being monitored.
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// The host address of the backend.
    pub fn host(&self) -> &str {
        &self.droplet.server_host
    }

    pub fn healthy(&self) -> bool {
        self.stats.healthy()
    }

    /// Number of currently running requests.
    pub fn connections(&self) -> usize {
        self.collector.in_flight()
    }

    /// Smoothed latency.
    pub fn latency(&self) -> f64 {
        self.stats.latency()
    }

    /// Smoothed failure rate.
    pub fn failure_rate(&self) -> f64 {
        self.stats.failure_rate()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// A request executor that records statistics for this backend.
    ///
    /// All proxied traffic must go through it to be measured.
    pub fn transport(&self) -> StatsTransport<HttpClient> {
        self.transport.clone()
    }

    /// Stop monitoring. Safe to call more than once.
    pub fn close(&self) {
        if !self.close.send_replace(true) {
            tracing::info!(id = self.droplet.id, name = %self.droplet.name, "Backend closed");
        }
    }

    /// Wait until the monitor loop has exited.
    pub async fn closed(&self) {
        let mut done = self.done.clone();
        while done.changed().await.is_ok() {}
    }
}
