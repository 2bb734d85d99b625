//! Per-backend monitor loop.
//!
//! # Responsibilities
//! - Drain request counters into the smoothed averages every period
//! - Probe the backend's health URL
//! - Drive the health state machine
//! - Stop on backend close or process shutdown, whichever comes first

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use crate::health::probe::HealthProbe;
use crate::health::state::{ProbeOutcome, Transition};
use crate::lifecycle::ShutdownListener;
use crate::load_balancer::collector::StatsCollector;
use crate::load_balancer::stats::Stats;
use crate::observability::metrics;

pub struct HealthMonitor {
    backend: String,
    collector: Arc<StatsCollector>,
    stats: Arc<Stats>,
    probe: Option<HealthProbe>,
    period: Duration,
}

impl HealthMonitor {
    pub fn new(
        backend: String,
        collector: Arc<StatsCollector>,
        stats: Arc<Stats>,
        probe: Option<HealthProbe>,
        period: Duration,
    ) -> Self {
        Self {
            backend,
            collector,
            stats,
            probe,
            period,
        }
    }

    /// Run until `close` turns true (or its sender is dropped) or shutdown is
    /// requested. Shutdown is acknowledged before returning; a close only
    /// unregisters the listener.
    ///
    /// Stop signals take priority over a due tick and abandon a tick that is
    /// still waiting on its probe.
    pub async fn run(self, mut close: watch::Receiver<bool>, mut shutdown: ShutdownListener) {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous = Instant::now();

        tracing::debug!(backend = %self.backend, "Monitor started");

        let shutting_down = loop {
            tokio::select! {
                biased;
                stop = stop_requested(&mut close, &mut shutdown) => break stop,
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(previous);
                    previous = now;
                    tokio::select! {
                        biased;
                        stop = stop_requested(&mut close, &mut shutdown) => break stop,
                        _ = self.tick(elapsed) => {}
                    }
                }
            }
        };

        if shutting_down {
            tracing::debug!(backend = %self.backend, "Monitor stopped by shutdown");
            shutdown.acknowledge();
        } else {
            tracing::debug!(backend = %self.backend, "Monitor closed");
        }
    }

    /// One monitor period.
    pub async fn tick(&self, elapsed: Duration) {
        let drained = {
            let mut counters = self.collector.lock();
            let mut stats = self.stats.write();
            let drained = counters.drain(elapsed);
            drop(counters);
            stats.add_samples(&drained);
            drained
        };

        tracing::trace!(
            backend = %self.backend,
            requests = drained.requests,
            errors = drained.errors,
            latency = drained.latency,
            failure_rate = drained.failure_rate,
            "Drained request statistics"
        );
        metrics::record_requests(&self.backend, drained.requests, drained.errors);

        let outcome = match &self.probe {
            None => ProbeOutcome::Skipped,
            Some(probe) => {
                let result = probe.check().await;
                if let Err(e) = &result {
                    tracing::warn!(
                        backend = %self.backend,
                        url = %probe.uri(),
                        error = %e,
                        "Health check failed"
                    );
                    metrics::record_probe_failure(&self.backend);
                }
                ProbeOutcome::from(&result)
            }
        };

        let (transition, snapshot) = {
            let mut stats = self.stats.write();
            let transition = stats.record_probe(outcome);
            drop(stats);
            (transition, self.stats.snapshot())
        };

        match transition {
            Some(Transition::MarkedUnhealthy) => tracing::warn!(
                backend = %self.backend,
                consecutive_failures = snapshot.consecutive_failures,
                "Consecutive health checks failed, marking unhealthy"
            ),
            Some(Transition::Recovered) => tracing::info!(
                backend = %self.backend,
                "Health check succeeded, marking healthy"
            ),
            None => {}
        }

        metrics::record_backend_stats(&self.backend, &snapshot, self.collector.in_flight());
    }
}

/// Resolve with `true` on shutdown, or `false` once the backend is closed.
async fn stop_requested(close: &mut watch::Receiver<bool>, shutdown: &mut ShutdownListener) -> bool {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => return true,
            changed = close.changed() => {
                if changed.is_err() || *close.borrow() {
                    return false;
                }
            }
        }
    }
}
