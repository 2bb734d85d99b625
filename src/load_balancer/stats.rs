//! Smoothed backend statistics and health.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use crate::health::state::{HealthTracker, ProbeOutcome, Transition};
use crate::load_balancer::collector::Drained;
use crate::load_balancer::ewma::Ewma;

/// Age of the failure-rate average, in samples.
const FAILURE_RATE_AGE: u32 = 10;

/// Regularly updated statistics about a backend.
///
/// Only the monitor loop writes; any number of readers may take snapshots.
#[derive(Debug)]
pub struct Stats {
    inner: RwLock<StatsInner>,
}

#[derive(Debug)]
pub(crate) struct StatsInner {
    latency: Ewma,
    failure_rate: Ewma,
    health: HealthTracker,
}

/// A point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub latency: f64,
    pub failure_rate: f64,
    pub healthy: bool,
    pub consecutive_failures: u32,
}

impl Stats {
    /// `latency_age` is the age of the latency average in monitor periods.
    pub fn new(latency_age: u32, failure_threshold: u32, initially_healthy: bool) -> Self {
        Self {
            inner: RwLock::new(StatsInner {
                latency: Ewma::new(latency_age),
                failure_rate: Ewma::new(FAILURE_RATE_AGE),
                health: HealthTracker::new(failure_threshold, initially_healthy),
            }),
        }
    }

    pub fn healthy(&self) -> bool {
        self.read().health.is_healthy()
    }

    pub fn latency(&self) -> f64 {
        self.read().latency.value()
    }

    pub fn failure_rate(&self) -> f64 {
        self.read().failure_rate.value()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.read();
        StatsSnapshot {
            latency: inner.latency.value(),
            failure_rate: inner.failure_rate.value(),
            healthy: inner.health.is_healthy(),
            consecutive_failures: inner.health.consecutive_failures(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StatsInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for writing.
    ///
    /// When both are needed the collector lock must be taken first.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StatsInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatsInner {
    pub(crate) fn add_samples(&mut self, drained: &Drained) {
        self.latency.add(drained.latency);
        self.failure_rate.add(drained.failure_rate);
    }

    pub(crate) fn record_probe(&mut self, outcome: ProbeOutcome) -> Option<Transition> {
        self.health.record(outcome)
    }
}
