//! Backend health state machine.
//!
//! # States
//! - Healthy: backend receives traffic
//! - Unhealthy: backend excluded from load balancing
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive failures > failure_threshold
//! Unhealthy → Healthy: first successful probe (failures back to 0)
//! ```
//!
//! A backend without a health URL skips probing and is always healthy.

/// Health State enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Result of one health probe as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// No health URL configured.
    Skipped,
    Passed,
    Failed,
}

/// A change of [`HealthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    MarkedUnhealthy,
    Recovered,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    state: HealthState,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl HealthTracker {
    pub fn new(failure_threshold: u32, initially_healthy: bool) -> Self {
        Self {
            state: if initially_healthy {
                HealthState::Healthy
            } else {
                HealthState::Unhealthy
            },
            consecutive_failures: 0,
            failure_threshold,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Apply a probe outcome and return the transition it caused, if any.
    pub fn record(&mut self, outcome: ProbeOutcome) -> Option<Transition> {
        let before = self.state;

        match outcome {
            ProbeOutcome::Skipped => self.state = HealthState::Healthy,
            ProbeOutcome::Passed => self.consecutive_failures = 0,
            ProbeOutcome::Failed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1)
            }
        }

        if self.state == HealthState::Healthy
            && self.consecutive_failures > self.failure_threshold
        {
            self.state = HealthState::Unhealthy;
        }
        if self.state == HealthState::Unhealthy && self.consecutive_failures == 0 {
            self.state = HealthState::Healthy;
        }

        match (before, self.state) {
            (HealthState::Healthy, HealthState::Unhealthy) => Some(Transition::MarkedUnhealthy),
            (HealthState::Unhealthy, HealthState::Healthy) => Some(Transition::Recovered),
            _ => None,
        }
    }
}
