//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, intervals > 0)
//! - Validate observability settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use crate::config::schema::BalancerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("unknown log format '{0}' (expected 'pretty' or 'json')")]
    LogFormat(String),
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let backend = &config.backend;

    if backend.dial_timeout_ms == 0 {
        errors.push(ValidationError::Zero("backend.dial_timeout_ms"));
    }
    if backend.health_timeout_ms == 0 {
        errors.push(ValidationError::Zero("backend.health_timeout_ms"));
    }
    if backend.monitor_interval_ms == 0 {
        errors.push(ValidationError::Zero("backend.monitor_interval_ms"));
    }
    if config.shutdown.timeout_secs == 0 {
        errors.push(ValidationError::Zero("shutdown.timeout_secs"));
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::LogFormat(observability.log_format.clone()));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
