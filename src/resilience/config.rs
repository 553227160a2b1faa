//! # Circuit Breaker Configuration
//!
//! Configuration and validation for a single circuit breaker.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit. Tuned
    /// above 1 so a single transient error does not trip the breaker.
    pub failure_threshold: u32,

    /// Time to wait in the open state before allowing a recovery trial.
    pub recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Configuration for the dependent authentication service: trip fast,
    /// recover fast, since callers block on it.
    pub fn for_auth_service() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(5),
        }
    }

    /// Configuration for slower external APIs.
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be greater than 0".to_string());
        }

        if self.recovery_timeout > Duration::from_secs(300) {
            return Err("recovery_timeout should not exceed 300 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(10),
        }
    }
}
