//! # Circuit Breaker Metrics
//!
//! Metrics snapshots for circuit breaker monitoring: per-breaker call
//! statistics and system-wide aggregation for operational endpoints.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Total number of calls that were allowed through
    pub total_calls: u64,

    /// Number of successful calls
    pub success_count: u64,

    /// Number of failed calls
    pub failure_count: u64,

    /// Number of calls rejected while the circuit was open
    pub rejected_count: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u64,

    /// Total duration of all operations
    pub total_duration: Duration,

    /// Current circuit breaker state
    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Calculated success rate (0.0 to 1.0)
    pub success_rate: f64,

    /// Average operation duration
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated metrics across every breaker in the registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Metrics keyed by dependency name
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
    }

    /// Count of breakers per state.
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }
        counts
    }

    /// Fraction of breakers in the closed state; 1.0 when the registry is
    /// empty (no breakers means nothing is failing).
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let closed = self
            .circuit_breakers
            .values()
            .filter(|m| m.current_state == CircuitState::Closed)
            .count();
        closed as f64 / self.circuit_breakers.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_in_state(state: CircuitState) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            current_state: state,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_system_is_fully_healthy() {
        let system = SystemCircuitBreakerMetrics::new();
        assert_eq!(system.health_score(), 1.0);
        assert!(system.count_by_state().is_empty());
    }

    #[test]
    fn test_count_by_state() {
        let mut system = SystemCircuitBreakerMetrics::new();
        system.add_circuit_breaker("auth_service".to_string(), metrics_in_state(CircuitState::Closed));
        system.add_circuit_breaker("billing".to_string(), metrics_in_state(CircuitState::Closed));
        system.add_circuit_breaker("geo_lookup".to_string(), metrics_in_state(CircuitState::Open));

        let counts = system.count_by_state();
        assert_eq!(counts.get(&CircuitState::Closed), Some(&2));
        assert_eq!(counts.get(&CircuitState::Open), Some(&1));
        assert_eq!(counts.get(&CircuitState::HalfOpen), None);
    }

    #[test]
    fn test_health_score_reflects_open_breakers() {
        let mut system = SystemCircuitBreakerMetrics::new();
        system.add_circuit_breaker("auth_service".to_string(), metrics_in_state(CircuitState::Closed));
        system.add_circuit_breaker("geo_lookup".to_string(), metrics_in_state(CircuitState::Open));

        assert!((system.health_score() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_serialize_to_json() {
        let metrics = CircuitBreakerMetrics::new();
        let json = serde_json::to_string(&metrics).expect("serialize metrics");
        assert!(json.contains("\"total_calls\":0"));
    }
}
