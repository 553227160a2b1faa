//! # Circuit Breaker Manager
//!
//! Keyed registry of circuit breakers, one per external dependency.
//! Breakers are created lazily on first use and live for the process
//! lifetime; operators can force them closed through `reset`/`reset_all`.
//! Locking is per-breaker after lookup, so unrelated dependencies never
//! serialize on each other.

use crate::config::CircuitBreakerSettings;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::resilience::metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
use crate::resilience::CircuitState;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Manager for the process-wide circuit breaker registry.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    /// Collection of circuit breakers by dependency name
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,

    /// Default and per-dependency breaker configuration
    settings: CircuitBreakerSettings,
}

impl CircuitBreakerManager {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            settings,
        }
    }

    /// Get or lazily create the circuit breaker for a dependency.
    pub async fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        // Fast path: breaker already exists
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(dependency) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.breakers.write().await;

        // Double-check pattern (another task might have created it)
        if let Some(breaker) = breakers.get(dependency) {
            return Arc::clone(breaker);
        }

        let config = self.settings.config_for(dependency);
        let breaker = Arc::new(CircuitBreaker::new(dependency.to_string(), config));
        breakers.insert(dependency.to_string(), Arc::clone(&breaker));

        info!(
            dependency = dependency,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Invoke an operation guarded by the dependency's breaker.
    ///
    /// A rejected call raises [`CircuitBreakerError::CircuitOpen`] without
    /// invoking the operation; that error is always propagated so callers
    /// can apply their own fallback or backpressure policy.
    pub async fn call<F, Fut, T, E>(
        &self,
        dependency: &str,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.breaker(dependency).await;
        breaker.call(operation).await
    }

    /// Force the breaker for a dependency back to closed. Returns `false`
    /// when no breaker exists for the key.
    pub async fn reset(&self, dependency: &str) -> bool {
        let breakers = self.breakers.read().await;
        if let Some(breaker) = breakers.get(dependency) {
            breaker.force_closed();
            true
        } else {
            false
        }
    }

    /// Force every breaker back to closed (operator recovery).
    pub async fn reset_all(&self) {
        warn!("Forcing all circuit breakers closed (operator reset)");

        let breakers = self.breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_closed();
        }
    }

    /// Get all registered dependency names.
    pub async fn list_dependencies(&self) -> Vec<String> {
        let breakers = self.breakers.read().await;
        breakers.keys().cloned().collect()
    }

    /// Get metrics for a specific dependency's breaker.
    pub async fn dependency_metrics(&self, dependency: &str) -> Option<CircuitBreakerMetrics> {
        let breakers = self.breakers.read().await;
        breakers.get(dependency).map(|b| b.metrics())
    }

    /// Get system-wide circuit breaker metrics.
    pub async fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let breakers = self.breakers.read().await;
        for (name, breaker) in breakers.iter() {
            system_metrics.add_circuit_breaker(name.clone(), breaker.metrics());
        }

        system_metrics
    }

    /// Get count of circuit breakers by state.
    pub async fn state_summary(&self) -> HashMap<CircuitState, usize> {
        self.system_metrics().await.count_by_state()
    }

    /// Check overall health based on circuit breaker states.
    pub async fn health_score(&self) -> f64 {
        self.system_metrics().await.health_score()
    }
}

impl Clone for CircuitBreakerManager {
    fn clone(&self) -> Self {
        Self {
            breakers: Arc::clone(&self.breakers),
            settings: self.settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerComponentConfig;

    fn test_settings() -> CircuitBreakerSettings {
        let mut settings = CircuitBreakerSettings::default();
        settings.dependencies.insert(
            "auth_service".to_string(),
            CircuitBreakerComponentConfig {
                failure_threshold: 2,
                recovery_timeout_seconds: 1,
            },
        );
        settings
    }

    #[tokio::test]
    async fn test_manager_starts_empty_and_healthy() {
        let manager = CircuitBreakerManager::new(test_settings());

        assert!(manager.list_dependencies().await.is_empty());
        assert_eq!(manager.health_score().await, 1.0);
    }

    #[tokio::test]
    async fn test_breaker_creation_is_idempotent() {
        let manager = CircuitBreakerManager::new(test_settings());

        let first = manager.breaker("auth_service").await;
        let second = manager.breaker("auth_service").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.list_dependencies().await.len(), 1);
    }

    #[tokio::test]
    async fn test_per_dependency_config_is_applied() {
        let manager = CircuitBreakerManager::new(test_settings());

        // auth_service has failure_threshold 2
        let _ = manager
            .call("auth_service", || async { Err::<String, _>("down") })
            .await;
        let _ = manager
            .call("auth_service", || async { Err::<String, _>("down") })
            .await;

        let breaker = manager.breaker("auth_service").await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Unconfigured dependencies use the default threshold of 3
        let _ = manager
            .call("geo_lookup", || async { Err::<String, _>("down") })
            .await;
        let _ = manager
            .call("geo_lookup", || async { Err::<String, _>("down") })
            .await;
        let breaker = manager.breaker("geo_lookup").await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_system_metrics_aggregation() {
        let manager = CircuitBreakerManager::new(test_settings());

        let _ = manager.breaker("auth_service").await;
        let _ = manager.breaker("geo_lookup").await;
        let _ = manager.breaker("billing").await;

        let system_metrics = manager.system_metrics().await;
        assert_eq!(system_metrics.circuit_breakers.len(), 3);

        let state_summary = manager.state_summary().await;
        assert_eq!(state_summary.get(&CircuitState::Closed), Some(&3));
        assert_eq!(manager.health_score().await, 1.0);
    }

    #[tokio::test]
    async fn test_reset_and_reset_all() {
        let manager = CircuitBreakerManager::new(test_settings());

        // Unknown key is a no-op
        assert!(!manager.reset("never_seen").await);

        // Trip the auth_service breaker
        let _ = manager
            .call("auth_service", || async { Err::<String, _>("down") })
            .await;
        let _ = manager
            .call("auth_service", || async { Err::<String, _>("down") })
            .await;
        let breaker = manager.breaker("auth_service").await;
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(manager.reset("auth_service").await);
        assert_eq!(breaker.state(), CircuitState::Closed);

        // reset_all after tripping again
        breaker.force_open();
        manager.reset_all().await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(manager.health_score().await, 1.0);
    }
}
