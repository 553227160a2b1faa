//! # Resilience Module
//!
//! Circuit breaker patterns guarding calls to external dependencies, most
//! importantly the dependent authentication service. Prevents cascade
//! failures by failing fast while a dependency is down and probing for
//! recovery with a single trial call.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: closed/open/half-open state machines with
//!   lock-free atomic transitions
//! - **Manager**: keyed registry with lazy creation and per-dependency
//!   configuration overrides
//! - **Metrics**: per-breaker and system-wide snapshots for monitoring

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
