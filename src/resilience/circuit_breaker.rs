//! # Circuit Breaker Implementation
//!
//! Fault isolation for calls to external dependencies. Classic three-state
//! pattern: Closed (normal operation), Open (failing fast), and Half-Open
//! (testing recovery with a single trial call).
//!
//! State transitions are lock-free: the state byte, failure counter, and
//! opened-at timestamp are atomics, and the half-open trial is claimed with a
//! `compare_exchange` so exactly one caller probes recovery per half-open
//! entry.

use crate::resilience::config::CircuitBreakerConfig;
use crate::resilience::metrics::CircuitBreakerMetrics;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Lock-free atomic counters for circuit breaker metrics.
#[derive(Debug)]
struct AtomicCallCounters {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rejected_count: AtomicU64,
    consecutive_failures: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl AtomicCallCounters {
    fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            total_duration_nanos: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn increment_consecutive_failures(&self) -> u64 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    fn reset_consecutive_failures(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self, state: CircuitState) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let rejected_count = self.rejected_count.load(Ordering::Relaxed);
        let total_duration_nanos = self.total_duration_nanos.load(Ordering::Relaxed);
        let total_duration = Duration::from_nanos(total_duration_nanos);

        let (failure_rate, success_rate, average_duration) = if total_calls > 0 {
            let fr = failure_count as f64 / total_calls as f64;
            let sr = success_count as f64 / total_calls as f64;
            let avg = Duration::from_nanos(total_duration_nanos / total_calls);
            (fr, sr, avg)
        } else {
            (0.0, 0.0, Duration::ZERO)
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            rejected_count,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_duration,
            current_state: state,
            failure_rate,
            success_rate,
            average_duration,
        }
    }
}

/// Get current epoch nanos from SystemTime
#[inline]
fn epoch_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - one trial call allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Errors that can occur during a guarded call
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the call was rejected without invoking the operation
    #[error("Circuit breaker is open for {dependency}")]
    CircuitOpen { dependency: String },

    /// The operation itself failed and the failure was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Which kind of permit a caller obtained.
enum CallPermit {
    /// Normal closed-state pass-through
    Normal,
    /// The single half-open recovery trial
    Trial,
}

/// Re-arms the half-open trial if a claimed trial call is cancelled before
/// its outcome is recorded, so cancellation leaves no dangling half-open
/// state with no trial available.
struct TrialRestore<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl TrialRestore<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialRestore<'_> {
    fn drop(&mut self) {
        if self.armed && self.breaker.state() == CircuitState::HalfOpen {
            self.breaker.trial_pending.store(true, Ordering::Release);
            debug!(
                dependency = %self.breaker.name,
                "Half-open trial cancelled before completion; re-arming trial"
            );
        }
    }
}

/// Core circuit breaker with atomic state management.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Dependency name for logging and metrics
    name: String,

    /// Current circuit state (atomic for thread safety)
    state: AtomicU8,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// Lock-free call counters
    counters: AtomicCallCounters,

    /// Epoch nanos when circuit was opened (0 = not open).
    /// Uses Release/Acquire ordering paired with state transitions.
    opened_at_epoch_nanos: AtomicU64,

    /// Whether the half-open trial slot is still unclaimed
    trial_pending: AtomicBool,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for a dependency.
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            dependency = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout.as_secs(),
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            counters: AtomicCallCounters::new(),
            opened_at_epoch_nanos: AtomicU64::new(0),
            trial_pending: AtomicBool::new(false),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// When the circuit is open (and the recovery timeout has not elapsed)
    /// the operation is not invoked and
    /// [`CircuitBreakerError::CircuitOpen`] is returned.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = match self.try_acquire() {
            Some(permit) => permit,
            None => {
                self.counters.record_rejected();
                debug!(dependency = %self.name, "Call rejected; circuit open");
                return Err(CircuitBreakerError::CircuitOpen {
                    dependency: self.name.clone(),
                });
            }
        };

        let mut trial_restore = TrialRestore {
            breaker: self,
            armed: matches!(permit, CallPermit::Trial),
        };

        let started = Instant::now();
        let result = operation().await;
        let duration = started.elapsed();

        // The outcome is being recorded; the trial slot is consumed for real
        trial_restore.disarm();

        match &result {
            Ok(_) => self.record_success(duration),
            Err(_) => self.record_failure(duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Check the current state and claim a permit when a call is allowed.
    fn try_acquire(&self) -> Option<CallPermit> {
        match self.state() {
            CircuitState::Closed => Some(CallPermit::Normal),
            CircuitState::Open => {
                let opened_nanos = self.opened_at_epoch_nanos.load(Ordering::Acquire);
                if opened_nanos == 0 {
                    warn!(dependency = %self.name, "Circuit open but no timestamp recorded");
                    return Some(CallPermit::Normal);
                }

                let elapsed_nanos = epoch_nanos_now().saturating_sub(opened_nanos);
                let timeout_nanos = self.config.recovery_timeout.as_nanos() as u64;

                if elapsed_nanos >= timeout_nanos {
                    // Only one caller performs the Open -> HalfOpen
                    // transition; everyone then races for the single trial.
                    if self
                        .state
                        .compare_exchange(
                            CircuitState::Open as u8,
                            CircuitState::HalfOpen as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.trial_pending.store(true, Ordering::Release);
                        info!(
                            dependency = %self.name,
                            "Circuit breaker half-open (testing recovery)"
                        );
                    }
                    self.claim_trial()
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => self.claim_trial(),
        }
    }

    /// Atomically claim the single half-open trial slot.
    fn claim_trial(&self) -> Option<CallPermit> {
        self.trial_pending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CallPermit::Trial)
    }

    /// Record a successful operation (lock-free)
    fn record_success(&self, duration: Duration) {
        self.counters.record_success(duration);

        debug!(
            dependency = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Guarded call succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                // The recovery trial succeeded
                self.transition_to_closed();
            }
            CircuitState::Closed => {
                self.counters.reset_consecutive_failures();
            }
            CircuitState::Open => {
                warn!(dependency = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation (lock-free)
    fn record_failure(&self, duration: Duration) {
        self.counters.record_failure(duration);

        error!(
            dependency = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Guarded call failed"
        );

        match self.state() {
            CircuitState::Closed => {
                let failures = self.counters.increment_consecutive_failures();
                if failures >= u64::from(self.config.failure_threshold) {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                // The recovery trial failed; restart the recovery timer
                self.transition_to_open();
            }
            CircuitState::Open => {
                // Already open, just record the failure
            }
        }
    }

    /// Transition to closed state (normal operation)
    fn transition_to_closed(&self) {
        self.counters.reset_consecutive_failures();
        self.opened_at_epoch_nanos.store(0, Ordering::Release);
        self.trial_pending.store(false, Ordering::Release);

        // Store state last (after counters reset)
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        info!(
            dependency = %self.name,
            total_calls = self.counters.total_calls.load(Ordering::Relaxed),
            "Circuit breaker closed (recovered)"
        );
    }

    /// Transition to open state (failing fast)
    fn transition_to_open(&self) {
        self.opened_at_epoch_nanos
            .store(epoch_nanos_now(), Ordering::Release);
        self.trial_pending.store(false, Ordering::Release);

        // Store state last
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        error!(
            dependency = %self.name,
            consecutive_failures = self.counters.consecutive_failures.load(Ordering::Relaxed),
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(dependency = %self.name, "Circuit breaker forced open");
        self.transition_to_open();
    }

    /// Force circuit to closed state, resetting the failure counter.
    /// Used by operators and tests.
    pub fn force_closed(&self) {
        warn!(dependency = %self.name, "Circuit breaker forced closed");
        self.transition_to_closed();
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.counters.snapshot(self.state())
    }

    /// Get dependency name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let total_calls = self.counters.total_calls.load(Ordering::Relaxed);
        if total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        let failure_count = self.counters.failure_count.load(Ordering::Relaxed);
        let failure_rate = failure_count as f64 / total_calls as f64;
        failure_rate < 0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::time::sleep;

    fn test_config(failure_threshold: u32, recovery_timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout,
        }
    }

    #[tokio::test]
    async fn test_starts_closed_and_passes_calls_through() {
        let circuit = CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(3, Duration::from_millis(100)),
        );

        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_opens_at_exactly_the_failure_threshold() {
        let circuit = CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(3, Duration::from_secs(30)),
        );

        for i in 1..3 {
            let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
            assert_eq!(
                circuit.state(),
                CircuitState::Closed,
                "circuit should be closed at {i} failures (threshold is 3)"
            );
        }

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_invoking() {
        let circuit = CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(1, Duration::from_secs(30)),
        );

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invocations);
        let result = circuit
            .call(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("should not execute")
            })
            .await;

        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(circuit.metrics().rejected_count, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(3, Duration::from_secs(30)),
        );

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        let _ = circuit.call(|| async { Ok::<_, String>("recovered") }).await;
        // Two more failures should not trip the breaker after the reset
        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;

        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_recovery_after_timeout_closes_on_trial_success() {
        let circuit = CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(1, Duration::from_millis(50)),
        );

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens_and_restarts_timer() {
        let circuit = CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(1, Duration::from_millis(50)),
        );

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        sleep(Duration::from_millis(60)).await;

        // Trial fails -> circuit reopens
        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        // Timer restarted: an immediate call is rejected again
        let result = circuit
            .call(|| async { Ok::<_, String>("too early") })
            .await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_half_open_admits_exactly_one_trial() {
        let circuit = Arc::new(CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(1, Duration::from_millis(50)),
        ));

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        sleep(Duration::from_millis(60)).await;

        // First caller claims the trial and holds it in flight
        let gate = Arc::new(tokio::sync::Notify::new());
        let started = Arc::new(tokio::sync::Notify::new());

        let trial_circuit = Arc::clone(&circuit);
        let trial_gate = Arc::clone(&gate);
        let trial_started = Arc::clone(&started);
        let trial = tokio::spawn(async move {
            trial_circuit
                .call(move || async move {
                    trial_started.notify_one();
                    trial_gate.notified().await;
                    Ok::<_, String>("trial success")
                })
                .await
        });

        started.notified().await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        // A concurrent caller during the trial is rejected
        let result = circuit
            .call(|| async { Ok::<_, String>("not allowed") })
            .await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));

        // Let the trial complete; its success closes the circuit
        gate.notify_one();
        assert!(trial.await.unwrap().is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_trial_rearms_the_slot() {
        let circuit = Arc::new(CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(1, Duration::from_millis(50)),
        ));

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        sleep(Duration::from_millis(60)).await;

        let started = Arc::new(tokio::sync::Notify::new());
        let trial_circuit = Arc::clone(&circuit);
        let trial_started = Arc::clone(&started);
        let trial = tokio::spawn(async move {
            trial_circuit
                .call(move || async move {
                    trial_started.notify_one();
                    futures::future::pending::<()>().await;
                    Ok::<_, String>("never completes")
                })
                .await
        });

        started.notified().await;
        trial.abort();
        let _ = trial.await;

        // The abandoned trial did not consume the slot for good
        let result = circuit.call(|| async { Ok::<_, String>("retry") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_failures_all_count_toward_threshold() {
        let circuit = Arc::new(CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(5, Duration::from_secs(30)),
        ));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let c = Arc::clone(&circuit);
            handles.push(tokio::spawn(async move {
                let _ = c.call(|| async { Err::<String, _>("error") }).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.metrics().failure_count, 5);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new(
            "auth_service".to_string(),
            test_config(1, Duration::from_secs(1)),
        );

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.is_healthy());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.is_healthy());
        assert_eq!(circuit.metrics().consecutive_failures, 0);
    }

    #[test]
    fn test_circuit_state_from_u8_conversion() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(1), CircuitState::Open);
        assert_eq!(CircuitState::from(2), CircuitState::HalfOpen);
        // Invalid values default to the safest state
        assert_eq!(CircuitState::from(3), CircuitState::Open);
        assert_eq!(CircuitState::from(255), CircuitState::Open);
    }
}
