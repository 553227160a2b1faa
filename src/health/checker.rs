//! # Connection Health Checker
//!
//! Background task that periodically scores a pooled database target:
//! pool saturation, a timed connectivity probe, and a short performance
//! probe. Each sub-check tolerates failure independently; a cycle always
//! produces a report and never crashes the monitoring loop.

use crate::database::manager::Database;
use crate::errors::DbGuardError;
use crate::health::types::{
    overall_of, ConnectivityStatus, HealthCheckConfig, HealthLevel, HealthReport,
    PerformanceAssessment, PerformanceStatus, SaturationStatus,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Fixed lightweight statements for the performance probe.
const PROBE_STATEMENTS: [&str; 3] = ["SELECT 1", "SELECT 1 + 1", "SELECT 2 + 2"];

/// Periodic health monitor for one pooled database target.
///
/// `start` launches the monitoring loop as a background task gated by a
/// running flag; `stop` clears the flag and cancels the task. The most
/// recent report is cached and served by [`HealthChecker::latest`];
/// [`HealthChecker::check_now`] runs an on-demand cycle.
pub struct HealthChecker {
    database: Database,
    config: HealthCheckConfig,
    last_report: Arc<RwLock<Option<HealthReport>>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthChecker {
    pub fn new(database: Database, config: HealthCheckConfig) -> Self {
        Self {
            database,
            config,
            last_report: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Launch the monitoring loop. No-op when already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(pool = %self.database.name(), "Health checker already running");
            return;
        }

        let database = self.database.clone();
        let config = self.config.clone();
        let last_report = Arc::clone(&self.last_report);
        let running = Arc::clone(&self.running);

        info!(
            pool = %database.name(),
            interval_seconds = config.interval_seconds,
            "Starting health checker"
        );

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(config.interval_seconds));

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let report = run_cycle(&database, &config).await;
                debug!(
                    pool = %report.pool_name,
                    overall = ?report.overall,
                    "Health check cycle complete"
                );
                *last_report.write() = Some(report);
            }
        });

        *self.handle.lock() = Some(handle);
    }

    /// Stop the monitoring loop, cancelling any in-flight cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            info!(pool = %self.database.name(), "Stopped health checker");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Most recent cached report, if a cycle has completed.
    pub fn latest(&self) -> Option<HealthReport> {
        self.last_report.read().clone()
    }

    /// Run one on-demand cycle, updating the cache.
    pub async fn check_now(&self) -> HealthReport {
        let report = run_cycle(&self.database, &self.config).await;
        *self.last_report.write() = Some(report.clone());
        report
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

/// Run one full check cycle. Always returns a report.
async fn run_cycle(database: &Database, config: &HealthCheckConfig) -> HealthReport {
    let pool_status = database.status();
    let saturation = classify_saturation(pool_status.active, pool_status.max_connections, config);

    let connectivity = connectivity_probe(database, config).await;
    let performance = performance_probe(database, config).await;

    let overall = overall_of(saturation.level, connectivity.level, performance.level);
    let error = connectivity
        .error
        .clone()
        .or_else(|| performance.error.clone());

    HealthReport {
        checked_at: Utc::now(),
        pool_name: database.name().to_string(),
        saturation,
        connectivity,
        performance,
        overall,
        error,
    }
}

/// Classify pool saturation against the configured thresholds.
fn classify_saturation(
    active: u32,
    max_connections: u32,
    config: &HealthCheckConfig,
) -> SaturationStatus {
    let ratio = if max_connections > 0 {
        f64::from(active) / f64::from(max_connections)
    } else {
        0.0
    };

    let level = if ratio >= config.saturation_critical_ratio {
        HealthLevel::Critical
    } else if ratio >= config.saturation_warning_ratio {
        HealthLevel::Warning
    } else {
        HealthLevel::Healthy
    };

    SaturationStatus {
        active,
        max_connections,
        ratio,
        level,
    }
}

/// Acquire one connection and run a trivial statement under a fixed timeout.
///
/// The probe connection is released when this function returns, independent
/// of the long-lived pool.
async fn connectivity_probe(database: &Database, config: &HealthCheckConfig) -> ConnectivityStatus {
    let timeout = Duration::from_secs(config.connectivity_timeout_seconds);
    let started = Instant::now();

    let attempt = tokio::time::timeout(timeout, async {
        let mut conn = database.pool().acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok::<_, sqlx::Error>(())
    })
    .await;

    let latency_ms = started.elapsed().as_millis() as u64;

    match attempt {
        Ok(Ok(())) => ConnectivityStatus {
            level: HealthLevel::Healthy,
            latency_ms: Some(latency_ms),
            error: None,
        },
        Ok(Err(e)) => {
            let probe_err = DbGuardError::ProbeFailure(e.to_string());
            error!(pool = %database.name(), error = %probe_err, "Connectivity probe failed");
            ConnectivityStatus {
                level: HealthLevel::Critical,
                latency_ms: None,
                error: Some(probe_err.to_string()),
            }
        }
        Err(_elapsed) => {
            let probe_err = DbGuardError::ProbeFailure(format!(
                "connectivity probe timed out after {}s",
                config.connectivity_timeout_seconds
            ));
            error!(pool = %database.name(), error = %probe_err, "Connectivity probe timed out");
            ConnectivityStatus {
                level: HealthLevel::Critical,
                latency_ms: None,
                error: Some(probe_err.to_string()),
            }
        }
    }
}

/// Run the fixed probe statements sequentially, recording per-query latency.
async fn performance_probe(database: &Database, config: &HealthCheckConfig) -> PerformanceStatus {
    let mut conn = match database.pool().acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            let probe_err = DbGuardError::ProbeFailure(e.to_string());
            error!(pool = %database.name(), error = %probe_err, "Performance probe could not acquire a connection");
            return PerformanceStatus {
                assessment: PerformanceAssessment::Failed,
                level: HealthLevel::Critical,
                error: Some(probe_err.to_string()),
                ..Default::default()
            };
        }
    };

    let mut samples_ms = Vec::with_capacity(PROBE_STATEMENTS.len());
    for statement in PROBE_STATEMENTS {
        let started = Instant::now();
        if let Err(e) = sqlx::query(statement).execute(&mut *conn).await {
            let probe_err = DbGuardError::ProbeFailure(e.to_string());
            error!(pool = %database.name(), error = %probe_err, "Performance probe statement failed");
            let mut status = classify_performance(&samples_ms, config);
            status.assessment = PerformanceAssessment::Failed;
            status.level = HealthLevel::Critical;
            status.error = Some(probe_err.to_string());
            return status;
        }
        samples_ms.push(started.elapsed().as_millis() as u64);
    }

    classify_performance(&samples_ms, config)
}

/// Derive avg/max and the latency classification from probe samples.
fn classify_performance(samples_ms: &[u64], config: &HealthCheckConfig) -> PerformanceStatus {
    let max_ms = samples_ms.iter().copied().max().unwrap_or(0);
    let avg_ms = if samples_ms.is_empty() {
        0.0
    } else {
        samples_ms.iter().sum::<u64>() as f64 / samples_ms.len() as f64
    };

    let assessment = if samples_ms.is_empty() {
        PerformanceAssessment::Unknown
    } else if max_ms > config.slow_max_ms {
        PerformanceAssessment::Slow
    } else if avg_ms > config.degraded_avg_ms {
        PerformanceAssessment::Degraded
    } else {
        PerformanceAssessment::Healthy
    };

    PerformanceStatus {
        assessment,
        level: assessment.level(),
        avg_ms,
        max_ms,
        samples_ms: samples_ms.to_vec(),
        error: None,
    }
}
