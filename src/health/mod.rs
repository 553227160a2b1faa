//! # Health Monitoring
//!
//! Periodic and on-demand scoring of a pooled database target.
//!
//! - [`types`] - report/status types and the check configuration
//! - [`checker`] - the background monitoring loop and probe execution

pub mod checker;
pub mod types;

pub use checker::HealthChecker;
pub use types::{
    ConnectivityStatus, HealthCheckConfig, HealthLevel, HealthReport, PerformanceAssessment,
    PerformanceStatus, SaturationStatus,
};
