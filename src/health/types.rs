//! # Health Status Types
//!
//! Shared types for the health monitoring subsystem.
//!
//! `Unknown` always means "we could not determine this", never "looks clear".
//! Consumers should handle `Unknown` explicitly rather than treating it as
//! healthy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health severity classification.
///
/// Ordering reflects severity for worst-of comparisons; `Unknown` compares
/// lowest so "no information" never wins over an evaluated result, but the
/// aggregate rules in [`overall_of`] keep it from looking healthy either.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    /// Could not be determined (check disabled or evaluation failed)
    #[default]
    Unknown = 0,
    /// Normal operation
    Healthy = 1,
    /// Degraded but serving
    Warning = 2,
    /// Failing or saturated
    Critical = 3,
}

impl HealthLevel {
    /// Check if this level represents an evaluated state (not Unknown)
    #[must_use]
    pub const fn is_evaluated(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Check if this level indicates a critical condition
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

/// Combine the three sub-check levels into the report's overall health.
///
/// Rules: `Critical` if any sub-check is critical, `Warning` if any is at
/// warning, `Healthy` only when all three evaluated healthy, otherwise
/// `Unknown`. A report is therefore never healthy while a sub-check is
/// unevaluated or saturated.
pub fn overall_of(
    saturation: HealthLevel,
    connectivity: HealthLevel,
    performance: HealthLevel,
) -> HealthLevel {
    let levels = [saturation, connectivity, performance];
    if levels.iter().any(|l| *l == HealthLevel::Critical) {
        HealthLevel::Critical
    } else if levels.iter().any(|l| *l == HealthLevel::Warning) {
        HealthLevel::Warning
    } else if levels.iter().all(|l| *l == HealthLevel::Healthy) {
        HealthLevel::Healthy
    } else {
        HealthLevel::Unknown
    }
}

/// Pool saturation sub-check result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SaturationStatus {
    /// Connections currently checked out
    pub active: u32,
    /// Configured connection cap
    pub max_connections: u32,
    /// active / max, 0.0 when the cap is zero
    pub ratio: f64,
    pub level: HealthLevel,
}

/// Connectivity sub-check result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectivityStatus {
    pub level: HealthLevel,
    /// Probe round-trip when the probe succeeded
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Latency classification of the performance sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceAssessment {
    #[default]
    Unknown,
    Healthy,
    /// Average probe latency above the degraded threshold
    Degraded,
    /// Worst probe latency above the slow threshold
    Slow,
    /// A probe errored outright
    Failed,
}

impl PerformanceAssessment {
    /// Map the assessment onto the shared severity scale.
    #[must_use]
    pub const fn level(&self) -> HealthLevel {
        match self {
            Self::Unknown => HealthLevel::Unknown,
            Self::Healthy => HealthLevel::Healthy,
            Self::Degraded | Self::Slow => HealthLevel::Warning,
            Self::Failed => HealthLevel::Critical,
        }
    }
}

/// Performance sub-check result across the fixed probe statements.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStatus {
    pub assessment: PerformanceAssessment,
    pub level: HealthLevel,
    pub avg_ms: f64,
    pub max_ms: u64,
    /// Per-probe latencies in execution order
    pub samples_ms: Vec<u64>,
    pub error: Option<String>,
}

/// Immutable snapshot of one health check cycle.
///
/// Produced by the checker on each cycle; never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub pool_name: String,
    pub saturation: SaturationStatus,
    pub connectivity: ConnectivityStatus,
    pub performance: PerformanceStatus,
    pub overall: HealthLevel,
    /// First error encountered during the cycle, if any
    pub error: Option<String>,
}

/// Health check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Monitoring loop interval
    #[serde(default = "HealthCheckConfig::default_interval_seconds")]
    pub interval_seconds: u64,
    /// Connectivity probe timeout
    #[serde(default = "HealthCheckConfig::default_connectivity_timeout_seconds")]
    pub connectivity_timeout_seconds: u64,
    /// Saturation ratio at which the pool is considered near capacity
    #[serde(default = "HealthCheckConfig::default_saturation_warning_ratio")]
    pub saturation_warning_ratio: f64,
    /// Saturation ratio at which the pool is considered saturated
    #[serde(default = "HealthCheckConfig::default_saturation_critical_ratio")]
    pub saturation_critical_ratio: f64,
    /// Average probe latency above this is degraded (milliseconds)
    #[serde(default = "HealthCheckConfig::default_degraded_avg_ms")]
    pub degraded_avg_ms: f64,
    /// Worst probe latency above this is slow (milliseconds)
    #[serde(default = "HealthCheckConfig::default_slow_max_ms")]
    pub slow_max_ms: u64,
}

impl HealthCheckConfig {
    fn default_interval_seconds() -> u64 {
        60
    }
    fn default_connectivity_timeout_seconds() -> u64 {
        10
    }
    fn default_saturation_warning_ratio() -> f64 {
        0.75
    }
    fn default_saturation_critical_ratio() -> f64 {
        0.90
    }
    fn default_degraded_avg_ms() -> f64 {
        1000.0
    }
    fn default_slow_max_ms() -> u64 {
        5000
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval_seconds == 0 {
            return Err("interval_seconds must be greater than 0".to_string());
        }
        if self.connectivity_timeout_seconds == 0 {
            return Err("connectivity_timeout_seconds must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.saturation_warning_ratio) {
            return Err("saturation_warning_ratio must be between 0 and 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.saturation_critical_ratio) {
            return Err("saturation_critical_ratio must be between 0 and 1".to_string());
        }
        if self.saturation_warning_ratio > self.saturation_critical_ratio {
            return Err(
                "saturation_warning_ratio must not exceed saturation_critical_ratio".to_string(),
            );
        }
        Ok(())
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_seconds: Self::default_interval_seconds(),
            connectivity_timeout_seconds: Self::default_connectivity_timeout_seconds(),
            saturation_warning_ratio: Self::default_saturation_warning_ratio(),
            saturation_critical_ratio: Self::default_saturation_critical_ratio(),
            degraded_avg_ms: Self::default_degraded_avg_ms(),
            slow_max_ms: Self::default_slow_max_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_level_ordering() {
        assert!(HealthLevel::Unknown < HealthLevel::Healthy);
        assert!(HealthLevel::Healthy < HealthLevel::Warning);
        assert!(HealthLevel::Warning < HealthLevel::Critical);
    }

    #[test]
    fn test_overall_is_critical_iff_any_subcheck_critical() {
        assert_eq!(
            overall_of(
                HealthLevel::Healthy,
                HealthLevel::Critical,
                HealthLevel::Healthy
            ),
            HealthLevel::Critical
        );
        assert_eq!(
            overall_of(
                HealthLevel::Critical,
                HealthLevel::Warning,
                HealthLevel::Unknown
            ),
            HealthLevel::Critical
        );
        assert_ne!(
            overall_of(
                HealthLevel::Warning,
                HealthLevel::Warning,
                HealthLevel::Warning
            ),
            HealthLevel::Critical
        );
    }

    #[test]
    fn test_overall_is_healthy_iff_all_subchecks_healthy() {
        assert_eq!(
            overall_of(
                HealthLevel::Healthy,
                HealthLevel::Healthy,
                HealthLevel::Healthy
            ),
            HealthLevel::Healthy
        );
        // One unevaluated sub-check can never produce a healthy report
        assert_eq!(
            overall_of(
                HealthLevel::Healthy,
                HealthLevel::Unknown,
                HealthLevel::Healthy
            ),
            HealthLevel::Unknown
        );
    }

    #[test]
    fn test_overall_warning_dominates_healthy_and_unknown() {
        assert_eq!(
            overall_of(
                HealthLevel::Warning,
                HealthLevel::Healthy,
                HealthLevel::Unknown
            ),
            HealthLevel::Warning
        );
    }

    #[test]
    fn test_performance_assessment_levels() {
        assert_eq!(PerformanceAssessment::Healthy.level(), HealthLevel::Healthy);
        assert_eq!(PerformanceAssessment::Degraded.level(), HealthLevel::Warning);
        assert_eq!(PerformanceAssessment::Slow.level(), HealthLevel::Warning);
        assert_eq!(PerformanceAssessment::Failed.level(), HealthLevel::Critical);
        assert_eq!(PerformanceAssessment::Unknown.level(), HealthLevel::Unknown);
    }

    #[test]
    fn test_config_defaults_validate() {
        let config = HealthCheckConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval_seconds, 60);
        assert_eq!(config.connectivity_timeout_seconds, 10);
    }

    #[test]
    fn test_config_rejects_inverted_thresholds() {
        let config = HealthCheckConfig {
            saturation_warning_ratio: 0.95,
            saturation_critical_ratio: 0.80,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_statuses_are_unknown() {
        assert_eq!(ConnectivityStatus::default().level, HealthLevel::Unknown);
        assert_eq!(
            PerformanceStatus::default().assessment,
            PerformanceAssessment::Unknown
        );
        assert_eq!(SaturationStatus::default().level, HealthLevel::Unknown);
    }
}
