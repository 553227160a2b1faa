//! Error types for the dbguard core.
//!

use thiserror::Error;

/// Errors produced by the connection, session, health, and resilience layers.
///
/// The taxonomy mirrors how callers are expected to react: `Configuration` is
/// fatal for the affected DSN and never retried automatically,
/// `AcquireTimeout` and `CircuitOpen` are retryable backpressure signals, and
/// `ProbeFailure` stays contained inside health reports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbGuardError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Connection acquire timed out: {0}")]
    AcquireTimeout(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Health probe failed: {0}")]
    ProbeFailure(String),
    #[error("Circuit breaker open for dependency '{0}'")]
    CircuitOpen(String),
    /// A finalize operation was attempted on a session outside a finalizable
    /// state. The guard in [`crate::database::session`] makes this
    /// structurally unreachable; the variant exists for direct (non-guarded)
    /// misuse of a session handle.
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl From<sqlx::Error> for DbGuardError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                DbGuardError::AcquireTimeout("pool acquire timed out".to_string())
            }
            sqlx::Error::Configuration(e) => DbGuardError::Configuration(e.to_string()),
            other => DbGuardError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbGuardError {
    fn from(error: serde_json::Error) -> Self {
        DbGuardError::Database(format!("JSON serialization error: {error}"))
    }
}

pub type DbGuardResult<T> = anyhow::Result<T, DbGuardError>;
