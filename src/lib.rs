#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # DbGuard Core
//!
//! Resilient database session and connection lifecycle subsystem: pooled
//! async PostgreSQL sessions with a guarded finalize contract, backend
//! health detection and scoring, and circuit-broken calls to external
//! dependencies.
//!
//! ## Overview
//!
//! The crate exists to eliminate one production defect class: a logical
//! operation abandoned mid-flight (cooperative cancellation, early return,
//! abrupt consumer teardown) while a finalize operation is attempted on the
//! same session, producing illegal-state errors. The session guard makes
//! those errors structurally unreachable rather than caught-and-handled.
//!
//! ## Module Organization
//!
//! - [`database`] - pool manager, guarded session lifecycle, pool statistics
//! - [`health`] - periodic and on-demand health scoring of a pooled target
//! - [`resilience`] - circuit breakers guarding external dependency calls
//! - [`query`] - query shape normalization for the columnar store
//! - [`config`] - configuration structs, env overrides, TOML loading
//! - [`context`] - explicit wiring of the long-lived singletons
//! - [`errors`] - structured error handling
//! - [`logging`] - tracing initialization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dbguard_core::config::DbGuardConfig;
//! use dbguard_core::context::CoreContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DbGuardConfig::from_env()?;
//! let core = CoreContext::new(config)?;
//! core.start_health_monitoring();
//!
//! let rows = core
//!     .with_session(|session| {
//!         Box::pin(async move {
//!             let conn = session.connection()?;
//!             let rows = sqlx::query("SELECT id FROM accounts")
//!                 .fetch_all(conn)
//!                 .await
//!                 .map_err(dbguard_core::errors::DbGuardError::from)?;
//!             Ok(rows.len())
//!         })
//!     })
//!     .await?;
//!
//! core.shutdown().await;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod health;
pub mod logging;
pub mod query;
pub mod resilience;

pub use config::DbGuardConfig;
pub use context::CoreContext;
pub use database::{
    with_session, Database, PgSession, PoolManager, PoolStatus, SessionSource, SessionState,
    Transactional,
};
pub use errors::{DbGuardError, DbGuardResult};
pub use health::{HealthChecker, HealthLevel, HealthReport};
pub use query::QueryShapeInterceptor;
pub use resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerManager, CircuitState,
};
