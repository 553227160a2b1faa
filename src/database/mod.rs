//! # Database Layer
//!
//! Pooled connection management and guarded session lifecycle.
//!
//! ## Key Components
//!
//! - [`manager`] - Keyed pool registry with idempotent lazy construction and
//!   explicit disposal
//! - [`session`] - Scoped session acquisition with the
//!   commit/rollback/abandon finalize contract
//! - [`pool_stats`] - SWMR atomic acquire statistics for observability

pub mod manager;
pub mod pool_stats;
pub mod session;

pub use manager::{Database, PoolManager, PoolStatus};
pub use pool_stats::{AtomicPoolStats, PoolStatsSnapshot};
pub use session::{with_session, PgSession, SessionSource, SessionState, Transactional};
