//! # Session Lifecycle Guard
//!
//! Scoped acquisition of a database session with a guaranteed finalize
//! contract: exactly one of {commit, rollback, no-op} on exit.
//!
//! The guard exists to make illegal-state finalize errors structurally
//! unreachable. The three exit classes:
//!
//! - **Normal exit**: commit, but only when the session is still active and
//!   inside its transaction. A failed commit changes the outcome of the
//!   operation and is propagated.
//! - **Error exit**: rollback under the same state check. A failed rollback
//!   is logged and swallowed; the session is being discarded regardless, and
//!   the caller gets the original error unchanged.
//! - **Abandonment** (cooperative cancellation, i.e. the future being
//!   dropped mid-body): no session method is invoked at all. The underlying
//!   connection may be mid-operation, and touching it from the drop path is
//!   exactly what produces illegal-state errors. Releasing the connection is
//!   left to the pool's own drop handling.

use crate::database::manager::Database;
use crate::errors::{DbGuardError, DbGuardResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{PgConnection, Postgres, Transaction};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error};
use uuid::Uuid;

/// Lifecycle states of a guarded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not yet bound to a pooled connection.
    Fresh,
    /// Bound to a connection with an open transaction.
    Active,
    /// Commit in flight.
    Committing,
    /// Rollback in flight.
    RollingBack,
    /// Finalized or abandoned; the connection is no longer ours.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Fresh => "fresh",
            SessionState::Active => "active",
            SessionState::Committing => "committing",
            SessionState::RollingBack => "rolling_back",
            SessionState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Capability interface every session implementation satisfies.
///
/// Finalize eligibility is an explicit state query (`is_active` plus
/// `in_transaction`) rather than a runtime probe for method presence.
#[async_trait]
pub trait Transactional: Send {
    /// Stable identifier for log correlation.
    fn id(&self) -> Uuid;

    /// Whether the session still owns a live connection.
    fn is_active(&self) -> bool;

    /// Whether the session is inside an open transaction.
    fn in_transaction(&self) -> bool;

    fn state(&self) -> SessionState;

    async fn commit(&mut self) -> DbGuardResult<()>;

    async fn rollback(&mut self) -> DbGuardResult<()>;
}

/// Anything sessions can be acquired from: the pooled database handle in
/// production, capacity-bounded mocks in tests.
#[async_trait]
pub trait SessionSource: Send + Sync {
    type Session: Transactional;

    async fn acquire(&self) -> DbGuardResult<Self::Session>;
}

/// A logical unit of work bound to one borrowed PostgreSQL connection.
pub struct PgSession {
    id: Uuid,
    tx: Option<Transaction<'static, Postgres>>,
    state: SessionState,
    acquired_at: Instant,
}

impl PgSession {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx: Some(tx),
            state: SessionState::Active,
            acquired_at: Instant::now(),
        }
    }

    /// Access the session's connection for query execution.
    pub fn connection(&mut self) -> DbGuardResult<&mut PgConnection> {
        self.tx.as_mut().map(|tx| &mut **tx).ok_or_else(|| {
            DbGuardError::InvalidState("session is no longer bound to a connection".to_string())
        })
    }
}

impl fmt::Debug for PgSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl Transactional for PgSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn commit(&mut self) -> DbGuardResult<()> {
        let tx = self.tx.take().ok_or_else(|| {
            DbGuardError::InvalidState("commit on a session that is no longer active".to_string())
        })?;
        self.state = SessionState::Committing;
        let result = tx.commit().await;
        self.state = SessionState::Closed;
        result.map_err(DbGuardError::from)
    }

    async fn rollback(&mut self) -> DbGuardResult<()> {
        let tx = self.tx.take().ok_or_else(|| {
            DbGuardError::InvalidState("rollback on a session that is no longer active".to_string())
        })?;
        self.state = SessionState::RollingBack;
        let result = tx.rollback().await;
        self.state = SessionState::Closed;
        result.map_err(DbGuardError::from)
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        // Abandoned mid-flight: perform no session operations here, not even
        // a state check against the connection. Dropping the inner
        // transaction hands the connection back through the pool's own
        // cleanup path.
        if self.tx.is_some() {
            self.state = SessionState::Closed;
            debug!(
                session_id = %self.id,
                held_ms = self.acquired_at.elapsed().as_millis() as u64,
                "Session abandoned without finalize; connection released by pool"
            );
        }
    }
}

#[async_trait]
impl SessionSource for Database {
    type Session = PgSession;

    async fn acquire(&self) -> DbGuardResult<PgSession> {
        let started = Instant::now();
        match self.pool().begin().await {
            Ok(tx) => {
                let duration_us = started.elapsed().as_micros() as u64;
                self.record_acquire_us(duration_us);
                let session = PgSession::new(tx);
                debug!(
                    session_id = %session.id,
                    pool = %self.name(),
                    acquire_us = duration_us,
                    "Session acquired"
                );
                Ok(session)
            }
            Err(e) => {
                self.record_acquire_error();
                Err(DbGuardError::from(e))
            }
        }
    }
}

/// Acquire a session, run `body`, and finalize per the lifecycle contract.
///
/// Returns whatever `body` returns; on an error the original error is
/// re-raised unchanged after the rollback attempt. If the returned future is
/// dropped before completion (cooperative cancellation), no finalize code
/// runs at all; see the module docs.
pub async fn with_session<S, T>(
    source: &S,
    body: impl for<'a> FnOnce(&'a mut S::Session) -> BoxFuture<'a, DbGuardResult<T>> + Send,
) -> DbGuardResult<T>
where
    S: SessionSource,
{
    let mut session = source.acquire().await?;
    let result = body(&mut session).await;
    finalize(session, result).await
}

/// Apply the finalize rules to a completed body result.
async fn finalize<Sess, T>(mut session: Sess, result: DbGuardResult<T>) -> DbGuardResult<T>
where
    Sess: Transactional,
{
    match result {
        Ok(value) => {
            if session.is_active() && session.in_transaction() {
                session.commit().await?;
                debug!(session_id = %session.id(), "Session committed");
            } else {
                debug!(
                    session_id = %session.id(),
                    state = %session.state(),
                    "Commit skipped; session not in a finalizable state"
                );
            }
            Ok(value)
        }
        Err(original) => {
            if session.is_active() && session.in_transaction() {
                match session.rollback().await {
                    Ok(()) => debug!(session_id = %session.id(), "Session rolled back"),
                    Err(rollback_err) => error!(
                        session_id = %session.id(),
                        error = %rollback_err,
                        "Rollback failed while discarding session"
                    ),
                }
            }
            Err(original)
        }
    }
}
