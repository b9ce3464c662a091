//! One transaction and one outbox per request.
//!
//! A [`RequestScope`] is opened before the handler runs and finished after
//! it returns. Every store call the handler makes goes through the same
//! transaction; every event it stages goes into the same outbox. Finishing
//! with a commit publishes the outbox, finishing with a rollback drops it.
//!
//! # Example
//!
//! ```ignore
//! let scope = RequestScope::begin(&storage).await?;
//! let result = {
//!     let mut guard = scope.lock().await;
//!     let (tx, outbox) = guard.parts()?;
//!     queue::add_entry(tx, outbox, &ctx, details).await
//! };
//! scope.finish(result.is_ok(), bus.as_ref()).await?;
//! ```

use office_hours_core::QueueError;
use office_hours_core::event_bus::EventBus;
use office_hours_core::store::{Storage, StoreResult, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::outbox::Outbox;

/// How a scope ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Writes persisted and events published.
    Committed {
        /// Deliveries made by the outbox flush.
        delivered: usize,
    },
    /// Writes and events discarded.
    RolledBack,
    /// The scope had already been finished.
    AlreadyFinished,
}

struct ScopeState<T> {
    tx: Option<T>,
    outbox: Outbox,
}

/// Shared handle to a request's transaction and outbox.
///
/// Clones share the same transaction. Exactly one finish takes effect.
pub struct RequestScope<T> {
    state: Arc<Mutex<ScopeState<T>>>,
}

impl<T> Clone for RequestScope<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for RequestScope<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope").finish_non_exhaustive()
    }
}

/// Exclusive access to an open scope.
pub struct ScopeGuard<T> {
    guard: OwnedMutexGuard<ScopeState<T>>,
}

impl<T> ScopeGuard<T> {
    /// The open transaction and the outbox.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Internal`] if the scope was already finished.
    pub fn parts(&mut self) -> Result<(&mut T, &mut Outbox), QueueError> {
        let state = &mut *self.guard;
        match state.tx.as_mut() {
            Some(tx) => Ok((tx, &mut state.outbox)),
            None => Err(QueueError::Internal("transaction already finished".into())),
        }
    }

    /// The open transaction, for read-only work.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Internal`] if the scope was already finished.
    pub fn tx(&mut self) -> Result<&mut T, QueueError> {
        self.parts().map(|(tx, _)| tx)
    }
}

impl<T: Transaction> RequestScope<T> {
    /// Wrap an already open transaction.
    #[must_use]
    pub fn new(tx: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScopeState {
                tx: Some(tx),
                outbox: Outbox::new(),
            })),
        }
    }

    /// Open a transaction on `storage` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns the storage error if no transaction could be opened.
    pub async fn begin<S>(storage: &S) -> StoreResult<Self>
    where
        S: Storage<Tx = T>,
    {
        Ok(Self::new(storage.begin().await?))
    }

    /// Wait for exclusive access.
    pub async fn lock(&self) -> ScopeGuard<T> {
        ScopeGuard {
            guard: Arc::clone(&self.state).lock_owned().await,
        }
    }

    /// End the scope.
    ///
    /// With `commit`, the transaction commits and, only if that succeeds,
    /// the outbox is published. Otherwise the transaction rolls back and
    /// the outbox is dropped.
    ///
    /// # Errors
    ///
    /// Returns the storage error of a failed commit; its events are dropped.
    /// A failed rollback is logged, not returned.
    pub async fn finish(&self, commit: bool, bus: &dyn EventBus) -> StoreResult<Outcome> {
        let (tx, outbox) = {
            let mut state = self.state.lock().await;
            let Some(tx) = state.tx.take() else {
                return Ok(Outcome::AlreadyFinished);
            };
            (tx, std::mem::take(&mut state.outbox))
        };

        if !commit {
            if let Err(error) = tx.rollback().await {
                warn!(error = %error, "Rollback failed");
            }
            metrics::counter!("transactions_total", "outcome" => "rollback").increment(1);
            debug!(discarded = outbox.len(), "Transaction rolled back");
            return Ok(Outcome::RolledBack);
        }

        match tx.commit().await {
            Ok(()) => {
                metrics::counter!("transactions_total", "outcome" => "commit").increment(1);
                let delivered = outbox.flush(bus).await;
                Ok(Outcome::Committed { delivered })
            }
            Err(error) => {
                metrics::counter!("transactions_total", "outcome" => "commit_failed").increment(1);
                warn!(error = %error, discarded = outbox.len(), "Commit failed");
                Err(error)
            }
        }
    }
}
