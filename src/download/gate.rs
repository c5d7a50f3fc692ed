//! Admission gate bounding concurrent fetch work.
//!
//! The gate wraps a tokio [`Semaphore`] sized to the download concurrency
//! bound. Waiters are admitted in FIFO order. A [`GatePermit`] releases its
//! slot when dropped, so every exit path of an item task (success, failure,
//! panic unwind) gives the slot back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// The gate was closed before a permit could be handed out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("download gate closed")]
pub struct GateClosed;

#[derive(Debug, Default)]
struct GateCounters {
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting gate with capacity `limit`.
#[derive(Debug, Clone)]
pub struct DownloadGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    counters: Arc<GateCounters>,
}

impl DownloadGate {
    /// Creates a gate admitting at most `limit` holders at once (minimum 1).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`GateClosed`] if [`close`](Self::close) was called before or
    /// while waiting.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;

        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);
        trace!(active, limit = self.limit, "gate permit acquired");

        Ok(GatePermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Returns a slot explicitly. Equivalent to dropping the permit.
    pub fn release(&self, permit: GatePermit) {
        drop(permit);
    }

    /// Stops admitting: pending and future `acquire` calls fail.
    /// Permits already handed out stay valid until dropped.
    pub fn close(&self) {
        if !self.semaphore.is_closed() {
            debug!("closing download gate");
            self.semaphore.close();
        }
    }

    /// Returns true once the gate has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at the same time.
    #[must_use]
    pub fn peak_active(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Capacity of the gate.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A held slot of a [`DownloadGate`].
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<GateCounters>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}
