//! Bounded dispatch buffer shared by all stream workers
//!
//! Producers call [`DispatchBuffer::offer`], which never waits: when the
//! buffer already holds `capacity` identifiers the offer is rejected and the
//! identifier is dropped. The batch dispatcher is the only caller of
//! [`DispatchBuffer::drain`], which swaps the contents out in one step.

use crate::error::{Error, Result};
use crate::types::{Batch, BufferStats, SubmissionId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Fixed-capacity FIFO of submission identifiers
pub struct DispatchBuffer {
    items: Mutex<Vec<SubmissionId>>,
    capacity: usize,
    /// Signalled when an offer fills the buffer to capacity
    full: Notify,
    offered: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchBuffer {
    /// Create a buffer holding at most `capacity` identifiers
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config(
                "buffer capacity must be at least 1",
                "buffer_capacity",
            ));
        }

        Ok(Self {
            items: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            full: Notify::new(),
            offered: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    // A panic while holding the lock cannot leave the Vec half-written, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<SubmissionId>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `id` unless the buffer is full
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferFull`] when the buffer already holds `capacity`
    /// identifiers; the contents are left unchanged.
    pub fn offer(&self, id: SubmissionId) -> Result<()> {
        self.offered.fetch_add(1, Ordering::Relaxed);

        let now_full = {
            let mut items = self.lock();
            if items.len() >= self.capacity {
                drop(items);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(Error::BufferFull {
                    capacity: self.capacity,
                });
            }
            items.push(id);
            items.len() == self.capacity
        };

        self.accepted.fetch_add(1, Ordering::Relaxed);
        if now_full {
            self.full.notify_one();
        }
        Ok(())
    }

    /// Remove and return everything buffered, oldest first
    pub fn drain(&self) -> Batch {
        let mut items = self.lock();
        std::mem::replace(&mut *items, Vec::with_capacity(self.capacity))
    }

    /// Resolves once an offer has filled the buffer
    ///
    /// A fill that happens while nobody is waiting is remembered, so the next
    /// call returns immediately.
    pub async fn filled(&self) {
        self.full.notified().await;
    }

    /// Number of identifiers currently buffered
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the offer counters
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            offered: self.offered.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DispatchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
