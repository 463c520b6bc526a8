//! Batching between the aggregator and the sink.
//!
//! Snapshots accumulate in a FIFO buffer and are handed to the sink one at
//! a time when the buffer reaches the batch size, or when a flush is forced.
//! Delivery is at-most-once: a snapshot the sink rejects is logged and
//! dropped, and the rest of the batch is still delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::storage::model::MetricSnapshot;
use crate::storage::sink::{Sink, SinkError};

/// Default number of snapshots per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Cumulative counters of a [`DispatchBuffer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Snapshots accepted by `push`.
    pub pushed: u64,
    /// Snapshots the sink stored.
    pub delivered: u64,
    /// Snapshots the sink rejected (dropped).
    pub failed: u64,
    /// Flushes that delivered at least one snapshot.
    pub flushes: u64,
}

#[derive(Debug, Default)]
struct AtomicStats {
    pushed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    flushes: AtomicU64,
}

/// Locks a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// FIFO buffer of snapshots in front of a sink.
///
/// The buffer is shareable between threads: both the pending vector and the
/// sink sit behind their own mutex.
pub struct DispatchBuffer<S: Sink> {
    pending: Mutex<Vec<MetricSnapshot>>,
    sink: Mutex<S>,
    batch_size: usize,
    noop: bool,
    stats: AtomicStats,
}

impl<S: Sink> DispatchBuffer<S> {
    /// Creates a buffer flushing every `batch_size` snapshots (at least 1).
    pub fn new(sink: S, batch_size: usize) -> Self {
        let noop = sink.is_noop();
        Self {
            pending: Mutex::new(Vec::with_capacity(batch_size)),
            sink: Mutex::new(sink),
            batch_size: batch_size.max(1),
            noop,
            stats: AtomicStats::default(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of snapshots waiting for the next flush.
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            pushed: self.stats.pushed.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            flushes: self.stats.flushes.load(Ordering::Relaxed),
        }
    }

    /// Appends a snapshot and flushes if the batch is full.
    ///
    /// Returns the flush result when a flush happened, true otherwise. With a
    /// no-op sink nothing is buffered.
    pub fn push(&self, snapshot: MetricSnapshot) -> bool {
        if self.noop {
            return true;
        }

        let len = {
            let mut pending = lock(&self.pending);
            pending.push(snapshot);
            pending.len()
        };
        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        debug!(pending = len, batch_size = self.batch_size, "snapshot buffered");

        if len >= self.batch_size {
            self.flush()
        } else {
            true
        }
    }

    /// Delivers everything currently buffered, in FIFO order.
    ///
    /// The sink lock is taken before the buffer is swapped out, so concurrent
    /// flushes deliver whole batches in the order they were taken. Returns
    /// false if any snapshot was rejected.
    pub fn flush(&self) -> bool {
        if self.noop {
            return true;
        }

        let mut sink = lock(&self.sink);
        let batch = std::mem::take(&mut *lock(&self.pending));
        if batch.is_empty() {
            return true;
        }

        let total = batch.len();
        let mut failed = 0usize;
        for (index, snapshot) in batch.iter().enumerate() {
            if sink.store(snapshot) {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            } else {
                failed += 1;
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    sink = sink.name(),
                    index,
                    timestamp = %snapshot.timestamp,
                    "snapshot dropped after delivery failure"
                );
            }
        }
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);

        if failed == 0 {
            info!(sink = sink.name(), count = total, "batch delivered");
        } else {
            warn!(
                sink = sink.name(),
                delivered = total - failed,
                failed,
                "batch delivered with failures"
            );
        }

        failed == 0
    }

    /// Flushes until the buffer is empty. Used on shutdown.
    pub fn drain(&self) -> bool {
        let mut ok = true;
        while !self.is_empty() {
            ok &= self.flush();
        }
        ok
    }

    /// Whether the sink has a retention cleanup.
    pub fn supports_cleanup(&self) -> bool {
        lock(&self.sink).supports_cleanup()
    }

    /// Runs the sink's retention cleanup. Waits for an in-flight flush.
    pub fn cleanup(&self, days_to_keep: u32) -> Result<u64, SinkError> {
        lock(&self.sink).cleanup(days_to_keep)
    }

    pub fn sink_name(&self) -> &'static str {
        lock(&self.sink).name()
    }

    /// Runs `f` with the sink locked.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut sink = lock(&self.sink);
        f(&mut *sink)
    }
}
