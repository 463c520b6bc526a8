//! The agent's main loop.
//!
//! A single thread alternates between two periodic jobs: the tick
//! (aggregate a snapshot, push it into the dispatch buffer) and, when the
//! sink supports it, the retention cleanup. The next tick is scheduled one
//! interval after the previous tick *completed*, so a slow tick delays the
//! schedule instead of piling up. When the shared running flag goes false
//! the loop exits within one poll interval and drains the buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::collector::{Aggregator, FileSystem};
use crate::storage::{DispatchBuffer, Sink};

/// How often the loop re-checks the running flag while waiting.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Source of time for the scheduler.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Real monotonic time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual time for tests: `sleep` advances the clock instantly.
///
/// Clones share the same time, so a test can keep a handle while the
/// scheduler owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Periods of the scheduler's jobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Time between retention cleanups.
    pub cleanup_interval: Duration,
    /// Age in days beyond which the sink deletes data.
    pub cleanup_days_to_keep: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            cleanup_days_to_keep: 30,
        }
    }
}

/// Drives ticks and cleanups on the calling thread.
pub struct Scheduler<F, S, C>
where
    F: FileSystem + Clone + 'static,
    S: Sink,
    C: Clock,
{
    aggregator: Aggregator<F>,
    buffer: DispatchBuffer<S>,
    clock: C,
    config: SchedulerConfig,
    /// Set while a tick is in progress.
    ticking: bool,
    next_tick: Instant,
    /// `None` when the sink has no cleanup.
    next_cleanup: Option<Instant>,
    ticks: u64,
    cleanups: u64,
}

impl<F, S, C> Scheduler<F, S, C>
where
    F: FileSystem + Clone + 'static,
    S: Sink,
    C: Clock,
{
    /// Creates a scheduler whose first tick is due immediately and whose
    /// first cleanup is due one cleanup interval from now.
    pub fn new(
        aggregator: Aggregator<F>,
        buffer: DispatchBuffer<S>,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        let now = clock.now();
        let next_cleanup = buffer
            .supports_cleanup()
            .then(|| now + config.cleanup_interval);

        Self {
            aggregator,
            buffer,
            clock,
            config,
            ticking: false,
            next_tick: now,
            next_cleanup,
            ticks: 0,
            cleanups: 0,
        }
    }

    pub fn buffer(&self) -> &DispatchBuffer<S> {
        &self.buffer
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of cleanups attempted.
    pub fn cleanups(&self) -> u64 {
        self.cleanups
    }

    /// Collects one snapshot and hands it to the buffer.
    ///
    /// Returns the buffer's result, or false if a tick is already running.
    pub fn tick(&mut self) -> bool {
        if self.ticking {
            warn!("previous tick still running, skipping");
            return false;
        }
        self.ticking = true;

        let snapshot = self.aggregator.collect_all();
        self.ticks += 1;
        info!("Snapshot #{}: {}", self.ticks, snapshot.describe());

        let delivered = self.buffer.push(snapshot);
        debug!(pending = self.buffer.len(), "buffer state after tick");

        self.ticking = false;
        delivered
    }

    /// Runs the sink's retention cleanup. Failures are logged only.
    pub fn run_cleanup(&mut self) -> Option<u64> {
        self.cleanups += 1;
        let days = self.config.cleanup_days_to_keep;

        match self.buffer.cleanup(days) {
            Ok(removed) => {
                info!(removed, days_to_keep = days, "retention cleanup finished");
                Some(removed)
            }
            Err(e) => {
                error!(error = %e, "retention cleanup failed");
                None
            }
        }
    }

    /// Runs every job that is due and returns the time until the next one.
    pub fn poll(&mut self) -> Duration {
        let now = self.clock.now();

        if now >= self.next_tick {
            self.tick();
            self.next_tick = self.clock.now() + self.config.interval;
        }

        if let Some(due) = self.next_cleanup
            && now >= due
        {
            self.run_cleanup();
            self.next_cleanup = Some(self.clock.now() + self.config.cleanup_interval);
        }

        let next = match self.next_cleanup {
            Some(cleanup) => self.next_tick.min(cleanup),
            None => self.next_tick,
        };
        next.saturating_duration_since(self.clock.now())
    }

    /// Loops until `running` goes false, then drains the buffer.
    ///
    /// Returns false if any snapshot was dropped during the final drain.
    pub fn run(&mut self, running: &AtomicBool) -> bool {
        info!(
            interval = ?self.config.interval,
            batch_size = self.buffer.batch_size(),
            sink = self.buffer.sink_name(),
            "Starting collection loop"
        );

        while running.load(Ordering::SeqCst) {
            let mut remaining = self.poll();

            // Sleep with periodic checks for shutdown signal
            while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
                let step = remaining.min(POLL_INTERVAL);
                self.clock.sleep(step);
                remaining = remaining.saturating_sub(step);
            }
        }

        self.shutdown()
    }

    /// Flushes every buffered snapshot.
    pub fn shutdown(&mut self) -> bool {
        info!("Shutting down...");

        let pending = self.buffer.len();
        if pending == 0 {
            return true;
        }

        info!("Flushing {} pending snapshots...", pending);
        let delivered = self.buffer.drain();
        if delivered {
            info!("Pending snapshots flushed");
        } else {
            warn!("Some pending snapshots could not be delivered");
        }
        delivered
    }
}
