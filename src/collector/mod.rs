//! Host metrics collectors for Linux.
//!
//! This module reads raw counters from the `/proc` filesystem (and
//! `statvfs(3)`) and turns them into the sections of a
//! [`MetricSnapshot`](crate::storage::model::MetricSnapshot).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Aggregator                           │
//! │  ┌────────────────────────┐   ┌───────────────────────────┐  │
//! │  │  Delta samplers        │   │  Snapshot collectors      │  │
//! │  │  - CpuSampler          │   │  - MemoryCollector        │  │
//! │  │  - NetworkSampler      │   │  - DiskCollector          │  │
//! │  │  (SamplerState)        │   │  - ProcessCollector       │  │
//! │  └──────────┬─────────────┘   │  - ServerCollector        │  │
//! │             │                 └─────────────┬─────────────┘  │
//! │             └──────────────┬────────────────┘                │
//! │                     ┌──────▼──────┐                          │
//! │                     │  FileSystem │ (trait)                  │
//! │                     └──────┬──────┘                          │
//! └────────────────────────────┼─────────────────────────────────┘
//!                ┌─────────────┴─────────────┐
//!         ┌──────▼──────┐             ┌──────▼──────┐
//!         │   RealFs    │             │   MockFs    │
//!         │ (Linux)     │             │ (Testing)   │
//!         └─────────────┘             └─────────────┘
//! ```
//!
//! Every collector is split into a stateless [`Probe`] that only reads and
//! parses, and whatever turns the reading into a metric. The aggregator runs
//! probes on worker threads with a deadline; samplers fold the readings into
//! their state afterwards on the calling thread.
//!
//! # Testing (with MockFs)
//!
//! ```
//! use hostpulse::collector::{Aggregator, AggregatorConfig, MockFs};
//!
//! let fs = MockFs::typical_system();
//! let mut aggregator = Aggregator::new(fs, AggregatorConfig::default());
//! let snapshot = aggregator.collect_all();
//! assert!(snapshot.is_complete());
//! ```

mod aggregator;
mod cpu;
mod disk;
mod memory;
pub mod mock;
mod network;
mod process;
pub mod procfs;
pub mod rates;
mod server;
pub mod traits;

pub use aggregator::{Aggregator, AggregatorConfig, AggregatorTiming};
pub use cpu::{CpuReader, CpuReading, CpuSampler};
pub use disk::DiskCollector;
pub use memory::MemoryCollector;
pub use mock::MockFs;
pub use network::{NetworkReader, NetworkReading, NetworkSampler};
pub use process::{DEFAULT_TOP_PROCESSES, ProcessCollector};
pub use procfs::CollectError;
pub use server::ServerCollector;
pub use traits::{FileSystem, FsCapacity, RealFs};

use tracing::warn;

/// Stateless read step of a collector.
///
/// A probe only owns configuration, so it can be cloned onto a worker thread
/// together with a clone of the filesystem handle.
pub trait Probe: Clone + Send + 'static {
    type Output: Send + 'static;

    /// Short name used in logs and timeout errors.
    fn name(&self) -> &'static str;

    /// Reads and parses the raw counters.
    fn probe<F: FileSystem>(&self, fs: &F) -> Result<Self::Output, CollectError>;
}

/// A probe whose output is already a finished metric section.
///
/// `collect` never fails from the caller's point of view: errors are logged
/// and replaced by the zero-value fallback.
pub trait Collector: Probe {
    /// Value reported when the probe fails or times out.
    fn fallback(&self) -> Self::Output;

    fn collect<F: FileSystem>(&self, fs: &F) -> Self::Output {
        self.resolve(self.probe(fs))
    }

    /// Turns a probe result into a metric, logging failures.
    fn resolve(&self, result: Result<Self::Output, CollectError>) -> Self::Output {
        result.unwrap_or_else(|e| {
            warn!(collector = self.name(), error = %e, "collection failed, using fallback");
            self.fallback()
        })
    }
}

/// Joins `name` onto the configured proc root.
pub(crate) fn proc_file(proc_path: &str, name: &str) -> String {
    format!("{}/{}", proc_path.trim_end_matches('/'), name)
}
