//! Data models shared by the collectors and the sinks.
//!
//! - [`system`]: CPU, memory, disk and network sections
//! - [`process`]: top-N process lists
//! - [`snapshot`]: `MetricSnapshot`, the unit handed to a sink
//!
//! All types serialize to camelCase JSON, which is the wire format of the
//! API sink.

mod process;
mod snapshot;
mod system;

pub use process::{ProcessEntry, ProcessMetrics};
pub use snapshot::{MetricSnapshot, ServerInfo};
pub use system::{
    CpuMetrics, DiskIoStats, DiskMetrics, MemoryMetrics, NetworkMetrics, SwapMetrics,
};
