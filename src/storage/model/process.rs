//! Process table summary.

use serde::{Deserialize, Serialize};

/// One row of a top-N process list.
///
/// Source: `/proc/[pid]/stat`, `/proc/[pid]/status`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    /// Average CPU share over the process lifetime.
    pub cpu_percent: f64,
    /// Resident set size as a share of MemTotal.
    pub memory_percent: f64,
    /// Resident set size in bytes.
    pub memory_bytes: u64,
}

/// The busiest processes by CPU and by memory, plus the total process count.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMetrics {
    pub top_by_cpu: Vec<ProcessEntry>,
    pub top_by_memory: Vec<ProcessEntry>,
    pub total_count: u64,
}
