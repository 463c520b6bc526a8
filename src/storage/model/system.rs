//! System-wide metric sections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// CPU utilisation and identity.
///
/// Source: `/proc/stat`, `/proc/cpuinfo`, `/proc/loadavg`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    /// Busy share of all CPU time since the previous sample, 0..=100.
    pub usage_percent: f64,
    pub core_count: u32,
    /// Model name, `"unknown"` when not reported.
    pub model: String,
    /// Clock speed of the first core in MHz, 0 when not reported.
    pub speed_mhz: f64,
    /// 1, 5 and 15 minute load averages.
    pub load_avg: [f64; 3],
}

/// Physical memory usage.
///
/// Source: `/proc/meminfo`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    pub total_bytes: u64,
    /// Memory available for new allocations (MemAvailable, or MemFree on old kernels).
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<SwapMetrics>,
}

/// Swap usage, present only when the kernel reports swap.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SwapMetrics {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
}

/// Capacity and I/O of the monitored filesystem.
///
/// Source: `statvfs(3)`, `/proc/mounts`, `/proc/diskstats`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiskMetrics {
    /// Backing device as listed in `/proc/mounts` (`/dev/sda1`).
    pub filesystem: String,
    pub mount_point: String,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    /// `used / (used + available)`, as `df` reports it.
    pub used_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io: Option<DiskIoStats>,
}

/// Cumulative block device counters since boot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiskIoStats {
    pub reads: u64,
    pub writes: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    /// Milliseconds spent doing I/O.
    pub io_time_ms: u64,
}

/// Traffic and connections of one network interface.
///
/// Source: `/proc/net/dev`, `/proc/net/tcp`, `/proc/net/tcp6`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub interface_name: String,
    /// Cumulative bytes received.
    pub rx_bytes: u64,
    /// Cumulative bytes transmitted.
    pub tx_bytes: u64,
    /// Negative after a counter reset.
    pub rx_rate_bytes_per_sec: f64,
    /// Negative after a counter reset.
    pub tx_rate_bytes_per_sec: f64,
    /// Socket count per TCP state name (`ESTABLISHED`, `LISTEN`, ...).
    pub connection_state_counts: BTreeMap<String, u64>,
    pub total_connections: u64,
}
