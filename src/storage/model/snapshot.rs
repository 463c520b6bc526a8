//! The per-tick snapshot handed from the aggregator to the sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::ProcessMetrics;
use super::system::{CpuMetrics, DiskMetrics, MemoryMetrics, NetworkMetrics};

/// Identity of the host that produced a snapshot.
///
/// Source: `/proc/sys/kernel/{hostname,osrelease}`, `/proc/uptime`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Hostname, or the configured server id.
    pub hostname: String,
    /// Operating system family (`linux`, `macos`, ...).
    pub platform: String,
    /// Kernel release string.
    pub release: String,
    /// Seconds since boot.
    pub uptime_seconds: u64,
}

/// All metrics captured during one tick.
///
/// A snapshot is immutable once the aggregator has stamped it. Sections are
/// `None` only on the minimal error snapshot produced when aggregation
/// itself fails; a collector that fails contributes its zero-value default
/// instead.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    /// Capture instant, taken once at merge time.
    pub timestamp: DateTime<Utc>,
    pub server: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processes: Option<ProcessMetrics>,
    /// Reason the snapshot is incomplete. Set only on the minimal error snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetricSnapshot {
    /// Builds the minimal snapshot emitted when a tick could not be aggregated.
    pub fn error(timestamp: DateTime<Utc>, server: ServerInfo, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            server,
            cpu: None,
            memory: None,
            disk: None,
            network: None,
            processes: None,
            error: Some(message.into()),
        }
    }

    /// Returns true when every metric section is present.
    pub fn is_complete(&self) -> bool {
        self.cpu.is_some()
            && self.memory.is_some()
            && self.disk.is_some()
            && self.network.is_some()
            && self.processes.is_some()
    }

    /// Short human-readable summary for log lines.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(cpu) = &self.cpu {
            parts.push(format!("cpu {:.2}%", cpu.usage_percent));
        }
        if let Some(mem) = &self.memory {
            parts.push(format!("mem {:.2}%", mem.used_percent));
        }
        if let Some(disk) = &self.disk {
            parts.push(format!("disk {:.2}%", disk.used_percent));
        }
        if let Some(net) = &self.network {
            parts.push(format!(
                "{} rx {:.0} B/s tx {:.0} B/s",
                net.interface_name, net.rx_rate_bytes_per_sec, net.tx_rate_bytes_per_sec
            ));
        }
        if let Some(procs) = &self.processes {
            parts.push(format!("{} processes", procs.total_count));
        }
        if let Some(error) = &self.error {
            parts.push(format!("error: {}", error));
        }

        parts.join(", ")
    }
}
