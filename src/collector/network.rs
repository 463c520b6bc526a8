//! Network throughput sampler.
//!
//! Rates come from two readings of `/proc/net/dev`; connection counts come
//! from `/proc/net/tcp` and `/proc/net/tcp6` on every tick.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::collector::procfs::parser::{NetDevStats, parse_net_dev, parse_net_tcp_states};
use crate::collector::rates::{SamplerState, per_second};
use crate::collector::{CollectError, FileSystem, Probe, proc_file};
use crate::storage::model::NetworkMetrics;

/// Reads interface counters and TCP connection tables.
#[derive(Debug, Clone)]
pub struct NetworkReader {
    proc_path: String,
    /// Fixed interface, or `None` to pick the busiest non-loopback one.
    interface: Option<String>,
}

/// Raw result of one [`NetworkReader`] probe.
#[derive(Debug, Clone)]
pub struct NetworkReading {
    pub device: NetDevStats,
    pub connection_state_counts: BTreeMap<String, u64>,
}

impl NetworkReader {
    pub fn new(proc_path: &str, interface: Option<String>) -> Self {
        Self {
            proc_path: proc_path.to_string(),
            interface,
        }
    }

    fn select(&self, devices: Vec<NetDevStats>) -> Option<NetDevStats> {
        match &self.interface {
            Some(name) => devices.into_iter().find(|d| &d.interface == name),
            None => devices
                .into_iter()
                .filter(|d| d.interface != "lo")
                .max_by_key(|d| d.rx_bytes.saturating_add(d.tx_bytes)),
        }
    }
}

impl Probe for NetworkReader {
    type Output = NetworkReading;

    fn name(&self) -> &'static str {
        "network"
    }

    fn probe<F: FileSystem>(&self, fs: &F) -> Result<NetworkReading, CollectError> {
        let content = fs.read_to_string(Path::new(&proc_file(&self.proc_path, "net/dev")))?;
        let devices = parse_net_dev(&content)?;

        let device = self.select(devices).ok_or_else(|| {
            CollectError::Unavailable(match &self.interface {
                Some(name) => format!("interface {} not found", name),
                None => "no non-loopback interface".to_string(),
            })
        })?;

        let mut connection_state_counts = BTreeMap::new();
        for table in ["net/tcp", "net/tcp6"] {
            match fs.read_to_string(Path::new(&proc_file(&self.proc_path, table))) {
                Ok(content) => parse_net_tcp_states(&content, &mut connection_state_counts),
                Err(e) => debug!(table, error = %e, "connection table unavailable"),
            }
        }

        Ok(NetworkReading {
            device,
            connection_state_counts,
        })
    }
}

/// Stateful network sampler.
///
/// The first reading for an interface seeds the state and reports zero rates.
#[derive(Debug)]
pub struct NetworkSampler {
    reader: NetworkReader,
    state: Option<SamplerState<NetDevStats>>,
}

impl NetworkSampler {
    pub fn new(proc_path: &str, interface: Option<String>) -> Self {
        Self {
            reader: NetworkReader::new(proc_path, interface),
            state: None,
        }
    }

    /// The stateless read step, for running on a worker thread.
    pub fn reader(&self) -> &NetworkReader {
        &self.reader
    }

    /// Interface of the stored baseline, if any.
    pub fn seeded_interface(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.previous.interface.as_str())
    }

    /// Reads the counters now and folds them into the state.
    pub fn sample<F: FileSystem>(&mut self, fs: &F) -> NetworkMetrics {
        let reading = self.reader.probe(fs);
        self.update(reading, Instant::now())
    }

    /// Folds a reading taken at `captured_at` into the state.
    ///
    /// A failed reading yields the fallback metric and leaves the state
    /// untouched. Rates are signed: a counter that went backwards produces a
    /// negative rate, which is passed on as-is.
    pub fn update(
        &mut self,
        reading: Result<NetworkReading, CollectError>,
        captured_at: Instant,
    ) -> NetworkMetrics {
        let reading = match reading {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "network sample failed, keeping previous state");
                return Self::fallback();
            }
        };
        let device = reading.device;

        let (rx_rate, tx_rate) = match &self.state {
            Some(state) if state.previous.interface == device.interface => {
                let elapsed = state.elapsed_secs(captured_at);
                (
                    per_second(device.rx_bytes, state.previous.rx_bytes, elapsed),
                    per_second(device.tx_bytes, state.previous.tx_bytes, elapsed),
                )
            }
            Some(state) => {
                info!(
                    from = %state.previous.interface,
                    to = %device.interface,
                    "network interface changed, reseeding"
                );
                (0.0, 0.0)
            }
            None => {
                debug!(interface = %device.interface, "network sampler seeded");
                (0.0, 0.0)
            }
        };

        if rx_rate < 0.0 || tx_rate < 0.0 {
            debug!(
                interface = %device.interface,
                rx_rate,
                tx_rate,
                "negative network rate, counter reset suspected"
            );
        }

        let total_connections = reading.connection_state_counts.values().sum();
        let metrics = NetworkMetrics {
            interface_name: device.interface.clone(),
            rx_bytes: device.rx_bytes,
            tx_bytes: device.tx_bytes,
            rx_rate_bytes_per_sec: rx_rate,
            tx_rate_bytes_per_sec: tx_rate,
            connection_state_counts: reading.connection_state_counts,
            total_connections,
        };

        self.state = Some(SamplerState::new(device, captured_at));
        metrics
    }

    /// Zero-value metric reported when the counters cannot be read.
    pub fn fallback() -> NetworkMetrics {
        NetworkMetrics {
            interface_name: "unknown".to_string(),
            ..Default::default()
        }
    }
}
