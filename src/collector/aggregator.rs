//! Per-tick fan-out/fan-in over all collectors.
//!
//! Every probe runs on its own short-lived worker thread and reports back
//! through a channel. The aggregator waits for all of them against one
//! shared deadline; a worker that misses it is abandoned (never joined) and
//! its collector contributes the zero-value fallback. Sampler state is only
//! touched after fan-in, on the calling thread.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::collector::process::DEFAULT_TOP_PROCESSES;
use crate::collector::{
    CollectError, Collector, CpuReading, CpuSampler, DiskCollector, FileSystem, MemoryCollector,
    NetworkReading, NetworkSampler, Probe, ProcessCollector, ServerCollector,
};
use crate::storage::model::{
    DiskMetrics, MemoryMetrics, MetricSnapshot, ProcessMetrics, ServerInfo,
};

/// Settings for the collectors owned by an [`Aggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Root of the proc filesystem.
    pub proc_path: String,
    /// Path whose filesystem is reported by the disk collector.
    pub disk_path: String,
    /// Interface for the network sampler; `None` picks the busiest one.
    pub network_interface: Option<String>,
    pub top_processes: usize,
    /// Deadline for every collector within one tick.
    pub collector_timeout: Duration,
    /// Replaces the kernel hostname in `ServerInfo`.
    pub server_id: Option<String>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            proc_path: "/proc".to_string(),
            disk_path: "/".to_string(),
            network_interface: None,
            top_processes: DEFAULT_TOP_PROCESSES,
            collector_timeout: Duration::from_secs(10),
            server_id: None,
        }
    }
}

/// Timing information for one `collect_all` call.
#[derive(Debug, Clone, Default)]
pub struct AggregatorTiming {
    /// Wall time of the whole tick, fan-out to merge.
    pub total: Duration,
    pub cpu: Duration,
    pub network: Duration,
    pub memory: Duration,
    pub disk: Duration,
    pub processes: Duration,
    pub server: Duration,
}

/// What a worker sends back.
struct Probed<T> {
    result: Result<T, CollectError>,
    /// When the probe finished reading.
    captured_at: Instant,
    /// How long the probe ran.
    elapsed: Duration,
}

type Slot<T> = Option<Receiver<Probed<T>>>;

/// Workers that missed their deadline and have not reported yet, one slot
/// per probe. A probe with an occupied slot is not started again.
#[derive(Default)]
struct Stalled {
    cpu: Slot<CpuReading>,
    network: Slot<NetworkReading>,
    memory: Slot<MemoryMetrics>,
    disk: Slot<DiskMetrics>,
    processes: Slot<ProcessMetrics>,
    server: Slot<ServerInfo>,
}

impl Stalled {
    fn count(&self) -> usize {
        [
            self.cpu.is_some(),
            self.network.is_some(),
            self.memory.is_some(),
            self.disk.is_some(),
            self.processes.is_some(),
            self.server.is_some(),
        ]
        .into_iter()
        .filter(|&stalled| stalled)
        .count()
    }
}

/// A probe started for this tick. `rx` is `None` when the worker from an
/// earlier tick is still running.
struct Pending<T> {
    name: &'static str,
    rx: Option<Receiver<Probed<T>>>,
}

impl<T> Pending<T> {
    /// Waits for the worker until `deadline`. Never blocks past it.
    ///
    /// On timeout the receiver goes back into `slot` so the next tick can
    /// tell whether the worker is still stuck.
    fn wait(self, deadline: Instant, timeout: Duration, slot: &mut Slot<T>) -> Probed<T> {
        let Some(rx) = self.rx else {
            return Probed {
                result: Err(CollectError::Unavailable(format!(
                    "{} worker from an earlier tick is still running",
                    self.name
                ))),
                captured_at: Instant::now(),
                elapsed: Duration::ZERO,
            };
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(probed) => probed,
            Err(RecvTimeoutError::Timeout) => {
                *slot = Some(rx);
                Probed {
                    result: Err(CollectError::Timeout {
                        collector: self.name,
                        after: timeout,
                    }),
                    captured_at: Instant::now(),
                    elapsed: timeout,
                }
            }
            Err(RecvTimeoutError::Disconnected) => Probed {
                result: Err(CollectError::Unavailable(format!(
                    "{} worker exited without a result",
                    self.name
                ))),
                captured_at: Instant::now(),
                elapsed: Duration::ZERO,
            },
        }
    }
}

/// Starts `probe` on a new worker thread with its own handle to `fs`,
/// unless the worker left behind in `slot` is still running.
///
/// A late result from that worker is discarded in favour of a fresh read.
fn start_probe<P, F>(
    slot: &mut Slot<P::Output>,
    probe: &P,
    fs: &F,
) -> io::Result<Pending<P::Output>>
where
    P: Probe,
    F: FileSystem + Clone + 'static,
{
    let name = probe.name();
    if let Some(rx) = slot.take() {
        match rx.try_recv() {
            Err(TryRecvError::Empty) => {
                warn!(collector = name, "previous worker still running, skipping");
                *slot = Some(rx);
                return Ok(Pending { name, rx: None });
            }
            Ok(_) => debug!(collector = name, "discarding late result"),
            Err(TryRecvError::Disconnected) => {}
        }
    }

    let (tx, rx) = mpsc::channel();
    let probe = probe.clone();
    let fs = fs.clone();

    thread::Builder::new()
        .name(format!("collect-{}", name))
        .spawn(move || {
            let started = Instant::now();
            let result = probe.probe(&fs);
            let captured_at = Instant::now();
            // The receiver is gone if the aggregator stopped waiting.
            let _ = tx.send(Probed {
                result,
                captured_at,
                elapsed: captured_at.duration_since(started),
            });
        })?;

    Ok(Pending { name, rx: Some(rx) })
}

/// Returns `now`, or one millisecond past `last` if the wall clock has not
/// moved beyond it.
pub(crate) fn monotonic_after(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
        _ => now,
    }
}

/// Owns all collectors and the sampler state; produces one snapshot per call.
pub struct Aggregator<F: FileSystem + Clone + 'static> {
    fs: F,
    collector_timeout: Duration,
    cpu: CpuSampler,
    network: NetworkSampler,
    memory: MemoryCollector,
    disk: DiskCollector,
    processes: ProcessCollector,
    server: ServerCollector,
    stalled: Stalled,
    last_timestamp: Option<DateTime<Utc>>,
    last_timing: AggregatorTiming,
}

impl<F: FileSystem + Clone + 'static> Aggregator<F> {
    pub fn new(fs: F, config: AggregatorConfig) -> Self {
        let proc_path = config.proc_path.as_str();
        Self {
            fs,
            collector_timeout: config.collector_timeout,
            cpu: CpuSampler::new(proc_path),
            network: NetworkSampler::new(proc_path, config.network_interface.clone()),
            memory: MemoryCollector::new(proc_path),
            disk: DiskCollector::new(proc_path, &config.disk_path),
            processes: ProcessCollector::new(proc_path, config.top_processes),
            server: ServerCollector::new(proc_path, config.server_id.clone()),
            stalled: Stalled::default(),
            last_timestamp: None,
            last_timing: AggregatorTiming::default(),
        }
    }

    /// Returns a mutable reference to the filesystem, for advancing mock counters.
    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    /// Number of workers from earlier ticks that have not reported yet.
    pub fn stalled_workers(&self) -> usize {
        self.stalled.count()
    }

    /// Timing of the most recent `collect_all`.
    pub fn last_timing(&self) -> &AggregatorTiming {
        &self.last_timing
    }

    /// Collects one snapshot.
    ///
    /// Never fails: a failing collector contributes its fallback, and if the
    /// workers cannot even be started the result is a minimal snapshot with
    /// only `server` and `error` set.
    pub fn collect_all(&mut self) -> MetricSnapshot {
        let started = Instant::now();

        let snapshot = match self.fan_out_fan_in(started) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "failed to start collector workers");
                let server = self.server.collect(&self.fs);
                let timestamp = self.next_timestamp();
                MetricSnapshot::error(timestamp, server, format!("aggregation failed: {}", e))
            }
        };

        self.last_timing.total = started.elapsed();
        debug!(timing = ?self.last_timing, "collected snapshot");
        snapshot
    }

    fn fan_out_fan_in(&mut self, started: Instant) -> io::Result<MetricSnapshot> {
        let timeout = self.collector_timeout;
        let deadline = started + timeout;

        let stalled = &mut self.stalled;
        let cpu = start_probe(&mut stalled.cpu, self.cpu.reader(), &self.fs)?;
        let network = start_probe(&mut stalled.network, self.network.reader(), &self.fs)?;
        let memory = start_probe(&mut stalled.memory, &self.memory, &self.fs)?;
        let disk = start_probe(&mut stalled.disk, &self.disk, &self.fs)?;
        let processes = start_probe(&mut stalled.processes, &self.processes, &self.fs)?;
        let server = start_probe(&mut stalled.server, &self.server, &self.fs)?;

        let cpu = cpu.wait(deadline, timeout, &mut stalled.cpu);
        let network = network.wait(deadline, timeout, &mut stalled.network);
        let memory = memory.wait(deadline, timeout, &mut stalled.memory);
        let disk = disk.wait(deadline, timeout, &mut stalled.disk);
        let processes = processes.wait(deadline, timeout, &mut stalled.processes);
        let server = server.wait(deadline, timeout, &mut stalled.server);

        self.last_timing = AggregatorTiming {
            total: Duration::ZERO,
            cpu: cpu.elapsed,
            network: network.elapsed,
            memory: memory.elapsed,
            disk: disk.elapsed,
            processes: processes.elapsed,
            server: server.elapsed,
        };

        let cpu = self.cpu.update(cpu.result, cpu.captured_at);
        let network = self.network.update(network.result, network.captured_at);
        let memory = self.memory.resolve(memory.result);
        let disk = self.disk.resolve(disk.result);
        let processes = self.processes.resolve(processes.result);
        let server = self.server.resolve(server.result);

        Ok(MetricSnapshot {
            timestamp: self.next_timestamp(),
            server,
            cpu: Some(cpu),
            memory: Some(memory),
            disk: Some(disk),
            network: Some(network),
            processes: Some(processes),
            error: None,
        })
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let timestamp = monotonic_after(self.last_timestamp, Utc::now());
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{FsCapacity, MockFs};
    use crate::storage::model::MemoryMetrics;
    use chrono::TimeZone;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Fault {
        Stall(Duration),
        Panic,
        /// Blocks until the flag is set.
        Hang(Arc<AtomicBool>),
    }

    /// Wraps `MockFs`, misbehaving on one path and counting calls to it.
    #[derive(Clone)]
    struct FaultyFs {
        inner: MockFs,
        path: PathBuf,
        fault: Fault,
        entered: Arc<AtomicUsize>,
    }

    impl FaultyFs {
        fn new(path: &str, fault: Fault) -> Self {
            Self {
                inner: MockFs::typical_system(),
                path: PathBuf::from(path),
                fault,
                entered: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn trip(&self, path: &Path) {
            if path != self.path {
                return;
            }
            self.entered.fetch_add(1, Ordering::SeqCst);
            match &self.fault {
                Fault::Stall(delay) => thread::sleep(*delay),
                Fault::Panic => panic!("simulated collector crash"),
                Fault::Hang(released) => {
                    while !released.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
            }
        }
    }

    impl FileSystem for FaultyFs {
        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.trip(path);
            self.inner.read_to_string(path)
        }

        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }

        fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            self.inner.read_dir(path)
        }

        fn statvfs(&self, path: &Path) -> io::Result<FsCapacity> {
            self.trip(path);
            self.inner.statvfs(path)
        }
    }

    #[test]
    fn test_collect_all_typical_system() {
        let mut aggregator = Aggregator::new(MockFs::typical_system(), AggregatorConfig::default());

        let snapshot = aggregator.collect_all();

        assert!(snapshot.is_complete());
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.server.hostname, "web-01");
        assert_eq!(snapshot.cpu.as_ref().unwrap().usage_percent, 0.0);
        assert_eq!(snapshot.network.as_ref().unwrap().interface_name, "eth0");
        assert_eq!(snapshot.processes.as_ref().unwrap().total_count, 7);
        assert_eq!(snapshot.disk.as_ref().unwrap().filesystem, "/dev/sda1");
    }

    #[test]
    fn test_second_tick_uses_sampler_state() {
        let mut aggregator = Aggregator::new(MockFs::typical_system(), AggregatorConfig::default());

        aggregator.fs_mut().set_cpu_stat(1000, 1000);
        aggregator.collect_all();

        aggregator.fs_mut().set_cpu_stat(1500, 1500);
        let snapshot = aggregator.collect_all();

        assert_eq!(snapshot.cpu.unwrap().usage_percent, 50.0);
    }

    #[test]
    fn test_partial_failure_uses_fallbacks() {
        let mut fs = MockFs::typical_system();
        fs.remove_file("/proc/meminfo");
        fs.remove_file("/proc/net/dev");
        let mut aggregator = Aggregator::new(fs, AggregatorConfig::default());

        let snapshot = aggregator.collect_all();

        assert!(snapshot.is_complete());
        assert_eq!(snapshot.memory.unwrap().total_bytes, 0);
        assert_eq!(snapshot.network.unwrap(), NetworkSampler::fallback());
        assert_eq!(snapshot.server.hostname, "web-01");
    }

    #[test]
    fn test_slow_collector_times_out() {
        let fs = FaultyFs::new("/proc/meminfo", Fault::Stall(Duration::from_secs(2)));
        let config = AggregatorConfig {
            collector_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let mut aggregator = Aggregator::new(fs, config);

        let snapshot = aggregator.collect_all();

        assert_eq!(snapshot.memory.unwrap(), MemoryMetrics::default());
        assert_eq!(snapshot.server.hostname, "web-01");
        assert!(aggregator.last_timing().total < Duration::from_secs(2));
    }

    #[test]
    fn test_hung_collector_is_not_restarted() {
        let released = Arc::new(AtomicBool::new(false));
        let fs = FaultyFs::new("/", Fault::Hang(released.clone()));
        let entered = fs.entered.clone();
        let config = AggregatorConfig {
            collector_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let mut aggregator = Aggregator::new(fs, config);

        for _ in 0..20 {
            let snapshot = aggregator.collect_all();
            assert!(snapshot.is_complete());
            assert_eq!(snapshot.disk.unwrap(), DiskCollector::new("/proc", "/").fallback());
            assert_eq!(snapshot.memory.unwrap().total_bytes, 16384000 * 1024);
        }
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert_eq!(aggregator.stalled_workers(), 1);

        // Once the stuck call returns, the next tick reads afresh.
        released.store(true, Ordering::SeqCst);
        let mut recovered = None;
        for _ in 0..100 {
            let disk = aggregator.collect_all().disk.unwrap();
            if disk.filesystem == "/dev/sda1" {
                recovered = Some(disk);
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        assert!(recovered.is_some());
        assert_eq!(entered.load(Ordering::SeqCst), 2);
        assert_eq!(aggregator.stalled_workers(), 0);
    }

    #[test]
    fn test_panicking_collector_uses_fallback() {
        let fs = FaultyFs::new("/proc/sys/kernel/hostname", Fault::Panic);
        let mut aggregator = Aggregator::new(fs, AggregatorConfig::default());

        let snapshot = aggregator.collect_all();

        assert_eq!(snapshot.server.hostname, "unknown");
        assert_eq!(snapshot.cpu.unwrap().core_count, 4);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut aggregator = Aggregator::new(MockFs::typical_system(), AggregatorConfig::default());

        let first = aggregator.collect_all();
        let second = aggregator.collect_all();
        let third = aggregator.collect_all();

        assert!(first.timestamp < second.timestamp);
        assert!(second.timestamp < third.timestamp);
    }

    #[test]
    fn test_monotonic_after() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();

        assert_eq!(monotonic_after(None, t), t);
        assert_eq!(monotonic_after(Some(t), later), later);
        assert_eq!(
            monotonic_after(Some(t), earlier),
            t + chrono::Duration::milliseconds(1)
        );
        assert_eq!(
            monotonic_after(Some(t), t),
            t + chrono::Duration::milliseconds(1)
        );
    }
}
