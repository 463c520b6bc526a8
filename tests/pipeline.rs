//! End-to-end checks of collection, buffering and scheduling through the
//! public API, with a mock /proc and an in-memory sink.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostpulse::collector::{Aggregator, AggregatorConfig, MockFs};
use hostpulse::scheduler::{Clock, ManualClock, Scheduler, SchedulerConfig};
use hostpulse::storage::{DispatchBuffer, MetricSnapshot, NoopSink, Sink, SinkError};

/// Keeps every stored snapshot in a shared vector.
#[derive(Clone, Default)]
struct RecordingSink {
    stored: Arc<Mutex<Vec<MetricSnapshot>>>,
    removed_per_cleanup: u64,
}

impl RecordingSink {
    fn stored(&self) -> Vec<MetricSnapshot> {
        self.stored.lock().unwrap().clone()
    }
}

impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn store(&mut self, snapshot: &MetricSnapshot) -> bool {
        self.stored.lock().unwrap().push(snapshot.clone());
        true
    }

    fn cleanup(&mut self, _days_to_keep: u32) -> Result<u64, SinkError> {
        Ok(self.removed_per_cleanup)
    }

    fn supports_cleanup(&self) -> bool {
        true
    }
}

fn aggregator(fs: MockFs) -> Aggregator<MockFs> {
    let config = AggregatorConfig {
        server_id: Some("agent-test".to_string()),
        ..Default::default()
    };
    Aggregator::new(fs, config)
}

#[test]
fn test_snapshots_reach_sink_in_batches() {
    let sink = RecordingSink::default();
    let buffer = DispatchBuffer::new(sink.clone(), 3);
    let mut aggregator = aggregator(MockFs::typical_system());

    aggregator.fs_mut().set_cpu_stat(1000, 1000);
    assert!(buffer.push(aggregator.collect_all()));
    aggregator.fs_mut().set_cpu_stat(1500, 1500);
    assert!(buffer.push(aggregator.collect_all()));
    assert!(sink.stored().is_empty());

    aggregator.fs_mut().set_cpu_stat(2500, 1500);
    assert!(buffer.push(aggregator.collect_all()));

    let stored = sink.stored();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(MetricSnapshot::is_complete));
    assert!(stored.iter().all(|s| s.server.hostname == "agent-test"));

    let usage: Vec<f64> = stored
        .iter()
        .map(|s| s.cpu.as_ref().unwrap().usage_percent)
        .collect();
    assert_eq!(usage, vec![0.0, 50.0, 100.0]);
    assert!(stored[0].timestamp < stored[1].timestamp);
    assert!(stored[1].timestamp < stored[2].timestamp);
}

#[test]
fn test_broken_proc_still_produces_snapshots() {
    let sink = RecordingSink::default();
    let buffer = DispatchBuffer::new(sink.clone(), 1);
    let mut aggregator = aggregator(MockFs::empty_system());

    assert!(buffer.push(aggregator.collect_all()));

    let stored = sink.stored();
    assert_eq!(stored.len(), 1);
    let snapshot = &stored[0];
    assert_eq!(snapshot.cpu.as_ref().unwrap().model, "unknown");
    assert_eq!(snapshot.memory.as_ref().unwrap().total_bytes, 0);
    assert_eq!(snapshot.processes.as_ref().unwrap().total_count, 0);
    assert_eq!(snapshot.network.as_ref().unwrap().interface_name, "unknown");
}

#[test]
fn test_snapshot_json_is_camel_case() {
    let mut aggregator = aggregator(MockFs::typical_system());
    let json = serde_json::to_value(aggregator.collect_all()).unwrap();

    assert_eq!(json["server"]["hostname"], "agent-test");
    assert_eq!(json["cpu"]["coreCount"], 4);
    assert!(json["memory"]["usedPercent"].is_number());
    assert!(json["network"]["connectionStateCounts"].is_object());
    assert!(json["processes"]["topByCpu"].is_array());
    assert!(json.get("error").is_none());
}

#[test]
fn test_scheduler_drains_on_stop() {
    let sink = RecordingSink {
        removed_per_cleanup: 3,
        ..Default::default()
    };
    let clock = ManualClock::new();
    let config = SchedulerConfig {
        interval: Duration::from_secs(10),
        cleanup_interval: Duration::from_secs(25),
        cleanup_days_to_keep: 7,
    };
    let mut scheduler = Scheduler::new(
        aggregator(MockFs::typical_system()),
        DispatchBuffer::new(sink.clone(), 5),
        clock.clone(),
        config,
    );

    let start = clock.now();
    while clock.now().duration_since(start) < Duration::from_secs(35) {
        let wait = scheduler.poll();
        clock.sleep(wait);
    }

    // Ticks at 0, 10, 20, 30; cleanup at 25.
    assert_eq!(scheduler.ticks(), 4);
    assert_eq!(scheduler.cleanups(), 1);
    assert!(sink.stored().is_empty());

    let running = AtomicBool::new(false);
    assert!(scheduler.run(&running));
    assert_eq!(sink.stored().len(), 4);
    assert!(scheduler.buffer().is_empty());
}

#[test]
fn test_noop_sink_pipeline() {
    let buffer = DispatchBuffer::new(NoopSink, 1);
    let mut aggregator = aggregator(MockFs::typical_system());

    for _ in 0..3 {
        assert!(buffer.push(aggregator.collect_all()));
    }
    assert!(buffer.is_empty());
    assert_eq!(buffer.stats().pushed, 0);
}
