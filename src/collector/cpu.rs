//! CPU utilisation sampler.
//!
//! Usage is derived from the difference between two readings of the
//! aggregate `cpu` line in `/proc/stat`, so the sampler keeps the previous
//! counters between ticks.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, warn};

use crate::collector::procfs::parser::{
    CpuInfo, CpuStat, LoadAvg, parse_cpu_stat, parse_cpuinfo, parse_loadavg,
};
use crate::collector::rates::{SamplerState, cpu_usage_percent};
use crate::collector::{CollectError, FileSystem, Probe, proc_file};
use crate::storage::model::CpuMetrics;

/// Reads `/proc/stat`, `/proc/cpuinfo` and `/proc/loadavg`.
#[derive(Debug, Clone)]
pub struct CpuReader {
    proc_path: String,
}

/// Raw result of one [`CpuReader`] probe.
#[derive(Debug, Clone)]
pub struct CpuReading {
    pub stat: CpuStat,
    pub info: CpuInfo,
    /// `None` when `/proc/loadavg` could not be read.
    pub load: Option<LoadAvg>,
}

impl CpuReader {
    pub fn new(proc_path: &str) -> Self {
        Self {
            proc_path: proc_path.to_string(),
        }
    }
}

impl Probe for CpuReader {
    type Output = CpuReading;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn probe<F: FileSystem>(&self, fs: &F) -> Result<CpuReading, CollectError> {
        let content = fs.read_to_string(Path::new(&proc_file(&self.proc_path, "stat")))?;
        let stat = parse_cpu_stat(&content)?;

        // cpuinfo and loadavg are descriptive; their absence does not fail the sample.
        let info = fs
            .read_to_string(Path::new(&proc_file(&self.proc_path, "cpuinfo")))
            .map(|c| parse_cpuinfo(&c))
            .unwrap_or_default();
        let load = fs
            .read_to_string(Path::new(&proc_file(&self.proc_path, "loadavg")))
            .ok()
            .and_then(|c| parse_loadavg(&c).ok());

        Ok(CpuReading { stat, info, load })
    }
}

/// Stateful CPU sampler.
///
/// The first successful reading seeds the state and reports 0% usage.
#[derive(Debug)]
pub struct CpuSampler {
    reader: CpuReader,
    state: Option<SamplerState<CpuStat>>,
}

impl CpuSampler {
    pub fn new(proc_path: &str) -> Self {
        Self {
            reader: CpuReader::new(proc_path),
            state: None,
        }
    }

    /// The stateless read step, for running on a worker thread.
    pub fn reader(&self) -> &CpuReader {
        &self.reader
    }

    /// Returns true once a baseline reading has been stored.
    pub fn is_seeded(&self) -> bool {
        self.state.is_some()
    }

    /// Reads the counters now and folds them into the state.
    pub fn sample<F: FileSystem>(&mut self, fs: &F) -> CpuMetrics {
        let reading = self.reader.probe(fs);
        self.update(reading, Instant::now())
    }

    /// Folds a reading taken at `captured_at` into the state.
    ///
    /// A failed reading yields the fallback metric and leaves the state untouched.
    pub fn update(
        &mut self,
        reading: Result<CpuReading, CollectError>,
        captured_at: Instant,
    ) -> CpuMetrics {
        let reading = match reading {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "cpu sample failed, keeping previous state");
                return Self::fallback();
            }
        };

        let usage_percent = match &self.state {
            Some(state) => cpu_usage_percent(&state.previous, &reading.stat),
            None => {
                debug!("cpu sampler seeded");
                0.0
            }
        };
        self.state = Some(SamplerState::new(reading.stat, captured_at));

        let load_avg = reading
            .load
            .map(|l| [l.load1, l.load5, l.load15])
            .unwrap_or_default();

        CpuMetrics {
            usage_percent,
            core_count: reading.info.core_count,
            model: reading.info.model.unwrap_or_else(|| "unknown".to_string()),
            speed_mhz: reading.info.speed_mhz.unwrap_or(0.0),
            load_avg,
        }
    }

    /// Zero-value metric reported when the counters cannot be read.
    pub fn fallback() -> CpuMetrics {
        CpuMetrics {
            model: "unknown".to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use std::time::Duration;

    #[test]
    fn test_first_sample_is_baseline() {
        let fs = MockFs::typical_system();
        let mut sampler = CpuSampler::new("/proc");

        let metrics = sampler.sample(&fs);

        assert_eq!(metrics.usage_percent, 0.0);
        assert!(sampler.is_seeded());
        assert_eq!(metrics.core_count, 4);
        assert_eq!(metrics.model, "Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz");
        assert_eq!(metrics.speed_mhz, 2400.0);
        assert_eq!(metrics.load_avg, [0.15, 0.10, 0.05]);
    }

    #[test]
    fn test_second_sample_reflects_delta_only() {
        let mut fs = MockFs::typical_system();
        let mut sampler = CpuSampler::new("/proc");
        let t0 = Instant::now();

        // idle 1000 / total 2000
        fs.set_cpu_stat(1000, 1000);
        let reading = sampler.reader().probe(&fs);
        sampler.update(reading, t0);

        // idle 1500 / total 3000
        fs.set_cpu_stat(1500, 1500);
        let reading = sampler.reader().probe(&fs);
        let metrics = sampler.update(reading, t0 + Duration::from_secs(60));
        assert_eq!(metrics.usage_percent, 50.0);

        // fully busy interval
        fs.set_cpu_stat(2500, 1500);
        let reading = sampler.reader().probe(&fs);
        let metrics = sampler.update(reading, t0 + Duration::from_secs(120));
        assert_eq!(metrics.usage_percent, 100.0);
    }

    #[test]
    fn test_failed_read_keeps_state() {
        let mut fs = MockFs::typical_system();
        let mut sampler = CpuSampler::new("/proc");

        fs.set_cpu_stat(1000, 1000);
        sampler.sample(&fs);

        fs.remove_file("/proc/stat");
        let metrics = sampler.sample(&fs);
        assert_eq!(metrics, CpuSampler::fallback());

        // The next successful sample is relative to the last good reading.
        fs.set_cpu_stat(1500, 1500);
        assert_eq!(sampler.sample(&fs).usage_percent, 50.0);
    }

    #[test]
    fn test_failed_first_read_does_not_seed() {
        let fs = MockFs::empty_system();
        let mut sampler = CpuSampler::new("/proc");

        sampler.sample(&fs);
        assert!(!sampler.is_seeded());
    }

    #[test]
    fn test_missing_loadavg_is_not_fatal() {
        let mut fs = MockFs::typical_system();
        fs.remove_file("/proc/loadavg");
        fs.remove_file("/proc/cpuinfo");
        let mut sampler = CpuSampler::new("/proc");

        let metrics = sampler.sample(&fs);
        assert!(sampler.is_seeded());
        assert_eq!(metrics.load_avg, [0.0; 3]);
        assert_eq!(metrics.model, "unknown");
        assert_eq!(metrics.core_count, 0);
    }
}
