//! Process table summary from `/proc/[pid]/`.

use std::path::Path;

use tracing::debug;

use crate::collector::procfs::CLK_TCK;
use crate::collector::procfs::parser::{
    parse_meminfo, parse_proc_stat, parse_proc_status, parse_uptime,
};
use crate::collector::rates::{percent, round2};
use crate::collector::{CollectError, Collector, FileSystem, Probe, proc_file};
use crate::storage::model::{ProcessEntry, ProcessMetrics};

/// Default length of the top-N lists.
pub const DEFAULT_TOP_PROCESSES: usize = 5;

/// Collects the busiest processes by CPU and by resident memory.
#[derive(Debug, Clone)]
pub struct ProcessCollector {
    proc_path: String,
    top_n: usize,
}

impl ProcessCollector {
    pub fn new(proc_path: &str, top_n: usize) -> Self {
        Self {
            proc_path: proc_path.to_string(),
            top_n,
        }
    }

    /// Returns all numeric PIDs under the proc root, ascending.
    fn list_pids<F: FileSystem>(&self, fs: &F) -> Result<Vec<u32>, CollectError> {
        let entries = fs.read_dir(Path::new(&self.proc_path))?;

        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|path| path.file_name()?.to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    /// Reads one process. `None` when it vanished or its files are unreadable.
    fn read_process<F: FileSystem>(
        &self,
        fs: &F,
        pid: u32,
        uptime_secs: f64,
        mem_total_kb: u64,
    ) -> Option<ProcessEntry> {
        let base = proc_file(&self.proc_path, &pid.to_string());

        let stat = fs
            .read_to_string(Path::new(&format!("{}/stat", base)))
            .map_err(CollectError::from)
            .and_then(|c| parse_proc_stat(&c).map_err(CollectError::from));
        let stat = match stat {
            Ok(s) => s,
            Err(e) => {
                debug!(pid, error = %e, "skipping process");
                return None;
            }
        };
        let status = fs
            .read_to_string(Path::new(&format!("{}/status", base)))
            .ok()
            .and_then(|c| parse_proc_status(&c).ok());

        let (name, rss_kb) = match status {
            Some(s) => (s.name, s.vm_rss),
            None => (stat.comm.clone(), 0),
        };

        // Lifetime average, as `ps` reports %CPU.
        let cpu_secs = (stat.utime + stat.stime) as f64 / CLK_TCK as f64;
        let running_secs = uptime_secs - stat.starttime as f64 / CLK_TCK as f64;
        let cpu_percent = if running_secs > 0.0 {
            round2(cpu_secs / running_secs * 100.0)
        } else {
            0.0
        };

        Some(ProcessEntry {
            pid,
            name,
            cpu_percent,
            memory_percent: percent(rss_kb, mem_total_kb),
            memory_bytes: rss_kb * 1024,
        })
    }
}

impl Probe for ProcessCollector {
    type Output = ProcessMetrics;

    fn name(&self) -> &'static str {
        "processes"
    }

    fn probe<F: FileSystem>(&self, fs: &F) -> Result<ProcessMetrics, CollectError> {
        let pids = self.list_pids(fs)?;

        let uptime_secs = fs
            .read_to_string(Path::new(&proc_file(&self.proc_path, "uptime")))
            .ok()
            .and_then(|c| parse_uptime(&c).ok())
            .unwrap_or(0.0);
        let mem_total_kb = fs
            .read_to_string(Path::new(&proc_file(&self.proc_path, "meminfo")))
            .ok()
            .and_then(|c| parse_meminfo(&c).ok())
            .map(|m| m.mem_total)
            .unwrap_or(0);

        let entries: Vec<ProcessEntry> = pids
            .into_iter()
            .filter_map(|pid| self.read_process(fs, pid, uptime_secs, mem_total_kb))
            .collect();
        let total_count = entries.len() as u64;

        let mut top_by_cpu = entries.clone();
        top_by_cpu.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        top_by_cpu.truncate(self.top_n);

        let mut top_by_memory = entries;
        top_by_memory.sort_by(|a, b| b.memory_bytes.cmp(&a.memory_bytes));
        top_by_memory.truncate(self.top_n);

        Ok(ProcessMetrics {
            top_by_cpu,
            top_by_memory,
            total_count,
        })
    }
}

impl Collector for ProcessCollector {
    fn fallback(&self) -> ProcessMetrics {
        ProcessMetrics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::collector::mock::{proc_stat_line, proc_status};

    fn names(entries: &[ProcessEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_top_lists() {
        let fs = MockFs::typical_system();
        let metrics = ProcessCollector::new("/proc", DEFAULT_TOP_PROCESSES).collect(&fs);

        assert_eq!(metrics.total_count, 7);
        assert_eq!(
            names(&metrics.top_by_cpu),
            vec!["java", "postgres", "nginx", "redis-server", "systemd"]
        );
        assert_eq!(
            names(&metrics.top_by_memory),
            vec!["java", "postgres", "redis-server", "nginx", "systemd"]
        );

        let java = &metrics.top_by_cpu[0];
        assert_eq!(java.pid, 600);
        assert_eq!(java.cpu_percent, 74.87);
        assert_eq!(java.memory_bytes, 2_097_152 * 1024);
        assert_eq!(java.memory_percent, 12.8);
    }

    #[test]
    fn test_top_n_is_configurable() {
        let fs = MockFs::typical_system();
        let metrics = ProcessCollector::new("/proc", 2).collect(&fs);

        assert_eq!(metrics.top_by_cpu.len(), 2);
        assert_eq!(metrics.top_by_memory.len(), 2);
        assert_eq!(metrics.total_count, 7);
    }

    #[test]
    fn test_tied_processes_rank_below_leader() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/uptime", "1000.00 0.00\n");
        fs.add_file("/proc/meminfo", "MemTotal: 1000 kB\n");
        for (pid, ticks, rss_kb) in [(30, 100, 100), (10, 100, 100), (40, 500, 500), (20, 100, 100)] {
            let comm = format!("worker{}", pid);
            fs.add_process(
                pid,
                &proc_stat_line(pid, &comm, ticks, 0, 0),
                &proc_status(&comm, pid, rss_kb),
            );
        }

        let metrics = ProcessCollector::new("/proc", 3).collect(&fs);

        for list in [&metrics.top_by_cpu, &metrics.top_by_memory] {
            let mut pids: Vec<u32> = list.iter().map(|e| e.pid).collect();
            assert_eq!(pids.len(), 3);
            assert_eq!(pids.remove(0), 40);
            pids.sort_unstable();
            pids.dedup();
            assert_eq!(pids.len(), 2);
            assert!(pids.iter().all(|pid| [10, 20, 30].contains(pid)));
        }
        assert_eq!(metrics.total_count, 4);
    }

    #[test]
    fn test_vanished_process_is_skipped() {
        let mut fs = MockFs::typical_system();
        fs.remove_file("/proc/600/stat");

        let metrics = ProcessCollector::new("/proc", 5).collect(&fs);
        assert_eq!(metrics.total_count, 6);
        assert_eq!(metrics.top_by_cpu[0].name, "postgres");
    }

    #[test]
    fn test_missing_status_uses_comm() {
        let mut fs = MockFs::typical_system();
        fs.remove_file("/proc/400/status");

        let metrics = ProcessCollector::new("/proc", 5).collect(&fs);
        let postgres = metrics.top_by_cpu.iter().find(|e| e.pid == 400).unwrap();
        assert_eq!(postgres.name, "postgres");
        assert_eq!(postgres.memory_bytes, 0);
    }

    #[test]
    fn test_unreadable_proc_uses_fallback() {
        let fs = MockFs::new();
        let collector = ProcessCollector::new("/proc", 5);

        assert!(collector.probe(&fs).is_err());
        assert_eq!(collector.collect(&fs), ProcessMetrics::default());
    }
}
