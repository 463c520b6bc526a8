//! Memory usage from `/proc/meminfo`.

use std::path::Path;

use crate::collector::procfs::parser::parse_meminfo;
use crate::collector::rates::percent;
use crate::collector::{CollectError, Collector, FileSystem, Probe, proc_file};
use crate::storage::model::{MemoryMetrics, SwapMetrics};

#[derive(Debug, Clone)]
pub struct MemoryCollector {
    proc_path: String,
}

impl MemoryCollector {
    pub fn new(proc_path: &str) -> Self {
        Self {
            proc_path: proc_path.to_string(),
        }
    }
}

impl Probe for MemoryCollector {
    type Output = MemoryMetrics;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn probe<F: FileSystem>(&self, fs: &F) -> Result<MemoryMetrics, CollectError> {
        let content = fs.read_to_string(Path::new(&proc_file(&self.proc_path, "meminfo")))?;
        let info = parse_meminfo(&content)?;

        let total = info.mem_total * 1024;
        let free = info.mem_available.unwrap_or(info.mem_free) * 1024;
        let used = total.saturating_sub(free);

        let swap = info.swap_total.map(|swap_total| {
            let total = swap_total * 1024;
            let free = info.swap_free * 1024;
            let used = total.saturating_sub(free);
            SwapMetrics {
                total_bytes: total,
                free_bytes: free,
                used_bytes: used,
                used_percent: percent(used, total),
            }
        });

        Ok(MemoryMetrics {
            total_bytes: total,
            free_bytes: free,
            used_bytes: used,
            used_percent: percent(used, total),
            swap,
        })
    }
}

impl Collector for MemoryCollector {
    fn fallback(&self) -> MemoryMetrics {
        MemoryMetrics::default()
    }
}
