//! Capacity and I/O counters of the monitored filesystem.
//!
//! Only one filesystem is reported: the one mounted at `/`, or the one
//! holding the configured disk path. Capacity comes from `statvfs(3)`,
//! the backing device from `/proc/mounts` and the I/O counters from the
//! matching `/proc/diskstats` row.

use std::path::Path;

use tracing::debug;

use crate::collector::procfs::parser::{MountEntry, parse_diskstats, parse_mounts};
use crate::collector::rates::percent;
use crate::collector::{CollectError, Collector, FileSystem, Probe, proc_file};
use crate::storage::model::{DiskIoStats, DiskMetrics};

/// Size of a sector in `/proc/diskstats`, independent of the device.
const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone)]
pub struct DiskCollector {
    proc_path: String,
    disk_path: String,
}

impl DiskCollector {
    pub fn new(proc_path: &str, disk_path: &str) -> Self {
        Self {
            proc_path: proc_path.to_string(),
            disk_path: disk_path.to_string(),
        }
    }

    /// Finds the mount with the longest mount point containing the disk path.
    fn find_mount<F: FileSystem>(&self, fs: &F) -> Option<MountEntry> {
        let content = fs
            .read_to_string(Path::new(&proc_file(&self.proc_path, "mounts")))
            .ok()?;
        let target = Path::new(&self.disk_path);

        parse_mounts(&content)
            .into_iter()
            .filter(|m| target.starts_with(&m.mount_point))
            .max_by_key(|m| m.mount_point.len())
    }

    fn read_io<F: FileSystem>(&self, fs: &F, device: &str) -> Option<DiskIoStats> {
        let name = device.strip_prefix("/dev/")?;
        let content = fs
            .read_to_string(Path::new(&proc_file(&self.proc_path, "diskstats")))
            .ok()?;
        let stats = parse_diskstats(&content).ok()?;

        stats
            .into_iter()
            .find(|d| d.device == name)
            .map(|d| DiskIoStats {
                reads: d.reads,
                writes: d.writes,
                read_bytes: d.read_sectors * SECTOR_SIZE,
                write_bytes: d.write_sectors * SECTOR_SIZE,
                io_time_ms: d.io_time,
            })
    }
}

impl Probe for DiskCollector {
    type Output = DiskMetrics;

    fn name(&self) -> &'static str {
        "disk"
    }

    fn probe<F: FileSystem>(&self, fs: &F) -> Result<DiskMetrics, CollectError> {
        let capacity = fs.statvfs(Path::new(&self.disk_path))?;

        let size = capacity.total_bytes;
        let used = size.saturating_sub(capacity.free_bytes);
        let available = capacity.available_bytes;

        let (filesystem, mount_point, io) = match self.find_mount(fs) {
            Some(mount) => {
                let io = self.read_io(fs, &mount.device);
                if io.is_none() {
                    debug!(device = %mount.device, "no diskstats row for device");
                }
                (mount.device, mount.mount_point, io)
            }
            None => {
                debug!(path = %self.disk_path, "no mount entry for disk path");
                ("unknown".to_string(), self.disk_path.clone(), None)
            }
        };

        Ok(DiskMetrics {
            filesystem,
            mount_point,
            size_bytes: size,
            used_bytes: used,
            available_bytes: available,
            used_percent: percent(used, used.saturating_add(available)),
            io,
        })
    }
}

impl Collector for DiskCollector {
    fn fallback(&self) -> DiskMetrics {
        DiskMetrics {
            filesystem: "unknown".to_string(),
            mount_point: self.disk_path.clone(),
            ..Default::default()
        }
    }
}
