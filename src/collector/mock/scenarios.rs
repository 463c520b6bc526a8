//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` filesystem states and helpers
//! to move counters forward between ticks.

use super::filesystem::MockFs;
use crate::collector::traits::FsCapacity;

const GIB: u64 = 1024 * 1024 * 1024;

/// Formats a full `/proc/[pid]/stat` line with the fields the collectors read.
pub fn proc_stat_line(pid: u32, comm: &str, utime: u64, stime: u64, starttime: u64) -> String {
    format!(
        "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 {starttime} 1000000 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0"
    )
}

/// Formats a minimal `/proc/[pid]/status`. Kernel threads have no `VmRSS` line.
pub fn proc_status(comm: &str, pid: u32, rss_kb: u64) -> String {
    if rss_kb == 0 {
        format!("Name:\t{comm}\nPid:\t{pid}\n")
    } else {
        format!("Name:\t{comm}\nPid:\t{pid}\nVmRSS:\t{rss_kb:>8} kB\n")
    }
}

impl MockFs {
    /// Creates a typical server with a handful of busy processes.
    ///
    /// Top by CPU: java, postgres, nginx, redis-server, systemd.
    /// Top by memory: java, postgres, redis-server, nginx, systemd.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/sys/kernel/hostname", "web-01\n");
        fs.add_file("/proc/sys/kernel/osrelease", "6.1.0-18-amd64\n");
        fs.add_file("/proc/uptime", "12345.67 98765.43\n");
        fs.add_file("/proc/loadavg", "0.15 0.10 0.05 1/150 1234\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         2048000 kB
MemAvailable:    8192000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
SwapTotal:       4096000 kB
SwapFree:        3072000 kB
",
        );
        fs.add_file(
            "/proc/cpuinfo",
            "\
processor\t: 0
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 2400.000

processor\t: 1
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 2400.000

processor\t: 2
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 2400.000

processor\t: 3
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 2400.000
",
        );
        fs.set_cpu_stat(10000, 80000);

        fs.add_file(
            "/proc/mounts",
            "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev 0 0
/dev/sdb1 /data xfs rw,relatime 0 0
",
        );
        fs.add_file(
            "/proc/diskstats",
            "\
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500 0 0 0 0
   8      16 sdb 500 0 4000 100 200 0 1600 50 0 120 150 0 0 0 0
   8      17 sdb1 400 0 3200 80 150 0 1200 40 0 100 120 0 0 0 0
",
        );
        fs.set_capacity(
            "/",
            FsCapacity {
                total_bytes: 100 * GIB,
                free_bytes: 40 * GIB,
                available_bytes: 35 * GIB,
            },
        );

        fs.set_net_dev(&[
            ("lo", 12_345_678, 12_345_678),
            ("eth0", 987_654_321, 123_456_789),
            ("docker0", 1_000, 2_000),
        ]);
        fs.add_file(
            "/proc/net/tcp",
            "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:1538 00000000:0000 0A 00000000:00000000 00:00000000 00000000   112        0 20001 1
   1: 00000000:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 20002 1
   2: 0A00000F:0050 0A000001:D431 01 00000000:00000000 00:00000000 00000000    33        0 20003 1
   3: 0A00000F:0050 0A000001:D432 01 00000000:00000000 00:00000000 00000000    33        0 20004 1
   4: 0A00000F:0050 0A000001:D433 06 00000000:00000000 03:00000F9A 00000000     0        0 0 3
",
        );
        fs.add_file(
            "/proc/net/tcp6",
            "\
  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000000000000:0016 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 20010 1
",
        );

        // (pid, comm, utime, stime, starttime, rss_kb)
        let processes: [(u32, &str, u64, u64, u64, u64); 7] = [
            (1, "systemd", 1000, 500, 1, 12000),
            (2, "kthreadd", 0, 0, 0, 0),
            (400, "postgres", 300_000, 100_000, 200_000, 524_288),
            (500, "nginx", 50_000, 30_000, 300_000, 65_536),
            (600, "java", 500_000, 50_000, 500_000, 2_097_152),
            (1000, "bash", 100, 50, 100_000, 8000),
            (1200, "redis-server", 20_000, 20_000, 600_000, 262_144),
        ];
        for (pid, comm, utime, stime, starttime, rss_kb) in processes {
            fs.add_process(
                pid,
                &proc_stat_line(pid, comm, utime, stime, starttime),
                &proc_status(comm, pid, rss_kb),
            );
        }

        fs
    }

    /// Rewrites `/proc/stat` so the aggregate line has `busy` user ticks and `idle` idle ticks.
    pub fn set_cpu_stat(&mut self, busy: u64, idle: u64) {
        self.add_file(
            "/proc/stat",
            format!(
                "cpu  {busy} 0 0 {idle} 0 0 0 0 0 0\nctxt 500000\nbtime 1700000000\nprocesses 10000\n"
            ),
        );
    }

    /// Rewrites `/proc/net/dev` with `(interface, rx_bytes, tx_bytes)` rows.
    pub fn set_net_dev(&mut self, interfaces: &[(&str, u64, u64)]) {
        let mut content = String::from(
            "Inter-|   Receive                                                |  Transmit\n \
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n",
        );
        for (name, rx, tx) in interfaces {
            content.push_str(&format!(
                "{name:>6}: {rx} 100 0 0 0 0 0 0 {tx} 100 0 0 0 0 0 0\n"
            ));
        }
        self.add_file("/proc/net/dev", content);
    }

    /// A host whose `/proc` is empty: every collector falls back to defaults.
    pub fn empty_system() -> Self {
        let mut fs = Self::new();
        fs.add_dir("/proc");
        fs
    }
}
