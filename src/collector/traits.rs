//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait allows collectors to work with both the real `/proc`
//! filesystem on Linux and the in-memory `MockFs` used by tests.

use std::io;
use std::path::{Path, PathBuf};

/// Capacity of a mounted filesystem as reported by `statvfs(3)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsCapacity {
    /// Total size in bytes.
    pub total_bytes: u64,
    /// Free bytes, including blocks reserved for root.
    pub free_bytes: u64,
    /// Bytes available to unprivileged users.
    pub available_bytes: u64,
}

/// Abstraction for filesystem operations.
///
/// Every raw counter the agent reports is read through this trait, so a
/// collector never touches `std::fs` directly.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns capacity information for the filesystem mounted at `path`.
    fn statvfs(&self, path: &Path) -> io::Result<FsCapacity>;
}

/// Real filesystem implementation that delegates to `std::fs` and libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    fn statvfs(&self, path: &Path) -> io::Result<FsCapacity> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `c_path` is a valid NUL-terminated string and `stat` is a
        // zero-initialized plain C struct that statvfs fills in.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        let frsize = stat.f_frsize as u64;
        Ok(FsCapacity {
            total_bytes: (stat.f_blocks as u64).saturating_mul(frsize),
            free_bytes: (stat.f_bfree as u64).saturating_mul(frsize),
            available_bytes: (stat.f_bavail as u64).saturating_mul(frsize),
        })
    }

    #[cfg(not(unix))]
    fn statvfs(&self, _path: &Path) -> io::Result<FsCapacity> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "statvfs is not available on this platform",
        ))
    }
}
