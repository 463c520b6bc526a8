//! Host identity: hostname, platform, kernel release and uptime.

use std::path::Path;

use crate::collector::procfs::parser::parse_uptime;
use crate::collector::{CollectError, Collector, FileSystem, Probe, proc_file};
use crate::storage::model::ServerInfo;

#[derive(Debug, Clone)]
pub struct ServerCollector {
    proc_path: String,
    /// Replaces the kernel hostname when set.
    server_id: Option<String>,
}

impl ServerCollector {
    pub fn new(proc_path: &str, server_id: Option<String>) -> Self {
        Self {
            proc_path: proc_path.to_string(),
            server_id,
        }
    }

    fn read_trimmed<F: FileSystem>(&self, fs: &F, name: &str) -> Result<String, CollectError> {
        let content = fs.read_to_string(Path::new(&proc_file(&self.proc_path, name)))?;
        let value = content.trim();
        if value.is_empty() {
            return Err(CollectError::Parse(format!("{} is empty", name)));
        }
        Ok(value.to_string())
    }
}

impl Probe for ServerCollector {
    type Output = ServerInfo;

    fn name(&self) -> &'static str {
        "server"
    }

    fn probe<F: FileSystem>(&self, fs: &F) -> Result<ServerInfo, CollectError> {
        let hostname = match &self.server_id {
            Some(id) => id.clone(),
            None => self.read_trimmed(fs, "sys/kernel/hostname")?,
        };
        let release = self
            .read_trimmed(fs, "sys/kernel/osrelease")
            .unwrap_or_else(|_| "unknown".to_string());
        let uptime_seconds = fs
            .read_to_string(Path::new(&proc_file(&self.proc_path, "uptime")))
            .ok()
            .and_then(|c| parse_uptime(&c).ok())
            .map(|secs| secs as u64)
            .unwrap_or(0);

        Ok(ServerInfo {
            hostname,
            platform: std::env::consts::OS.to_string(),
            release,
            uptime_seconds,
        })
    }
}

impl Collector for ServerCollector {
    fn fallback(&self) -> ServerInfo {
        ServerInfo {
            hostname: self
                .server_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            platform: std::env::consts::OS.to_string(),
            release: "unknown".to_string(),
            uptime_seconds: 0,
        }
    }
}
