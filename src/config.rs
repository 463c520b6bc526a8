//! Agent configuration from command line flags and environment variables.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it; flags win.

use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;

use crate::collector::{AggregatorConfig, DEFAULT_TOP_PROCESSES};
use crate::scheduler::SchedulerConfig;
use crate::storage::{ApiSinkConfig, DEFAULT_BATCH_SIZE, DbSinkConfig, SinkConfig};

/// Connect timeout of the database sink.
const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for invalid configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required setting is absent or empty.
    Missing(&'static str),
    /// A setting has an unusable value.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "{} is required", name),
            ConfigError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Host telemetry agent.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hostpulsed",
    about = "Periodic host telemetry agent",
    version
)]
pub struct AgentConfig {
    /// Collection interval in milliseconds.
    #[arg(long, env = "REFRESH_INTERVAL", default_value_t = 60_000)]
    pub refresh_interval: u64,

    /// Number of snapshots buffered before they are sent.
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Retention period of stored metrics in days (database sink).
    #[arg(long, env = "CLEANUP_DAYS_TO_KEEP", default_value_t = 30)]
    pub cleanup_days_to_keep: u32,

    /// Interval between retention cleanups in seconds.
    #[arg(long, env = "CLEANUP_INTERVAL", default_value_t = 86_400)]
    pub cleanup_interval: u64,

    /// Send snapshots to the HTTP API. Accepts true/false, yes/no, on/off or 1/0.
    #[arg(
        long,
        env = "API_ENABLED",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub api_enabled: bool,

    /// Endpoint receiving snapshot POSTs.
    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,

    /// Key sent as `Authorization: ApiKey <key>`.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "API_TIMEOUT", default_value_t = 10)]
    pub api_timeout: u64,

    /// Write snapshots to PostgreSQL. Ignored when the API is enabled.
    #[arg(
        long,
        env = "DB_ENABLED",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub db_enabled: bool,

    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    #[arg(long, env = "DB_USER", default_value = "postgres")]
    pub db_user: String,

    #[arg(long, env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, env = "DB_NAME", default_value = "hostpulse")]
    pub db_name: String,

    /// Connect to PostgreSQL over TLS.
    #[arg(
        long,
        env = "DB_SSL",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub db_ssl: bool,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, env = "PROC_PATH", default_value = "/proc")]
    pub proc_path: String,

    /// Path whose filesystem is reported.
    #[arg(long, env = "DISK_PATH", default_value = "/")]
    pub disk_path: String,

    /// Network interface to report. Default: busiest non-loopback interface.
    #[arg(long, env = "NETWORK_INTERFACE")]
    pub network_interface: Option<String>,

    /// Length of the top processes lists.
    #[arg(long, env = "TOP_PROCESSES", default_value_t = DEFAULT_TOP_PROCESSES)]
    pub top_processes: usize,

    /// Per-collector timeout in seconds.
    #[arg(long, env = "COLLECTOR_TIMEOUT", default_value_t = 10)]
    pub collector_timeout: u64,

    /// Identity reported instead of the kernel hostname.
    #[arg(long, env = "SERVER_ID")]
    pub server_id: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    pub quiet: bool,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AgentConfig {
    /// Checks settings that would make the agent misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval == 0 {
            return Err(ConfigError::Invalid(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.collector_timeout == 0 {
            return Err(ConfigError::Invalid(
                "collector timeout must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval == 0 {
            return Err(ConfigError::Invalid(
                "cleanup interval must be greater than zero".to_string(),
            ));
        }
        self.sink_config().map(|_| ())
    }

    /// Resolves which sink to use: the API when enabled, else the database
    /// when enabled, else none.
    pub fn sink_config(&self) -> Result<SinkConfig, ConfigError> {
        if self.api_enabled {
            let url = non_empty(&self.api_url).ok_or(ConfigError::Missing("API_URL"))?;
            let api_key = non_empty(&self.api_key).ok_or(ConfigError::Missing("API_KEY"))?;
            return Ok(SinkConfig::Api(ApiSinkConfig {
                url: url.to_string(),
                api_key: api_key.to_string(),
                timeout: Duration::from_secs(self.api_timeout),
            }));
        }

        if self.db_enabled {
            if self.db_host.trim().is_empty() {
                return Err(ConfigError::Missing("DB_HOST"));
            }
            if self.db_name.trim().is_empty() {
                return Err(ConfigError::Missing("DB_NAME"));
            }
            return Ok(SinkConfig::Database(DbSinkConfig {
                host: self.db_host.clone(),
                port: self.db_port,
                user: self.db_user.clone(),
                password: self.db_password.clone(),
                dbname: self.db_name.clone(),
                ssl: self.db_ssl,
                connect_timeout: DB_CONNECT_TIMEOUT,
            }));
        }

        Ok(SinkConfig::Noop)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            proc_path: self.proc_path.clone(),
            disk_path: self.disk_path.clone(),
            network_interface: non_empty(&self.network_interface).map(str::to_string),
            top_processes: self.top_processes,
            collector_timeout: Duration::from_secs(self.collector_timeout),
            server_id: non_empty(&self.server_id).map(str::to_string),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(self.refresh_interval),
            cleanup_interval: Duration::from_secs(self.cleanup_interval),
            cleanup_days_to_keep: self.cleanup_days_to_keep,
        }
    }
}
