//! Delivery targets for snapshots.
//!
//! A [`Sink`] stores one snapshot at a time and reports success as a plain
//! `bool`: delivery failures are logged inside the sink and never escape as
//! errors or panics. The concrete sink is chosen once at startup and held
//! as a [`ConfiguredSink`].

use tracing::info;

use crate::storage::api::{ApiSink, ApiSinkConfig};
use crate::storage::model::MetricSnapshot;
use crate::storage::database::{DbSinkConfig, PostgresSink};

/// Error type for sink setup and maintenance.
#[derive(Debug)]
pub enum SinkError {
    /// HTTP transport failure (connect, timeout, TLS).
    Http(String),
    /// The API answered with a non-2xx status.
    Status(u16),
    /// Database connection or query failure.
    Database(String),
    /// Invalid sink settings.
    Config(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Http(msg) => write!(f, "HTTP error: {}", msg),
            SinkError::Status(code) => write!(f, "unexpected HTTP status {}", code),
            SinkError::Database(msg) => write!(f, "database error: {}", msg),
            SinkError::Config(msg) => write!(f, "invalid sink configuration: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        SinkError::Http(e.to_string())
    }
}

/// A destination for snapshots.
pub trait Sink: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Delivers one snapshot. Returns false on failure, after logging it.
    fn store(&mut self, snapshot: &MetricSnapshot) -> bool;

    /// Deletes data older than `days_to_keep` days and returns the number of
    /// removed snapshots.
    fn cleanup(&mut self, days_to_keep: u32) -> Result<u64, SinkError> {
        let _ = days_to_keep;
        Ok(0)
    }

    /// Whether `cleanup` does anything.
    fn supports_cleanup(&self) -> bool {
        false
    }

    /// A no-op sink accepts everything without storing it.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Discards every snapshot.
#[derive(Debug, Default)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn store(&mut self, _snapshot: &MetricSnapshot) -> bool {
        true
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Which sink to build, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkConfig {
    Api(ApiSinkConfig),
    Database(DbSinkConfig),
    Noop,
}

/// The sink chosen at startup.
pub enum ConfiguredSink {
    Api(ApiSink),
    Database(PostgresSink),
    Noop(NoopSink),
}

impl ConfiguredSink {
    /// Builds the sink described by `config`.
    ///
    /// The database sink connects lazily, so an unreachable database does not
    /// prevent startup.
    pub fn from_config(config: SinkConfig) -> Result<Self, SinkError> {
        let sink = match config {
            SinkConfig::Api(api) => ConfiguredSink::Api(ApiSink::new(api)?),
            SinkConfig::Database(db) => ConfiguredSink::Database(PostgresSink::new(db)),
            SinkConfig::Noop => ConfiguredSink::Noop(NoopSink),
        };
        info!(sink = sink.name(), "sink configured");
        Ok(sink)
    }

    fn inner(&self) -> &dyn Sink {
        match self {
            ConfiguredSink::Api(s) => s,
            ConfiguredSink::Database(s) => s,
            ConfiguredSink::Noop(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Sink {
        match self {
            ConfiguredSink::Api(s) => s,
            ConfiguredSink::Database(s) => s,
            ConfiguredSink::Noop(s) => s,
        }
    }
}

impl Sink for ConfiguredSink {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn store(&mut self, snapshot: &MetricSnapshot) -> bool {
        self.inner_mut().store(snapshot)
    }

    fn cleanup(&mut self, days_to_keep: u32) -> Result<u64, SinkError> {
        self.inner_mut().cleanup(days_to_keep)
    }

    fn supports_cleanup(&self) -> bool {
        self.inner().supports_cleanup()
    }

    fn is_noop(&self) -> bool {
        self.inner().is_noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_noop_sink() {
        let sink = ConfiguredSink::from_config(SinkConfig::Noop).unwrap();

        assert!(sink.is_noop());
        assert!(!sink.supports_cleanup());
        assert_eq!(sink.name(), "noop");
    }

    #[test]
    fn test_database_sink_supports_cleanup() {
        let config = DbSinkConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "hostpulse".to_string(),
            ssl: false,
            connect_timeout: Duration::from_secs(1),
        };
        let sink = ConfiguredSink::from_config(SinkConfig::Database(config)).unwrap();

        assert!(!sink.is_noop());
        assert!(sink.supports_cleanup());
        assert_eq!(sink.name(), "database");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SinkError::Status(503).to_string(),
            "unexpected HTTP status 503"
        );
        assert_eq!(
            SinkError::Config("missing url".to_string()).to_string(),
            "invalid sink configuration: missing url"
        );
    }
}
