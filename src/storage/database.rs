//! PostgreSQL database sink.
//!
//! Holds at most one connection, opened lazily and checked before use. A
//! snapshot is written in a single transaction: the `servers` row is
//! upserted, the `metrics` row inserted, then one `processes` row per
//! top-CPU process. Any failure rolls the transaction back and drops the
//! connection so the next call reconnects.

mod queries;

use std::time::Duration;

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::storage::model::MetricSnapshot;
use crate::storage::sink::{Sink, SinkError};
use queries::{
    DELETE_OLD_METRICS, INSERT_METRIC, INSERT_PROCESS, REFRESH_WEEKLY_VIEW, UPSERT_SERVER,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DbSinkConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    /// Connect over TLS (native-tls).
    pub ssl: bool,
    pub connect_timeout: Duration,
}

impl DbSinkConfig {
    fn pg_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.dbname)
            .application_name("hostpulse")
            .connect_timeout(self.connect_timeout);
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }
}

/// Column values of one `metrics` row. Sections missing from the snapshot
/// become NULLs.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MetricRow {
    pub hostname: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub cpu_usage_percent: Option<f64>,
    pub cpu_core_count: Option<i32>,
    pub cpu_model: Option<String>,
    pub cpu_speed_mhz: Option<f64>,
    pub load_avg_1: Option<f64>,
    pub load_avg_5: Option<f64>,
    pub load_avg_15: Option<f64>,
    pub memory_total_bytes: Option<i64>,
    pub memory_free_bytes: Option<i64>,
    pub memory_used_bytes: Option<i64>,
    pub memory_used_percent: Option<f64>,
    pub swap_total_bytes: Option<i64>,
    pub swap_used_bytes: Option<i64>,
    pub swap_used_percent: Option<f64>,
    pub disk_filesystem: Option<String>,
    pub disk_mount_point: Option<String>,
    pub disk_size_bytes: Option<i64>,
    pub disk_used_bytes: Option<i64>,
    pub disk_available_bytes: Option<i64>,
    pub disk_used_percent: Option<f64>,
    pub network_interface: Option<String>,
    pub network_rx_bytes: Option<i64>,
    pub network_tx_bytes: Option<i64>,
    pub network_rx_rate: Option<f64>,
    pub network_tx_rate: Option<f64>,
    pub network_total_connections: Option<i64>,
    pub process_count: Option<i64>,
    pub error: Option<String>,
}

/// BIGINT columns are signed; counters beyond `i64::MAX` saturate.
fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl MetricRow {
    pub(crate) fn from_snapshot(snapshot: &MetricSnapshot) -> Self {
        let mut row = MetricRow {
            hostname: snapshot.server.hostname.clone(),
            timestamp: Some(snapshot.timestamp),
            error: snapshot.error.clone(),
            ..Default::default()
        };

        if let Some(cpu) = &snapshot.cpu {
            row.cpu_usage_percent = Some(cpu.usage_percent);
            row.cpu_core_count = Some(i32::try_from(cpu.core_count).unwrap_or(i32::MAX));
            row.cpu_model = Some(cpu.model.clone());
            row.cpu_speed_mhz = Some(cpu.speed_mhz);
            row.load_avg_1 = Some(cpu.load_avg[0]);
            row.load_avg_5 = Some(cpu.load_avg[1]);
            row.load_avg_15 = Some(cpu.load_avg[2]);
        }
        if let Some(mem) = &snapshot.memory {
            row.memory_total_bytes = Some(to_i64(mem.total_bytes));
            row.memory_free_bytes = Some(to_i64(mem.free_bytes));
            row.memory_used_bytes = Some(to_i64(mem.used_bytes));
            row.memory_used_percent = Some(mem.used_percent);
            if let Some(swap) = &mem.swap {
                row.swap_total_bytes = Some(to_i64(swap.total_bytes));
                row.swap_used_bytes = Some(to_i64(swap.used_bytes));
                row.swap_used_percent = Some(swap.used_percent);
            }
        }
        if let Some(disk) = &snapshot.disk {
            row.disk_filesystem = Some(disk.filesystem.clone());
            row.disk_mount_point = Some(disk.mount_point.clone());
            row.disk_size_bytes = Some(to_i64(disk.size_bytes));
            row.disk_used_bytes = Some(to_i64(disk.used_bytes));
            row.disk_available_bytes = Some(to_i64(disk.available_bytes));
            row.disk_used_percent = Some(disk.used_percent);
        }
        if let Some(net) = &snapshot.network {
            row.network_interface = Some(net.interface_name.clone());
            row.network_rx_bytes = Some(to_i64(net.rx_bytes));
            row.network_tx_bytes = Some(to_i64(net.tx_bytes));
            row.network_rx_rate = Some(net.rx_rate_bytes_per_sec);
            row.network_tx_rate = Some(net.tx_rate_bytes_per_sec);
            row.network_total_connections = Some(to_i64(net.total_connections));
        }
        if let Some(procs) = &snapshot.processes {
            row.process_count = Some(to_i64(procs.total_count));
        }

        row
    }

    fn params(&self) -> [&(dyn ToSql + Sync); 30] {
        [
            &self.hostname,
            &self.timestamp,
            &self.cpu_usage_percent,
            &self.cpu_core_count,
            &self.cpu_model,
            &self.cpu_speed_mhz,
            &self.load_avg_1,
            &self.load_avg_5,
            &self.load_avg_15,
            &self.memory_total_bytes,
            &self.memory_free_bytes,
            &self.memory_used_bytes,
            &self.memory_used_percent,
            &self.swap_total_bytes,
            &self.swap_used_bytes,
            &self.swap_used_percent,
            &self.disk_filesystem,
            &self.disk_mount_point,
            &self.disk_size_bytes,
            &self.disk_used_bytes,
            &self.disk_available_bytes,
            &self.disk_used_percent,
            &self.network_interface,
            &self.network_rx_bytes,
            &self.network_tx_bytes,
            &self.network_rx_rate,
            &self.network_tx_rate,
            &self.network_total_connections,
            &self.process_count,
            &self.error,
        ]
    }
}

/// Writes snapshots into PostgreSQL.
pub struct PostgresSink {
    config: DbSinkConfig,
    client: Option<Client>,
}

impl PostgresSink {
    /// Creates the sink without connecting.
    pub fn new(config: DbSinkConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Returns true while a connection is held.
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn connect(&self) -> Result<Client, SinkError> {
        let pg_config = self.config.pg_config();
        let result = if self.config.ssl {
            let connector = native_tls::TlsConnector::new()
                .map_err(|e| SinkError::Database(format!("TLS setup failed: {}", e)))?;
            pg_config.connect(postgres_native_tls::MakeTlsConnector::new(connector))
        } else {
            pg_config.connect(NoTls)
        };
        result.map_err(|e| SinkError::Database(format_postgres_error(&e)))
    }

    /// Returns a live connection, reconnecting if the held one is dead.
    fn ensure_connected(&mut self) -> Result<&mut Client, SinkError> {
        let alive = self
            .client
            .as_mut()
            .map(|client| !client.is_closed() && client.simple_query("").is_ok());

        if alive == Some(false) {
            warn!("database connection lost, reconnecting");
            self.client = None;
        }

        if self.client.is_none() {
            let client = self.connect()?;
            info!(
                host = %self.config.host,
                port = self.config.port,
                dbname = %self.config.dbname,
                "connected to database"
            );
            self.client = Some(client);
        }

        self.client
            .as_mut()
            .ok_or_else(|| SinkError::Database("no connection".to_string()))
    }

    fn write(&mut self, snapshot: &MetricSnapshot) -> Result<(), SinkError> {
        let client = self.ensure_connected()?;
        write_snapshot(client, snapshot).map_err(|e| SinkError::Database(format_postgres_error(&e)))
    }

    fn delete_expired(&mut self, days_to_keep: u32) -> Result<u64, SinkError> {
        let client = self.ensure_connected()?;
        let days = i32::try_from(days_to_keep).unwrap_or(i32::MAX);

        let deleted = client
            .execute(DELETE_OLD_METRICS, &[&days])
            .map_err(|e| SinkError::Database(format_postgres_error(&e)))?;

        if let Err(e) = client.batch_execute(REFRESH_WEEKLY_VIEW) {
            warn!(error = %format_postgres_error(&e), "failed to refresh metrics_weekly");
        }

        Ok(deleted)
    }
}

/// Writes one snapshot in a single transaction. Dropping the transaction on
/// error rolls it back.
fn write_snapshot(client: &mut Client, snapshot: &MetricSnapshot) -> Result<(), postgres::Error> {
    let server = &snapshot.server;
    let mut tx = client.transaction()?;

    tx.execute(
        UPSERT_SERVER,
        &[
            &server.hostname,
            &server.platform,
            &server.release,
            &to_i64(server.uptime_seconds),
            &snapshot.timestamp,
        ],
    )?;

    let row = MetricRow::from_snapshot(snapshot);
    let metric_id: i64 = tx.query_one(INSERT_METRIC, &row.params())?.try_get(0)?;

    if let Some(processes) = &snapshot.processes {
        for process in &processes.top_by_cpu {
            tx.execute(
                INSERT_PROCESS,
                &[
                    &metric_id,
                    &i32::try_from(process.pid).unwrap_or(i32::MAX),
                    &process.name,
                    &process.cpu_percent,
                    &process.memory_percent,
                    &to_i64(process.memory_bytes),
                ],
            )?;
        }
    }

    tx.commit()
}

impl Sink for PostgresSink {
    fn name(&self) -> &'static str {
        "database"
    }

    fn store(&mut self, snapshot: &MetricSnapshot) -> bool {
        match self.write(snapshot) {
            Ok(()) => {
                debug!(timestamp = %snapshot.timestamp, "snapshot written to database");
                true
            }
            Err(e) => {
                warn!(timestamp = %snapshot.timestamp, error = %e, "failed to write snapshot");
                self.client = None;
                false
            }
        }
    }

    fn cleanup(&mut self, days_to_keep: u32) -> Result<u64, SinkError> {
        let result = self.delete_expired(days_to_keep);
        if result.is_err() {
            self.client = None;
        }
        result
    }

    fn supports_cleanup(&self) -> bool {
        true
    }
}

fn format_postgres_error(e: &postgres::Error) -> String {
    // Extract the most useful part of the error
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            msg
        }
    }
}
