//! SQL statements of the database sink.
//!
//! The schema (`servers`, `metrics`, `processes`, `metrics_weekly`) is
//! managed outside the agent.

pub(super) const UPSERT_SERVER: &str = r#"
    INSERT INTO servers (hostname, platform, release, uptime_seconds, last_seen)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (hostname) DO UPDATE SET
        platform = EXCLUDED.platform,
        release = EXCLUDED.release,
        uptime_seconds = EXCLUDED.uptime_seconds,
        last_seen = EXCLUDED.last_seen
"#;

pub(super) const INSERT_METRIC: &str = r#"
    INSERT INTO metrics (
        hostname, timestamp,
        cpu_usage_percent, cpu_core_count, cpu_model, cpu_speed_mhz,
        load_avg_1, load_avg_5, load_avg_15,
        memory_total_bytes, memory_free_bytes, memory_used_bytes, memory_used_percent,
        swap_total_bytes, swap_used_bytes, swap_used_percent,
        disk_filesystem, disk_mount_point, disk_size_bytes, disk_used_bytes,
        disk_available_bytes, disk_used_percent,
        network_interface, network_rx_bytes, network_tx_bytes,
        network_rx_rate, network_tx_rate, network_total_connections,
        process_count, error
    )
    VALUES (
        $1, $2,
        $3, $4, $5, $6,
        $7, $8, $9,
        $10, $11, $12, $13,
        $14, $15, $16,
        $17, $18, $19, $20,
        $21, $22,
        $23, $24, $25,
        $26, $27, $28,
        $29, $30
    )
    RETURNING id
"#;

pub(super) const INSERT_PROCESS: &str = r#"
    INSERT INTO processes (metric_id, pid, name, cpu_percent, memory_percent, memory_bytes)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

/// Rows in `processes` go with their metric through `ON DELETE CASCADE`.
pub(super) const DELETE_OLD_METRICS: &str = r#"
    DELETE FROM metrics
    WHERE timestamp < now() - make_interval(days => $1)
"#;

pub(super) const REFRESH_WEEKLY_VIEW: &str = "REFRESH MATERIALIZED VIEW metrics_weekly";
