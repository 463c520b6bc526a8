//! hostpulse - periodic host telemetry agent library.
//!
//! Samples CPU, memory, disk, network and process metrics from /proc,
//! batches the resulting snapshots and dispatches them to an HTTP API or a
//! PostgreSQL database. The `hostpulsed` binary wires these pieces together.

pub mod collector;
pub mod config;
pub mod scheduler;
pub mod storage;
