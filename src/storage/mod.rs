pub mod api;
pub mod buffer;
pub mod database;
pub mod model;
pub mod sink;

pub use api::{ApiSink, ApiSinkConfig};
pub use buffer::{DEFAULT_BATCH_SIZE, DispatchBuffer, DispatchStats};
pub use database::{DbSinkConfig, PostgresSink};
pub use model::MetricSnapshot;
pub use sink::{ConfiguredSink, NoopSink, Sink, SinkConfig, SinkError};
