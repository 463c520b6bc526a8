//! HTTP sink: one JSON POST per snapshot.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::storage::model::MetricSnapshot;
use crate::storage::sink::{Sink, SinkError};

/// Header carrying the reporting host's identity.
pub const SERVER_ID_HEADER: &str = "X-Server-ID";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSinkConfig {
    /// Endpoint receiving the POSTs.
    pub url: String,
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Posts snapshots to a collector API. A request is attempted once.
pub struct ApiSink {
    client: Client,
    url: String,
    api_key: String,
}

impl ApiSink {
    pub fn new(config: ApiSinkConfig) -> Result<Self, SinkError> {
        if config.url.is_empty() {
            return Err(SinkError::Config("API url is empty".to_string()));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            url: config.url,
            api_key: config.api_key,
        })
    }

    fn post(&self, snapshot: &MetricSnapshot) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("ApiKey {}", self.api_key))
            .header(SERVER_ID_HEADER, &snapshot.server.hostname)
            .header(CONTENT_TYPE, "application/json")
            .json(snapshot)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl Sink for ApiSink {
    fn name(&self) -> &'static str {
        "api"
    }

    fn store(&mut self, snapshot: &MetricSnapshot) -> bool {
        match self.post(snapshot) {
            Ok(()) => {
                debug!(url = %self.url, timestamp = %snapshot.timestamp, "snapshot posted");
                true
            }
            Err(e) => {
                warn!(url = %self.url, timestamp = %snapshot.timestamp, error = %e, "failed to post snapshot");
                false
            }
        }
    }
}
