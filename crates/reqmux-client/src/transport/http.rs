//! JSON-over-HTTP transport.

use std::time::Duration;

use async_trait::async_trait;
use reqmux_domain::{InboundEnvelope, MuxError, MuxResult, OutboundEnvelope};
use tracing::debug;

use super::{Transport, TransportError};

/// POSTs each envelope as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport for `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> MuxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MuxError::InvalidConfiguration {
                message: format!("failed to build http client: {e}"),
            })?;

        Ok(Self::with_client(client, endpoint))
    }

    /// Uses a caller-configured client (headers, credentials, proxies).
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: &OutboundEnvelope) -> Result<InboundEnvelope, TransportError> {
        debug!(
            endpoint = %self.endpoint,
            rank = envelope.rank,
            requests = envelope.requests.len(),
            "sending batch"
        );

        let response = self.client.post(&self.endpoint).json(envelope).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
            message: e.to_string(),
        })
    }
}
