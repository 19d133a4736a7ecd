//! Transport boundary.
//!
//! A transport sends one outbound envelope and resolves with the matching
//! inbound envelope. It does not retry; a failed send fails every request in
//! that batch.

mod http;

use async_trait::async_trait;
use reqmux_domain::{FetchError, InboundEnvelope, OutboundEnvelope};

pub use http::HttpTransport;

/// Errors raised while sending a batch.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {status}")]
    Status { status: u16 },

    /// The reply body was not a valid inbound envelope.
    #[error("could not decode response envelope: {message}")]
    Decode { message: String },

    /// Any other transport-specific failure.
    #[error("{message}")]
    Other { message: String },
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        FetchError::TransportFailure {
            message: err.to_string(),
        }
    }
}

/// Sends batched envelopes to the endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &OutboundEnvelope) -> Result<InboundEnvelope, TransportError>;
}
