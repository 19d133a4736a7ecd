//! Error types for request multiplexing.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while constructing a multiplexer or accepting a submission.
///
/// These fail fast: nothing is queued when one is returned.
#[derive(Debug, Error)]
pub enum MuxError {
    /// A configuration value is out of range or missing.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Request data could not be converted to JSON.
    #[error("invalid request data: {message}")]
    InvalidRequestData { message: String },
}

/// Result type for construction and submission.
pub type MuxResult<T> = Result<T, MuxError>;

/// Failure delivered to a single request's error callback.
///
/// Batch-level failures are fanned out as one `FetchError` per affected
/// request; none of them escape the batch that produced them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The endpoint answered this request with an `error` entry.
    #[error("remote error: {0}")]
    Remote(Value),

    /// `CacheOnly` request found no cache entry.
    #[error("cache miss for route '{route}'")]
    CacheMiss { route: String },

    /// Response count did not match request count for the batch.
    #[error("protocol error: sent {sent} requests but received {received} responses")]
    ProtocolLengthMismatch { sent: usize, received: usize },

    /// A response entry had a `type` other than `success` or `error`.
    #[error("protocol error: unknown response type '{response_type}'")]
    UnknownResponseType { response_type: String },

    /// The envelope could not be sent or its reply could not be read.
    #[error("transport failure: {message}")]
    TransportFailure { message: String },
}

impl FetchError {
    /// Returns the remote payload for `Remote` errors.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            FetchError::Remote(payload) => Some(payload),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MuxError {
    fn from(err: serde_json::Error) -> Self {
        MuxError::InvalidRequestData {
            message: err.to_string(),
        }
    }
}
