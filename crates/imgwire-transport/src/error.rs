use std::time::Duration;

/// Errors that can occur in request/reply transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint string or value cannot be used for this operation.
    #[error("invalid endpoint '{0}' (expected tcp://host:port)")]
    InvalidEndpoint(String),

    /// Failed to bind to the specified endpoint.
    #[error("failed to bind to {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: zmq::Error,
    },

    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: zmq::Error,
    },

    /// A ZeroMQ socket operation failed.
    #[error("socket error: {0}")]
    Socket(zmq::Error),

    /// The peer did not answer within the configured timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A message must carry at least one part.
    #[error("refusing to send an empty message")]
    EmptyMessage,

    /// A blocking call was interrupted by a signal.
    #[error("interrupted")]
    Interrupted,
}

impl TransportError {
    /// Map a raw socket error, keeping signal interruption distinguishable.
    pub(crate) fn from_zmq(err: zmq::Error) -> Self {
        match err {
            zmq::Error::EINTR => Self::Interrupted,
            other => Self::Socket(other),
        }
    }

    /// True for faults that only mean "nothing arrived in time".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
