/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] imgwire_transport::TransportError),

    /// Frame encode or decode error.
    #[error("frame error: {0}")]
    Frame(#[from] imgwire_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer sent something that is not a reply.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// The handshake gave up after a bounded number of attempts.
    #[error("handshake failed after {attempts} attempt(s)")]
    HandshakeFailed { attempts: u32 },

    /// A running flag was cleared while the operation was waiting.
    #[error("interrupted")]
    Interrupted,

    /// A capture source could not be opened or read.
    #[error("capture error: {0}")]
    Capture(String),

    /// I/O error outside the transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
