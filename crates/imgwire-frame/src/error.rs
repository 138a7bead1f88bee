use crate::mode::WireMode;

/// Errors that can occur while building, encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The dimensions cannot describe a frame.
    #[error("invalid frame shape {shape:?}: {reason}")]
    InvalidShape {
        shape: Vec<u64>,
        reason: &'static str,
    },

    /// The pixel buffer does not match the declared shape.
    #[error("pixel buffer holds {actual} bytes but the shape requires {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The dtype name is not one of the supported pixel types.
    #[error("unsupported pixel type '{0}'")]
    UnsupportedPixelType(String),

    /// The wire mode name or index is not recognized.
    #[error("unknown wire mode '{0}'")]
    UnknownMode(String),

    /// The message has the wrong number of parts for the configured mode.
    #[error("{mode} expects {expected} message part(s), got {actual}")]
    PartCount {
        mode: WireMode,
        expected: usize,
        actual: usize,
    },

    /// The JSON header or shape part is malformed.
    #[error("malformed frame header: {0}")]
    Header(#[from] serde_json::Error),

    /// The serialized record inside a compressed blob is malformed.
    #[error("malformed frame blob: {0}")]
    Blob(String),

    /// zlib compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// The decoded payload exceeds the configured maximum.
    #[error("frame payload too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// The image codec rejected the data.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// The frame cannot be represented by the image codec.
    #[error("image codec cannot carry {0}")]
    UnsupportedImage(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
