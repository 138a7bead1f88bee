//! Image frames and their wire encodings.
//!
//! A [`Frame`] is one captured image as raw pixels. The codec turns it into
//! the message parts of one of four [`WireMode`]s and back:
//! - `header-raw`: JSON `{dtype, shape}` part followed by the raw pixel part
//! - `compressed-blob`: one zlib-compressed serialized record
//! - `multipart-raw`: dtype, JSON shape and raw pixels as three parts
//! - `image-codec`: one lossy JPEG part
//!
//! Sender and receiver must agree on the mode out of band. Decoding data
//! produced by a different mode fails with a [`FrameError`].

pub mod codec;
pub mod error;
pub mod frame;
pub mod imaging;
pub mod mode;

pub use codec::{
    clamp_quality, decode, decode_with_limit, encode, to_wire_json, WireCodec,
    DEFAULT_MAX_FRAME_BYTES, DEFAULT_QUALITY,
};
pub use error::{FrameError, Result};
pub use frame::{Frame, PixelType, SENTINEL_SHAPE};
pub use mode::WireMode;
