//! Request/reply transport for imgwire.
//!
//! Wraps ZeroMQ REQ/REP sockets over TCP:
//! - [`RequestSocket`] is the client side, one per session
//! - [`ReplySocket`] is the server side, bound to one [`Endpoint`]
//!
//! This is the lowest layer of imgwire. Every socket owns its own ZeroMQ
//! context, so dropping the socket releases the endpoint on every exit path.

pub mod endpoint;
pub mod error;
pub mod socket;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use socket::{ReplySocket, RequestSocket};

/// Version of the linked libzmq as `(major, minor, patch)`.
pub fn libzmq_version() -> (i32, i32, i32) {
    zmq::version()
}
