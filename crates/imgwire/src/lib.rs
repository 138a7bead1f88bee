//! Resilient image transport between capture clients and inference servers.
//!
//! A client captures frames, encodes them in one of four wire modes and
//! sends them over a ZeroMQ request/reply link; the server decodes each
//! frame, runs a classifier and always answers with a JSON reply.
//!
//! # Crate Structure
//!
//! - [`transport`] - Endpoints and request/reply sockets
//! - [`frame`] - Frame model and the wire codec
//! - [`peer`] - Sessions, the server and the live feed (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use imgwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use imgwire_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use imgwire_peer::*;
}
