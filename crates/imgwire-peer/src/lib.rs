//! Client sessions, the transport server and the live-feed pipeline.
//!
//! This is the "just works" layer. A [`Session`] sends frames and hands back
//! replies without ever propagating transport faults; a [`Server`] answers
//! every request exactly once; a [`LiveFeed`] keeps a capture loop running
//! in the background and exposes only the newest result.

pub mod classify;
pub mod error;
pub mod feed;
pub mod handshake;
pub mod reply;
pub mod server;
pub mod session;
pub mod source;

pub use classify::{classify_guarded, Classifier, MeanClassifier};
pub use error::{PeerError, Result};
pub use feed::{FeedItem, FeedOptions, FeedSlot, LiveFeed};
pub use handshake::HandshakeConfig;
pub use reply::{Diagnostic, Reply, ERROR_KEY, HELLO_KEY};
pub use server::{serve, ServeStats, Server, ServerConfig};
pub use session::{FrameRequester, Session, SessionConfig, SessionStats, DEFAULT_PORT};
pub use source::{DirectorySource, FrameSource, RepeatSource};
