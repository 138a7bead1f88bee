use std::fmt;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use imgwire_frame::{Frame, WireCodec, WireMode};
use imgwire_transport::{Endpoint, RequestSocket};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::handshake::{self, HandshakeConfig};
use crate::reply::Reply;

/// Port servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 5556;

/// Anything that turns a frame into a reply, or gives up with `None`.
///
/// Implemented by [`Session`]; the live feed and the handshake are
/// generic over it so they can run against test doubles.
pub trait FrameRequester {
    /// Send one frame and wait for its reply. `None` means the attempt
    /// failed and has already been recovered from.
    fn request(&mut self, frame: &Frame) -> Option<Reply>;

    /// Drop any connection state so the next request starts fresh.
    fn reset(&mut self) {}
}

/// Configuration for a client session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server endpoint to connect to.
    pub endpoint: Endpoint,
    /// Wire mode and image quality for outgoing frames.
    pub codec: WireCodec,
    /// Maximum wait for one reply.
    pub timeout: Duration,
    /// Pause after a failed request before returning.
    pub reconnect_backoff: Duration,
    /// Handshake retry policy used when the session opens.
    pub handshake: HandshakeConfig,
}

impl SessionConfig {
    pub fn new(endpoint: Endpoint, mode: WireMode, timeout: Duration) -> Self {
        Self {
            endpoint,
            codec: WireCodec::new(mode),
            timeout,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::localhost(DEFAULT_PORT),
            codec: WireCodec::default(),
            timeout: Duration::from_millis(1000),
            reconnect_backoff: Duration::from_millis(100),
            handshake: HandshakeConfig::default(),
        }
    }
}

/// Request counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames handed to [`Session::request`].
    pub requests: u64,
    /// Replies received and parsed, including error replies.
    pub replies: u64,
    /// Requests that returned `None`.
    pub failures: u64,
    /// Replies that carried an `Error` key.
    pub error_replies: u64,
}

/// One logical request/reply connection to a server.
///
/// Strictly synchronous: one request is outstanding at a time. Any fault
/// drops the socket; the next request reconnects from scratch.
pub struct Session {
    config: SessionConfig,
    socket: Option<RequestSocket>,
    stats: SessionStats,
}

impl Session {
    /// Open a session and block until the server acknowledges a handshake.
    pub fn new(endpoint: Endpoint, mode: WireMode, timeout: Duration) -> Result<Self> {
        Self::with_config(SessionConfig::new(endpoint, mode, timeout))
    }

    /// Open a session with explicit configuration, blocking until the
    /// handshake succeeds.
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        Self::open_until(config, &AtomicBool::new(true))
    }

    /// Open a session, retrying the handshake until it succeeds or
    /// `running` is cleared.
    pub fn open_until(config: SessionConfig, running: &AtomicBool) -> Result<Self> {
        let mut session = Self::unverified(config)?;
        let handshake_config = session.config.handshake.clone();
        handshake::perform(&mut session, &handshake_config, running)?;
        Ok(session)
    }

    /// Create a not-connected session without handshaking.
    ///
    /// Fails only when the endpoint cannot be connected to at all.
    pub fn unverified(config: SessionConfig) -> Result<Self> {
        config.endpoint.connect_address()?;
        Ok(Self {
            config,
            socket: None,
            stats: SessionStats::default(),
        })
    }

    /// Connect if not already connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.socket.is_none() {
            self.socket = Some(RequestSocket::connect(
                &self.config.endpoint,
                self.config.timeout,
            )?);
        }
        Ok(())
    }

    /// Release the socket. No-op when already disconnected.
    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            debug!(endpoint = %self.config.endpoint, "session disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Send one frame and wait up to the timeout for its reply.
    ///
    /// Never returns an error: any failure disconnects, pauses for the
    /// reconnect backoff and yields `None`. Error replies are returned
    /// as-is after being logged.
    pub fn request(&mut self, frame: &Frame) -> Option<Reply> {
        self.stats.requests += 1;

        let parts = match self.config.codec.encode(frame) {
            Ok(parts) => parts,
            Err(err) => {
                self.stats.failures += 1;
                warn!(error = %err, ?frame, "failed to encode frame");
                return None;
            }
        };

        let started = Instant::now();
        match self.exchange(&parts) {
            Ok(reply) => {
                self.stats.replies += 1;
                if reply.is_error() {
                    self.stats.error_replies += 1;
                    warn!(
                        endpoint = %self.config.endpoint,
                        error = reply.error_message().as_deref().unwrap_or_default(),
                        "server returned an error reply"
                    );
                }
                trace!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request completed"
                );
                Some(reply)
            }
            Err(err) => {
                self.stats.failures += 1;
                warn!(endpoint = %self.config.endpoint, error = %err, "request failed");
                self.disconnect();
                thread::sleep(self.config.reconnect_backoff);
                None
            }
        }
    }

    fn exchange(&mut self, parts: &[Bytes]) -> Result<Reply> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => RequestSocket::connect(&self.config.endpoint, self.config.timeout)?,
        };
        let reply_parts = socket.request(parts)?;
        let reply = Reply::from_message(&reply_parts)?;
        self.socket = Some(socket);
        Ok(reply)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn mode(&self) -> WireMode {
        self.config.codec.mode()
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

impl FrameRequester for Session {
    fn request(&mut self, frame: &Frame) -> Option<Reply> {
        Session::request(self, frame)
    }

    fn reset(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.config.endpoint.to_string())
            .field("mode", &self.mode())
            .field("timeout", &self.config.timeout)
            .field("connected", &self.is_connected())
            .finish()
    }
}
