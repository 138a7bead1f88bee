use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use imgwire_frame::{Frame, WireCodec, WireMode};
use imgwire_transport::{Endpoint, ReplySocket, TransportError};
use tracing::{debug, info, warn};

use crate::classify::{classify_guarded, Classifier};
use crate::error::Result;
use crate::handshake;
use crate::reply::Reply;
use crate::session::DEFAULT_PORT;

/// Sent when a reply cannot be serialized at all.
const FALLBACK_REPLY: &[u8] = br#"{"Error": "reply could not be serialized"}"#;

/// Configuration for a transport server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Endpoint to bind. Port `0` picks an ephemeral port.
    pub endpoint: Endpoint,
    /// Wire mode of incoming frames.
    pub codec: WireCodec,
    /// Longest wait for a request before the running flag is checked again.
    pub poll_interval: Duration,
    /// Log every reply body at info level.
    pub verbose: bool,
}

impl ServerConfig {
    pub fn new(endpoint: Endpoint, mode: WireMode) -> Self {
        Self {
            endpoint,
            codec: WireCodec::new(mode),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::any(DEFAULT_PORT),
            codec: WireCodec::default(),
            poll_interval: Duration::from_millis(100),
            verbose: false,
        }
    }
}

/// Counters reported when a server stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Requests received, handshakes included.
    pub requests: u64,
    /// Handshake frames acknowledged.
    pub handshakes: u64,
    /// Frames the classifier answered successfully.
    pub classified: u64,
    /// Requests that could not be decoded.
    pub decode_failures: u64,
    /// Classifier failures and panics.
    pub classifier_failures: u64,
    /// Times the socket was rebound after a failed reply.
    pub rebinds: u64,
}

/// How one request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Handshake,
    Classified,
    Undecodable,
    ClassifierFailed,
}

/// Strict request→reply server around one classifier.
///
/// Every received request gets exactly one reply, whatever goes wrong
/// while decoding or classifying it.
pub struct Server {
    socket: ReplySocket,
    config: ServerConfig,
}

impl Server {
    /// Bind `endpoint` with default settings for `mode`.
    pub fn bind(endpoint: &Endpoint, mode: WireMode) -> Result<Self> {
        Self::bind_with_config(ServerConfig::new(endpoint.clone(), mode))
    }

    /// Bind with explicit configuration.
    ///
    /// Inbound message parts larger than the codec allows are refused by
    /// the socket before they are buffered.
    pub fn bind_with_config(mut config: ServerConfig) -> Result<Self> {
        let socket =
            ReplySocket::bind_with_limit(&config.endpoint, Some(config.codec.max_part_bytes()))?;
        config.endpoint = socket.endpoint().clone();
        Ok(Self { socket, config })
    }

    /// The bound endpoint, ephemeral port resolved.
    pub fn endpoint(&self) -> &Endpoint {
        self.socket.endpoint()
    }

    pub fn mode(&self) -> WireMode {
        self.config.codec.mode()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve requests until `running` is cleared, then release the endpoint.
    pub fn serve<C: Classifier>(
        mut self,
        mut classifier: C,
        running: &AtomicBool,
    ) -> Result<ServeStats> {
        let mut stats = ServeStats::default();
        info!(
            endpoint = %self.endpoint(),
            mode = %self.mode(),
            "serving"
        );

        while running.load(Ordering::SeqCst) {
            let Some(parts) = received(self.socket.recv(self.config.poll_interval)) else {
                continue;
            };

            let received_at = Instant::now();
            debug!(
                parts = parts.len(),
                size = parts.iter().map(Bytes::len).sum::<usize>(),
                "request received"
            );
            let (reply, outcome) = self.respond(&mut classifier, &parts);
            debug!(
                ?outcome,
                elapsed_ms = received_at.elapsed().as_millis() as u64,
                "request handled"
            );

            stats.requests += 1;
            match outcome {
                Outcome::Handshake => stats.handshakes += 1,
                Outcome::Classified => stats.classified += 1,
                Outcome::Undecodable => stats.decode_failures += 1,
                Outcome::ClassifierFailed => stats.classifier_failures += 1,
            }

            if self.config.verbose {
                info!(reply = %reply, "reply");
            }
            if self.send_reply(&reply) {
                stats.rebinds += 1;
            }
        }

        info!(
            endpoint = %self.endpoint(),
            requests = stats.requests,
            handshakes = stats.handshakes,
            classified = stats.classified,
            failures = stats.decode_failures + stats.classifier_failures,
            "server stopped"
        );
        Ok(stats)
    }

    /// Build the reply for one request without sending it.
    fn respond<C: Classifier + ?Sized>(
        &self,
        classifier: &mut C,
        parts: &[Bytes],
    ) -> (Reply, Outcome) {
        let frame = match self.config.codec.decode(parts) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, mode = %self.mode(), "failed to decode request");
                return (
                    Reply::error(format!("failed to decode request: {err}")),
                    Outcome::Undecodable,
                );
            }
        };

        if handshake::is_handshake(&frame) {
            debug!("handshake acknowledged");
            return (handshake::acknowledgement(), Outcome::Handshake);
        }

        log_frame(&frame);
        match classify_guarded(classifier, &frame) {
            Ok(reply) => (reply, Outcome::Classified),
            Err(diagnostic) => {
                warn!(%diagnostic, "classifier failed");
                (Reply::error(diagnostic), Outcome::ClassifierFailed)
            }
        }
    }

    /// Send `reply`, rebinding the socket if the send fails.
    ///
    /// Returns whether a rebind happened.
    fn send_reply(&mut self, reply: &Reply) -> bool {
        let message = reply
            .to_message()
            .unwrap_or_else(|_| vec![Bytes::from_static(FALLBACK_REPLY)]);
        let Err(err) = self.socket.send(&message) else {
            return false;
        };

        warn!(error = %err, "reply send failed, rebinding");
        if let Err(err) = self.socket.rebind() {
            warn!(error = %err, "rebind failed");
        }
        true
    }
}

/// The request from one receive attempt, if there is one to answer.
///
/// A failed receive leaves the socket without a pending request, so there
/// is nothing to reply to.
fn received(result: imgwire_transport::Result<Option<Vec<Bytes>>>) -> Option<Vec<Bytes>> {
    match result {
        Ok(parts) => parts,
        Err(TransportError::Interrupted) => None,
        Err(err) => {
            warn!(error = %err, "receive failed");
            None
        }
    }
}

fn log_frame(frame: &Frame) {
    debug!(
        shape = ?frame.shape(),
        dtype = frame.pixel_type().dtype(),
        "classifying frame"
    );
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("endpoint", &self.endpoint().to_string())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Bind `endpoint` and serve `classifier` until `running` is cleared.
pub fn serve<C: Classifier>(
    endpoint: &Endpoint,
    mode: WireMode,
    classifier: C,
    running: &AtomicBool,
) -> Result<ServeStats> {
    Server::bind(endpoint, mode)?.serve(classifier, running)
}
