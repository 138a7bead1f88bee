use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

const REBIND_ATTEMPTS: u32 = 20;
const REBIND_BACKOFF: Duration = Duration::from_millis(50);

/// Client side of the request/reply pattern (ZeroMQ REQ).
///
/// Strictly one outstanding request: every [`send`](Self::send) must be
/// followed by a [`recv`](Self::recv) before the next send. A socket that
/// timed out waiting for a reply is stuck and must be dropped; the session
/// layer does that by reconnecting from scratch.
pub struct RequestSocket {
    socket: zmq::Socket,
    _context: zmq::Context,
    endpoint: Endpoint,
    timeout: Duration,
}

impl RequestSocket {
    /// Connect to a listening reply socket.
    ///
    /// ZeroMQ connects in the background, so this succeeds even when nothing
    /// is listening yet; an unreachable peer shows up as a reply timeout.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let address = endpoint.connect_address()?;
        let context = zmq::Context::new();
        let socket = context
            .socket(zmq::REQ)
            .map_err(TransportError::from_zmq)?;

        let millis = timeout_millis(timeout);
        socket.set_linger(0).map_err(TransportError::from_zmq)?;
        socket
            .set_rcvtimeo(millis)
            .map_err(TransportError::from_zmq)?;
        socket
            .set_sndtimeo(millis)
            .map_err(TransportError::from_zmq)?;

        socket
            .connect(&address)
            .map_err(|source| TransportError::Connect {
                endpoint: address.clone(),
                source,
            })?;
        debug!(endpoint = %address, ?timeout, "request socket connected");

        Ok(Self {
            socket,
            _context: context,
            endpoint: endpoint.clone(),
            timeout,
        })
    }

    /// Send one multipart message.
    pub fn send(&self, parts: &[Bytes]) -> Result<()> {
        send_parts(&self.socket, parts, self.timeout)
    }

    /// Wait up to the socket timeout for one multipart message.
    pub fn recv(&self) -> Result<Vec<Bytes>> {
        recv_parts(&self.socket, self.timeout)?.ok_or(TransportError::Timeout(self.timeout))
    }

    /// Send `parts` and wait for the matching reply.
    pub fn request(&self, parts: &[Bytes]) -> Result<Vec<Bytes>> {
        self.send(parts)?;
        self.recv()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for RequestSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSocket")
            .field("endpoint", &self.endpoint.to_string())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Server side of the request/reply pattern (ZeroMQ REP).
///
/// Receives one request, then must send exactly one reply before the next
/// request can be received.
pub struct ReplySocket {
    socket: zmq::Socket,
    context: zmq::Context,
    endpoint: Endpoint,
    max_message_size: Option<usize>,
}

impl ReplySocket {
    /// Bind and listen on `endpoint`. Port `0` picks an ephemeral port.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        Self::bind_with_limit(endpoint, None)
    }

    /// Bind, refusing any inbound message part larger than
    /// `max_message_size` bytes.
    ///
    /// An oversized part is rejected while its size header is read: the
    /// sending peer is disconnected and nothing reaches [`recv`](Self::recv).
    pub fn bind_with_limit(endpoint: &Endpoint, max_message_size: Option<usize>) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = open_reply_socket(&context, max_message_size)?;
        let address = endpoint.bind_address();

        socket
            .bind(&address)
            .map_err(|source| TransportError::Bind {
                endpoint: address.clone(),
                source,
            })?;

        let endpoint = resolved_endpoint(&socket, endpoint);
        info!(%endpoint, ?max_message_size, "listening on reply socket");

        Ok(Self {
            socket,
            context,
            endpoint,
            max_message_size,
        })
    }

    /// Wait up to `wait` for the next request.
    ///
    /// Returns `Ok(None)` when nothing arrived, so callers can check a
    /// shutdown flag between waits.
    pub fn recv(&self, wait: Duration) -> Result<Option<Vec<Bytes>>> {
        recv_parts(&self.socket, wait)
    }

    /// Send the reply for the request most recently received.
    pub fn send(&self, parts: &[Bytes]) -> Result<()> {
        send_parts(&self.socket, parts, Duration::ZERO)
    }

    /// Close the socket and bind a fresh one on the same endpoint.
    ///
    /// Resets the request/reply state machine after a failed reply.
    pub fn rebind(&mut self) -> Result<()> {
        let fresh = open_reply_socket(&self.context, self.max_message_size)?;
        // Close the old socket first so the port is free again.
        drop(std::mem::replace(&mut self.socket, fresh));

        let address = self.endpoint.bind_address();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.socket.bind(&address) {
                Ok(()) => {
                    debug!(endpoint = %self.endpoint, attempt, "reply socket rebound");
                    return Ok(());
                }
                Err(zmq::Error::EADDRINUSE) if attempt < REBIND_ATTEMPTS => {
                    thread::sleep(REBIND_BACKOFF);
                }
                Err(source) => {
                    warn!(endpoint = %self.endpoint, error = %source, "rebind failed");
                    return Err(TransportError::Bind {
                        endpoint: address,
                        source,
                    });
                }
            }
        }
    }

    /// The endpoint actually bound, with any ephemeral port resolved.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }
}

impl std::fmt::Debug for ReplySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySocket")
            .field("endpoint", &self.endpoint.to_string())
            .finish()
    }
}

impl Drop for ReplySocket {
    fn drop(&mut self) {
        debug!(endpoint = %self.endpoint, "closing reply socket");
    }
}

fn open_reply_socket(context: &zmq::Context, max_message_size: Option<usize>) -> Result<zmq::Socket> {
    let socket = context
        .socket(zmq::REP)
        .map_err(TransportError::from_zmq)?;
    socket.set_linger(0).map_err(TransportError::from_zmq)?;
    if let Some(max) = max_message_size {
        // Must be set before bind; applies to every connection accepted later.
        socket
            .set_maxmsgsize(i64::try_from(max).unwrap_or(i64::MAX))
            .map_err(TransportError::from_zmq)?;
    }
    Ok(socket)
}

fn resolved_endpoint(socket: &zmq::Socket, requested: &Endpoint) -> Endpoint {
    match socket.get_last_endpoint() {
        Ok(Ok(address)) => match address.parse::<Endpoint>() {
            Ok(bound) if requested.port() == 0 => requested.with_port(bound.port()),
            Ok(_) => requested.clone(),
            Err(_) => requested.clone(),
        },
        _ => requested.clone(),
    }
}

fn send_parts(socket: &zmq::Socket, parts: &[Bytes], timeout: Duration) -> Result<()> {
    if parts.is_empty() {
        return Err(TransportError::EmptyMessage);
    }
    let size: usize = parts.iter().map(Bytes::len).sum();
    trace!(parts = parts.len(), size, "sending message");

    socket
        .send_multipart(parts.iter().map(|part| part.as_ref()), 0)
        .map_err(|err| match err {
            zmq::Error::EAGAIN => TransportError::Timeout(timeout),
            other => TransportError::from_zmq(other),
        })
}

fn recv_parts(socket: &zmq::Socket, wait: Duration) -> Result<Option<Vec<Bytes>>> {
    let ready = socket
        .poll(zmq::POLLIN, i64::from(timeout_millis(wait)))
        .map_err(TransportError::from_zmq)?;
    if ready == 0 {
        return Ok(None);
    }

    match socket.recv_multipart(zmq::DONTWAIT) {
        Ok(parts) => {
            trace!(parts = parts.len(), "received message");
            Ok(Some(parts.into_iter().map(Bytes::from).collect()))
        }
        Err(zmq::Error::EAGAIN) => Ok(None),
        Err(err) => Err(TransportError::from_zmq(err)),
    }
}

fn timeout_millis(timeout: Duration) -> i32 {
    timeout.as_millis().min(i32::MAX as u128) as i32
}
