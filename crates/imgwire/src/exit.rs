use std::fmt;
use std::io;

use imgwire_frame::FrameError;
use imgwire_peer::PeerError;
use imgwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match &err {
        TransportError::InvalidEndpoint(_) => USAGE,
        TransportError::Timeout(_) => TIMEOUT,
        TransportError::Interrupted => INTERRUPTED,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::UnknownMode(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Io(err) => io_error(context, err),
        PeerError::Json(_) | PeerError::InvalidReply(_) | PeerError::Capture(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PeerError::HandshakeFailed { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Interrupted => CliError::new(INTERRUPTED, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_errors_map_to_exit_codes() {
        assert_eq!(
            peer_error("x", PeerError::HandshakeFailed { attempts: 3 }).code,
            TIMEOUT
        );
        assert_eq!(peer_error("x", PeerError::Interrupted).code, INTERRUPTED);
        assert_eq!(
            peer_error("x", PeerError::Capture("gone".into())).code,
            DATA_INVALID
        );
        assert_eq!(
            peer_error(
                "x",
                PeerError::Transport(TransportError::InvalidEndpoint("tcp://*:0".into()))
            )
            .code,
            USAGE
        );
    }

    #[test]
    fn context_prefixes_message() {
        let err = frame_error("decode failed", FrameError::UnsupportedPixelType("c16".into()));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("decode failed: "));
    }
}
