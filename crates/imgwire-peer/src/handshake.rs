use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use imgwire_frame::Frame;
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};
use crate::reply::Reply;
use crate::session::FrameRequester;

/// Upper bound on one uninterrupted sleep while waiting on a running flag.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Configuration for the liveness handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Pause after each failed attempt.
    pub backoff: Duration,
    /// Give up after this many attempts. `None` retries until interrupted.
    pub max_attempts: Option<u32>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

/// The frame every handshake sends: 1×1×3 all-zero `uint8`.
pub fn handshake_frame() -> Frame {
    Frame::sentinel()
}

/// True when a received frame is a handshake rather than real work.
pub fn is_handshake(frame: &Frame) -> bool {
    frame.is_sentinel()
}

/// The reply a server sends for every handshake frame.
pub fn acknowledgement() -> Reply {
    Reply::hello()
}

/// Send handshake frames until a non-failure reply arrives.
///
/// Every failed attempt (no reply, or an `Error` reply) resets the
/// requester and pauses for `config.backoff`. Clearing `running` aborts
/// with [`PeerError::Interrupted`].
pub fn perform<R: FrameRequester + ?Sized>(
    requester: &mut R,
    config: &HandshakeConfig,
    running: &AtomicBool,
) -> Result<Reply> {
    let frame = handshake_frame();
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if !running.load(Ordering::SeqCst) {
            return Err(PeerError::Interrupted);
        }

        attempts += 1;
        match requester.request(&frame) {
            Some(reply) if !reply.is_error() => {
                info!(
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "handshake acknowledged"
                );
                return Ok(reply);
            }
            Some(reply) => {
                warn!(attempts, error = ?reply.error_message(), "handshake rejected");
            }
            None => debug!(attempts, "no handshake reply"),
        }

        requester.reset();
        if config.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(PeerError::HandshakeFailed { attempts });
        }
        if !sleep_while_running(running, config.backoff) {
            return Err(PeerError::Interrupted);
        }
    }
}

/// Sleep for `duration`, waking early when `running` is cleared.
///
/// Returns whether `running` was still set at the end.
pub(crate) fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::*;

    /// Scripted requester that records what the handshake asked of it.
    struct Scripted {
        replies: VecDeque<Option<Reply>>,
        requests: u32,
        resets: u32,
    }

    impl Scripted {
        fn new(replies: Vec<Option<Reply>>) -> Self {
            Self {
                replies: replies.into(),
                requests: 0,
                resets: 0,
            }
        }
    }

    impl FrameRequester for Scripted {
        fn request(&mut self, frame: &Frame) -> Option<Reply> {
            assert!(is_handshake(frame));
            self.requests += 1;
            self.replies.pop_front().flatten()
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn fast() -> HandshakeConfig {
        HandshakeConfig {
            backoff: Duration::from_millis(1),
            max_attempts: None,
        }
    }

    #[test]
    fn succeeds_on_first_ack() {
        let mut requester = Scripted::new(vec![Some(Reply::hello())]);
        let reply = perform(&mut requester, &fast(), &AtomicBool::new(true))
            .expect("handshake should succeed");
        assert!(reply.is_hello());
        assert_eq!(requester.requests, 1);
        assert_eq!(requester.resets, 0);
    }

    #[test]
    fn retries_through_timeouts_and_error_replies() {
        let mut requester = Scripted::new(vec![
            None,
            Some(Reply::error("warming up")),
            None,
            Some(Reply::hello()),
        ]);
        perform(&mut requester, &fast(), &AtomicBool::new(true))
            .expect("handshake should eventually succeed");
        assert_eq!(requester.requests, 4);
        assert_eq!(requester.resets, 3);
    }

    #[test]
    fn bounded_attempts_give_up() {
        let mut requester = Scripted::new(vec![]);
        let config = HandshakeConfig {
            max_attempts: Some(3),
            ..fast()
        };
        let err = perform(&mut requester, &config, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, PeerError::HandshakeFailed { attempts: 3 }));
    }

    #[test]
    fn cleared_flag_interrupts_backoff() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(false, Ordering::SeqCst);
        });

        let mut requester = Scripted::new(vec![]);
        let config = HandshakeConfig {
            backoff: Duration::from_secs(30),
            max_attempts: None,
        };
        let started = Instant::now();
        let err = perform(&mut requester, &config, &running).unwrap_err();
        assert!(matches!(err, PeerError::Interrupted));
        assert!(started.elapsed() < Duration::from_secs(5));
        stopper.join().expect("stopper should finish");
    }

    #[test]
    fn sentinel_helpers_agree() {
        assert!(is_handshake(&handshake_frame()));
        assert!(acknowledgement().is_hello());
    }
}
