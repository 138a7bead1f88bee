use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use imgwire_frame::Frame;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::reply::Reply;
use crate::session::FrameRequester;
use crate::source::FrameSource;

/// One published result: the captured frame and its reply, if any.
pub type FeedItem = (Frame, Option<Reply>);

/// Single-item hand-off between the feed thread and its consumer.
///
/// Holds at most one unread item; publishing over an unread item
/// discards the older one.
#[derive(Debug, Default)]
pub struct FeedSlot {
    state: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    item: Option<FeedItem>,
    published: u64,
    dropped: u64,
}

impl FeedSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `item`, evicting any unread one. Returns whether an item was
    /// evicted.
    pub fn publish(&self, frame: Frame, reply: Option<Reply>) -> bool {
        let mut state = self.lock();
        state.published += 1;
        let evicted = state.item.replace((frame, reply)).is_some();
        if evicted {
            state.dropped += 1;
        }
        evicted
    }

    /// Take the unread item, leaving the slot empty.
    pub fn take(&self) -> Option<FeedItem> {
        self.lock().item.take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().item.is_none()
    }

    /// Items published so far.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Items evicted before anyone read them.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // The state stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Options for a [`LiveFeed`].
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Publish captured frames without sending them; replies are `None`.
    pub capture_only: bool,
    /// Stop after this many captures.
    pub max_frames: Option<u64>,
    /// Name of the background thread.
    pub thread_name: String,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            capture_only: false,
            max_frames: None,
            thread_name: "imgwire-feed".to_string(),
        }
    }
}

/// Background capture→request loop feeding a [`FeedSlot`].
///
/// The consumer calls [`poll`](Self::poll), which never blocks. Results
/// the consumer is too slow to read are dropped, oldest first.
pub struct LiveFeed {
    slot: Arc<FeedSlot>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl LiveFeed {
    /// Spawn the background loop.
    pub fn start<R, S>(requester: R, source: S, options: FeedOptions) -> Result<Self>
    where
        R: FrameRequester + Send + 'static,
        S: FrameSource + Send + 'static,
    {
        let slot = Arc::new(FeedSlot::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let slot = Arc::clone(&slot);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(options.thread_name.clone())
                .spawn(move || run(requester, source, &options, &slot, &running))?
        };

        Ok(Self {
            slot,
            running,
            handle: Some(handle),
        })
    }

    /// Take the newest unread result, if any. Never blocks on the loop.
    pub fn poll(&self) -> Option<FeedItem> {
        self.slot.take()
    }

    /// False once the loop has exited, by `stop` or end of stream.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Ask the loop to exit and wait for it. An in-flight request is
    /// allowed to finish or time out. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(captured) => debug!(captured, "live feed stopped"),
                Err(_) => warn!("live feed thread panicked"),
            }
        }
    }

    pub fn slot(&self) -> &FeedSlot {
        &self.slot
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveFeed")
            .field("running", &self.is_running())
            .field("published", &self.slot.published())
            .field("dropped", &self.slot.dropped())
            .finish()
    }
}

fn run<R, S>(
    mut requester: R,
    mut source: S,
    options: &FeedOptions,
    slot: &FeedSlot,
    running: &AtomicBool,
) -> u64
where
    R: FrameRequester,
    S: FrameSource,
{
    let mut captured = 0u64;
    while running.load(Ordering::SeqCst) {
        if options.max_frames.is_some_and(|max| captured >= max) {
            debug!(captured, "frame limit reached");
            break;
        }
        let Some(frame) = source.capture() else {
            debug!(captured, "capture source exhausted");
            break;
        };
        captured += 1;

        let reply = if options.capture_only {
            None
        } else {
            requester.request(&frame)
        };
        if slot.publish(frame, reply) {
            trace!(captured, "unread result dropped");
        }
    }
    running.store(false, Ordering::SeqCst);
    captured
}
