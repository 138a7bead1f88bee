use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use imgwire_frame::Frame;

use crate::reply::{Diagnostic, Reply};

/// The computer-vision boundary: turn one frame into one reply.
///
/// The server owns its classifier and calls it sequentially, so
/// implementations may keep mutable state between frames.
pub trait Classifier {
    fn classify(&mut self, frame: &Frame) -> Result<Reply, Diagnostic>;
}

impl<F> Classifier for F
where
    F: FnMut(&Frame) -> Result<Reply, Diagnostic>,
{
    fn classify(&mut self, frame: &Frame) -> Result<Reply, Diagnostic> {
        self(frame)
    }
}

/// Invoke `classifier`, converting a panic into a diagnostic.
pub fn classify_guarded<C: Classifier + ?Sized>(
    classifier: &mut C,
    frame: &Frame,
) -> Result<Reply, Diagnostic> {
    match panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(frame))) {
        Ok(result) => result,
        Err(payload) => Err(Diagnostic::new(format!(
            "classifier panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

/// Demonstration classifier: per-channel and overall mean plus the shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanClassifier;

impl Classifier for MeanClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Reply, Diagnostic> {
        Ok(Reply::new()
            .with("mean", frame.mean())
            .with("channel_means", frame.channel_means())
            .with("shape", frame.shape().to_vec())
            .with("dtype", frame.pixel_type().dtype()))
    }
}
