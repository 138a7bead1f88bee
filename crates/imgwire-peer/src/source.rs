use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use imgwire_frame::Frame;
use tracing::{debug, warn};

use crate::error::{PeerError, Result};

/// File extensions a [`DirectorySource`] picks up.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// The image acquisition boundary.
pub trait FrameSource {
    /// Produce the next frame, or `None` at end of stream.
    fn capture(&mut self) -> Option<Frame>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<Frame>,
{
    fn capture(&mut self) -> Option<Frame> {
        self()
    }
}

/// Replays the image files of one directory in file-name order.
///
/// Frames are 3-channel BGR. Files that fail to decode are skipped.
#[derive(Debug)]
pub struct DirectorySource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
    skipped: u64,
}

impl DirectorySource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(PeerError::Capture(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        debug!(dir = %dir.display(), files = paths.len(), "opened image directory");

        Ok(Self {
            dir,
            pending: paths.into(),
            skipped: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files not yet captured.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Files that could not be decoded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl FrameSource for DirectorySource {
    fn capture(&mut self) -> Option<Frame> {
        while let Some(path) = self.pending.pop_front() {
            match load_bgr(&path) {
                Ok(frame) => return Some(frame),
                Err(err) => {
                    self.skipped += 1;
                    warn!(path = %path.display(), error = %err, "skipping unreadable image");
                }
            }
        }
        None
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn load_bgr(path: &Path) -> Result<Frame> {
    let image = image::open(path).map_err(|err| PeerError::Capture(err.to_string()))?;
    Ok(Frame::from_rgb_as_bgr(image.into_rgb8())?)
}

/// Yields one frame a fixed number of times, or forever.
#[derive(Debug, Clone)]
pub struct RepeatSource {
    frame: Frame,
    remaining: Option<u64>,
}

impl RepeatSource {
    pub fn new(frame: Frame, count: u64) -> Self {
        Self {
            frame,
            remaining: Some(count),
        }
    }

    pub fn forever(frame: Frame) -> Self {
        Self {
            frame,
            remaining: None,
        }
    }
}

impl FrameSource for RepeatSource {
    fn capture(&mut self) -> Option<Frame> {
        match &mut self.remaining {
            None => Some(self.frame.clone()),
            Some(0) => None,
            Some(remaining) => {
                *remaining -= 1;
                Some(self.frame.clone())
            }
        }
    }
}
