//! Capture sources that produce raw frames for an encoder session
//!
//! A [`CaptureFeed`] fills exactly one frame per call. Sources that do not
//! naturally deliver frame-sized chunks (files, sound cards) re-chunk
//! their input. Cameras deliver packed YUYV, converted by [`Yuyv422Feed`].

use std::io::{ErrorKind, Read};

use crate::errors::Result;

#[cfg(feature = "camera")]
pub mod camera;
pub mod convert;
#[cfg(feature = "capture")]
pub mod soundcard;

#[cfg(feature = "camera")]
pub use camera::{list_cameras, open_camera, CameraDevice, CameraFeed};
pub use convert::{write_samples, yuyv422_to_yuv420, Yuyv422Feed};
#[cfg(feature = "capture")]
pub use soundcard::SoundCardFeed;

/// Source of raw frames
pub trait CaptureFeed {
    /// Fill `frame` completely. Returns `false` once the source is exhausted.
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool>;
}

impl<F: CaptureFeed + ?Sized> CaptureFeed for &mut F {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        (**self).read_frame(frame)
    }
}

impl<F: CaptureFeed + ?Sized> CaptureFeed for Box<F> {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        (**self).read_frame(frame)
    }
}

/// Frames read back to back from a byte stream (raw PCM or planar YUV).
///
/// A trailing partial frame is zero-padded; an empty tail ends the stream.
pub struct RawReader<R> {
    inner: R,
    frames_read: u64,
    finished: bool,
}

impl<R: Read> RawReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            frames_read: 0,
            finished: false,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> CaptureFeed for RawReader<R> {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }

        let mut filled = 0;
        while filled < frame.len() {
            match self.inner.read(&mut frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled < frame.len() {
            self.finished = true;
            if filled == 0 {
                return Ok(false);
            }
            log::debug!(
                "padding final frame: {} of {} bytes read",
                filled,
                frame.len()
            );
            frame[filled..].fill(0);
        }

        self.frames_read += 1;
        Ok(true)
    }
}
