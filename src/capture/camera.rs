//! Camera capture through nokhwa
//!
//! The camera is asked for packed YUYV 4:2:2 at the video session's size
//! and frame rate. [`open_camera`] wraps it in a [`Yuyv422Feed`] so the
//! session receives I420.
//!
//! A `nokhwa::Camera` must stay on the thread that opened it. Open it on
//! the capture thread with [`CaptureThread::spawn_with`].
//!
//! [`CaptureThread::spawn_with`]: crate::pipeline::CaptureThread::spawn_with

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::{query, Camera};

use super::convert::Yuyv422Feed;
use super::CaptureFeed;
use crate::errors::{EncoderError, Result};
use crate::stream::VideoConfig;
use crate::types::Rational;

/// A camera found by [`list_cameras`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub index: String,
    pub name: String,
}

/// List cameras visible to the platform backend
pub fn list_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)
        .map_err(|e| EncoderError::Capture(format!("failed to query cameras: {}", e)))?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().to_string(),
            name: info.human_name(),
        })
        .collect())
}

/// Whole frames per second to request from the device, at least one
pub fn requested_fps(frame_rate: Rational) -> u32 {
    frame_rate.to_f64().round().max(1.0) as u32
}

/// Live YUYV camera frames
pub struct CameraFeed {
    camera: Camera,
    name: String,
    width: u32,
    height: u32,
    frames_captured: u64,
}

impl CameraFeed {
    /// Open camera `index` in YUYV at `config`'s resolution and frame rate
    /// and start streaming.
    ///
    /// A device that cannot deliver YUYV at exactly that resolution is an
    /// error.
    pub fn open(index: u32, config: &VideoConfig) -> Result<Self> {
        let resolution = Resolution::new(config.width, config.height);
        let fps = requested_fps(config.frame_rate);
        let wanted = CameraFormat::new(resolution, FrameFormat::YUYV, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let mut camera = Camera::new(CameraIndex::Index(index), requested).map_err(|e| {
            EncoderError::Capture(format!("failed to open camera {}: {}", index, e))
        })?;

        let format = camera.camera_format();
        if format.format() != FrameFormat::YUYV || format.resolution() != resolution {
            return Err(EncoderError::Capture(format!(
                "camera {} offers {:?} {}x{}, need YUYV {}x{}",
                index,
                format.format(),
                format.resolution().width(),
                format.resolution().height(),
                config.width,
                config.height
            )));
        }

        camera
            .open_stream()
            .map_err(|e| EncoderError::Capture(format!("failed to start camera {}: {}", index, e)))?;

        let name = camera.info().human_name();
        log::info!(
            "opened camera {}: {}x{} YUYV at {} fps",
            name,
            config.width,
            config.height,
            format.frame_rate()
        );

        Ok(Self {
            camera,
            name,
            width: config.width,
            height: config.height,
            frames_captured: 0,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Bytes in one packed YUYV frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }
}

impl CaptureFeed for CameraFeed {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        let buffer = self.camera.frame().map_err(|e| {
            EncoderError::Capture(format!("camera {} stopped delivering frames: {}", self.name, e))
        })?;
        if buffer.source_frame_format() != FrameFormat::YUYV {
            return Err(EncoderError::Capture(format!(
                "camera {} delivered {:?} instead of YUYV",
                self.name,
                buffer.source_frame_format()
            )));
        }

        let data = buffer.buffer();
        if data.len() != frame.len() {
            return Err(EncoderError::FrameSize {
                expected: frame.len(),
                actual: data.len(),
            });
        }
        frame.copy_from_slice(data);
        self.frames_captured += 1;
        Ok(true)
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("failed to stop camera {}: {}", self.name, e);
        }
        log::debug!("camera {} closed after {} frames", self.name, self.frames_captured);
    }
}

/// Open camera `index` and convert its frames to I420 for `config`
pub fn open_camera(index: u32, config: &VideoConfig) -> Result<Yuyv422Feed<CameraFeed>> {
    let camera = CameraFeed::open(index, config)?;
    Ok(Yuyv422Feed::new(camera, config.width, config.height))
}
