//! Codec abstraction driven by [`EncoderSession`]
//!
//! A codec follows a send/receive contract: frames go in through
//! [`Codec::send_frame`], packets come out of [`Codec::receive_packet`],
//! and either side may answer [`CodecError::TryAgain`] when the other side
//! has to run first. Sending `None` starts end-of-stream draining.
//!
//! [`EncoderSession`]: crate::session::EncoderSession

use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

use crate::errors::{EncoderError, Result};
use crate::negotiate::CapabilitiesOf;
use crate::stream::{FrameLayout, StreamConfig};

#[cfg(feature = "aac")]
pub mod aac;
#[cfg(feature = "h264")]
pub mod h264;

/// Status codes a codec returns from send and receive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The other half of the send/receive pair must run first
    #[error("resource temporarily unavailable")]
    TryAgain,

    /// No more packets will be produced
    #[error("end of stream")]
    EndOfStream,

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("{0}")]
    Fatal(String),
}

/// What an opened codec reports back about its framing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecParams {
    /// Samples per channel per frame, when the codec fixes it
    pub frame_samples: Option<usize>,
}

/// An encoder the session can drive
pub trait Codec {
    type Config: StreamConfig;

    fn name(&self) -> &str;

    /// Declared support lists, consulted before [`Codec::open`]
    fn capabilities(&self) -> &CapabilitiesOf<Self::Config>;

    /// Open the codec context for an accepted configuration
    fn open(&mut self, config: &Self::Config) -> std::result::Result<CodecParams, CodecError>;

    /// Queue one frame, or `None` to signal end of stream.
    ///
    /// A codec may keep the frame reference until a later call; the session
    /// will not overwrite the frame while it does.
    fn send_frame(&mut self, frame: Option<FrameRef>) -> std::result::Result<(), CodecError>;

    /// Write the next encoded packet into `packet`
    fn receive_packet(&mut self, packet: &mut Packet) -> std::result::Result<(), CodecError>;
}

/// One raw input frame, laid out as contiguous planes
#[derive(Debug)]
pub struct RawFrame {
    data: Vec<u8>,
    planes: Vec<Range<usize>>,
    samples: usize,
    pts: i64,
}

/// Shared handle to the session's reusable input frame
pub type FrameRef = Arc<RawFrame>;

impl RawFrame {
    /// Allocate a zeroed frame for `layout`
    pub fn allocate(layout: &FrameLayout) -> Result<Self> {
        let len = layout.byte_len();
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            EncoderError::Allocation(format!("frame buffer of {} bytes: {}", len, e))
        })?;
        data.resize(len, 0);

        let mut planes = Vec::with_capacity(layout.planes.len());
        let mut offset = 0;
        for &size in &layout.planes {
            planes.push(offset..offset + size);
            offset += size;
        }

        Ok(Self {
            data,
            planes,
            samples: layout.samples,
            pts: 0,
        })
    }

    /// Copy `raw` into the frame and stamp it. `raw` must match `len()`.
    pub(crate) fn fill(&mut self, raw: &[u8], pts: i64) {
        self.data.copy_from_slice(raw);
        self.pts = pts;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|range| &self.data[range.clone()])
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples per channel (audio) or 1 (video)
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }
}

/// Encoded access unit. The session reuses one packet for every receive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: i64,
    keyframe: bool,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve(capacity).map_err(|e| {
            EncoderError::Allocation(format!("packet buffer of {} bytes: {}", capacity, e))
        })?;
        Ok(Self {
            data,
            ..Self::default()
        })
    }

    /// Reset to an empty packet, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.pts = None;
        self.dts = None;
        self.duration = 0;
        self.keyframe = false;
    }

    /// Replace the payload, keeping the allocation
    pub fn set_data(&mut self, payload: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(payload);
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    pub fn set_dts(&mut self, dts: Option<i64>) {
        self.dts = dts;
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.duration = duration;
    }

    pub fn set_keyframe(&mut self, keyframe: bool) {
        self.keyframe = keyframe;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> FrameLayout {
        FrameLayout {
            planes: vec![16, 4, 4],
            samples: 1,
            pts_step: 1,
        }
    }

    #[test]
    fn test_frame_planes_are_contiguous() {
        let mut frame = RawFrame::allocate(&layout()).unwrap();
        assert_eq!(frame.len(), 24);
        assert_eq!(frame.plane_count(), 3);

        let raw: Vec<u8> = (0..24).collect();
        frame.fill(&raw, 7);
        assert_eq!(frame.plane(0).unwrap(), &raw[..16]);
        assert_eq!(frame.plane(2).unwrap(), &raw[20..]);
        assert!(frame.plane(3).is_none());
        assert_eq!(frame.pts(), 7);
    }

    #[test]
    fn test_packet_reuse_clears_metadata() {
        let mut packet = Packet::with_capacity(64).unwrap();
        packet.set_data(&[1, 2, 3]);
        packet.set_pts(Some(1024));
        packet.set_keyframe(true);
        assert_eq!(packet.len(), 3);

        packet.clear();
        assert!(packet.is_empty());
        assert_eq!(packet.pts(), None);
        assert!(!packet.is_keyframe());
        assert!(packet.data_mut().capacity() >= 64);
    }
}
