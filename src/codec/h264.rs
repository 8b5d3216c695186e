//! H.264 backend using openh264
//!
//! openh264 encodes synchronously, so every accepted frame produces its
//! Annex B access unit immediately; the unit is queued until the session
//! drains it. Frames the rate controller skips produce nothing.

use std::collections::VecDeque;

use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

use super::{Codec, CodecError, CodecParams, FrameRef, Packet};
use crate::negotiate::{CapabilitiesOf, CapabilityTable};
use crate::stream::VideoConfig;
use crate::types::{H264Profile, PixelFormat};

/// Access units waiting to be drained before input is refused
const MAX_QUEUED_UNITS: usize = 8;

struct AccessUnit {
    data: Vec<u8>,
    pts: i64,
    keyframe: bool,
}

/// openh264 encoder behind the [`Codec`] contract
pub struct OpenH264Codec {
    capabilities: CapabilitiesOf<VideoConfig>,
    encoder: Option<Encoder>,
    width: usize,
    height: usize,
    gop_size: u32,
    frames_since_keyframe: u32,
    queue: VecDeque<AccessUnit>,
    end_of_stream: bool,
}

impl OpenH264Codec {
    pub fn new() -> Self {
        // openh264 takes I420 only and emits constrained baseline streams
        let capabilities = CapabilityTable::unconstrained()
            .with_formats([PixelFormat::Yuv420p])
            .with_profiles([H264Profile::Baseline, H264Profile::ConstrainedBaseline]);

        Self {
            capabilities,
            encoder: None,
            width: 0,
            height: 0,
            gop_size: 0,
            frames_since_keyframe: 0,
            queue: VecDeque::new(),
            end_of_stream: false,
        }
    }
}

impl Default for OpenH264Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for OpenH264Codec {
    type Config = VideoConfig;

    fn name(&self) -> &str {
        "openh264"
    }

    fn capabilities(&self) -> &CapabilitiesOf<VideoConfig> {
        &self.capabilities
    }

    fn open(&mut self, config: &VideoConfig) -> Result<CodecParams, CodecError> {
        if config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(CodecError::Fatal(format!(
                "I420 needs even dimensions, got {}x{}",
                config.width, config.height
            )));
        }

        // Dimensions are taken from the YUV source at encode time
        let encoder = Encoder::new()
            .map_err(|e| CodecError::Allocation(format!("openh264 encoder: {}", e)))?;

        self.encoder = Some(encoder);
        self.width = config.width as usize;
        self.height = config.height as usize;
        self.gop_size = config.gop_size;
        self.frames_since_keyframe = 0;
        self.queue.clear();
        self.end_of_stream = false;

        Ok(CodecParams::default())
    }

    fn send_frame(&mut self, frame: Option<FrameRef>) -> Result<(), CodecError> {
        if self.end_of_stream {
            return Err(CodecError::EndOfStream);
        }
        let Some(frame) = frame else {
            self.end_of_stream = true;
            return Ok(());
        };
        if self.queue.len() >= MAX_QUEUED_UNITS {
            return Err(CodecError::TryAgain);
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| CodecError::Fatal("encoder not opened".to_string()))?;

        if self.gop_size > 0 && self.frames_since_keyframe >= self.gop_size {
            encoder.force_intra_frame();
            self.frames_since_keyframe = 0;
        }

        let yuv = YUVBuffer::from_vec(frame.data().to_vec(), self.width, self.height);
        let bitstream = encoder
            .encode(&yuv)
            .map_err(|e| CodecError::Fatal(format!("openh264 encode: {}", e)))?;

        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();
        if keyframe {
            self.frames_since_keyframe = 1;
        } else {
            self.frames_since_keyframe += 1;
        }

        if data.is_empty() {
            log::trace!("openh264 skipped frame at pts {}", frame.pts());
        } else {
            self.queue.push_back(AccessUnit {
                data,
                pts: frame.pts(),
                keyframe,
            });
        }
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), CodecError> {
        match self.queue.pop_front() {
            Some(unit) => {
                packet.clear();
                packet.set_data(&unit.data);
                packet.set_pts(Some(unit.pts));
                packet.set_dts(Some(unit.pts));
                packet.set_duration(1);
                packet.set_keyframe(unit.keyframe);
                Ok(())
            }
            None if self.end_of_stream => Err(CodecError::EndOfStream),
            None => Err(CodecError::TryAgain),
        }
    }
}
