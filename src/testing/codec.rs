//! In-process codec with scriptable timing and failures
//!
//! Packets carry a small deterministic payload derived from the input
//! frame, so tests can check that every frame came out, in order, with the
//! timestamp it went in with.

use std::collections::VecDeque;
use std::marker::PhantomData;

use crate::codec::{Codec, CodecError, CodecParams, FrameRef, Packet};
use crate::negotiate::{CapabilitiesOf, CapabilityTable};
use crate::stream::{AudioConfig, StreamConfig, VideoConfig, DEFAULT_AAC_FRAME_SAMPLES};
use crate::types::{AacProfile, ChannelLayout, H264Profile, PixelFormat, SampleFormat};

/// Knobs for [`SyntheticCodec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticBehavior {
    /// Frames held back before the first packet appears
    pub latency: usize,
    /// Packets emitted per encoded frame
    pub packets_per_frame: usize,
    /// Queued packets at which input is refused with `TryAgain`
    pub queue_limit: usize,
    /// Keep the last input frame referenced until the next receive
    pub retain_input: bool,
    /// Refuse every nth send attempt with `TryAgain`
    pub refuse_every: Option<u64>,
    /// Fail fatally on the nth send (1-based)
    pub fail_on_send: Option<u64>,
    /// Fail fatally on the nth receive (1-based)
    pub fail_on_receive: Option<u64>,
    /// Frame size reported from `open`
    pub frame_samples: Option<usize>,
}

impl Default for SyntheticBehavior {
    fn default() -> Self {
        Self {
            latency: 0,
            packets_per_frame: 1,
            queue_limit: 64,
            retain_input: false,
            refuse_every: None,
            fail_on_send: None,
            fail_on_receive: None,
            frame_samples: None,
        }
    }
}

/// Counters a test can inspect through [`EncoderSession::codec`]
///
/// [`EncoderSession::codec`]: crate::session::EncoderSession::codec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticStats {
    pub opened: bool,
    pub sends: u64,
    pub receives: u64,
    pub frames_encoded: u64,
    pub end_of_stream: bool,
}

#[derive(Debug)]
struct PendingFrame {
    index: u64,
    pts: i64,
    duration: i64,
    checksum: u32,
}

/// A codec that encodes nothing but behaves like one
pub struct SyntheticCodec<C: StreamConfig> {
    name: String,
    capabilities: CapabilitiesOf<C>,
    behavior: SyntheticBehavior,
    pending: VecDeque<PendingFrame>,
    queue: VecDeque<(Vec<u8>, i64, i64)>,
    retained: Option<FrameRef>,
    stats: SyntheticStats,
    _config: PhantomData<C>,
}

impl<C: StreamConfig> SyntheticCodec<C> {
    pub fn new(name: &str, capabilities: CapabilitiesOf<C>) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            behavior: SyntheticBehavior::default(),
            pending: VecDeque::new(),
            queue: VecDeque::new(),
            retained: None,
            stats: SyntheticStats::default(),
            _config: PhantomData,
        }
    }

    pub fn with_behavior(mut self, behavior: SyntheticBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn behavior(&self) -> &SyntheticBehavior {
        &self.behavior
    }

    pub fn stats(&self) -> SyntheticStats {
        self.stats
    }

    /// True while the codec still references an input frame
    pub fn holds_input(&self) -> bool {
        self.retained.is_some()
    }

    fn encode_oldest(&mut self) {
        let Some(frame) = self.pending.pop_front() else {
            return;
        };
        let parts = self.behavior.packets_per_frame.max(1);
        for part in 0..parts {
            let mut payload = Vec::with_capacity(16 + (frame.index % 32) as usize);
            payload.extend_from_slice(&(frame.index as u32).to_be_bytes());
            payload.push(part as u8);
            payload.extend_from_slice(&frame.checksum.to_be_bytes());
            payload.resize(16 + (frame.index % 32) as usize, 0xA5);
            self.queue.push_back((payload, frame.pts, frame.duration));
        }
        self.stats.frames_encoded += 1;
    }
}

impl SyntheticCodec<AudioConfig> {
    /// Declares what a typical native AAC encoder supports
    pub fn aac() -> Self {
        let capabilities = CapabilityTable::unconstrained()
            .with_formats([SampleFormat::F32p])
            .with_rates([
                96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000,
                7350,
            ])
            .with_channel_layouts([
                ChannelLayout::Mono,
                ChannelLayout::Stereo,
                ChannelLayout::Surround3_0,
                ChannelLayout::Surround4_0,
                ChannelLayout::Surround5_0,
                ChannelLayout::Surround5_1,
                ChannelLayout::Surround7_1,
            ])
            .with_profiles([AacProfile::Main, AacProfile::Low, AacProfile::Ltp]);
        Self::new("synthetic-aac", capabilities).with_behavior(SyntheticBehavior {
            frame_samples: Some(DEFAULT_AAC_FRAME_SAMPLES),
            ..SyntheticBehavior::default()
        })
    }
}

impl SyntheticCodec<VideoConfig> {
    /// Declares what a typical software H.264 encoder supports
    pub fn h264() -> Self {
        let capabilities = CapabilityTable::unconstrained()
            .with_formats([
                PixelFormat::Yuv420p,
                PixelFormat::Nv12,
                PixelFormat::Yuv422p,
                PixelFormat::Yuv444p,
            ])
            .with_profiles([
                H264Profile::Baseline,
                H264Profile::ConstrainedBaseline,
                H264Profile::Main,
                H264Profile::High,
                H264Profile::High10,
                H264Profile::High422,
                H264Profile::High444,
            ]);
        Self::new("synthetic-h264", capabilities)
    }
}

impl<C: StreamConfig> Codec for SyntheticCodec<C> {
    type Config = C;

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &CapabilitiesOf<C> {
        &self.capabilities
    }

    fn open(&mut self, _config: &C) -> Result<CodecParams, CodecError> {
        self.stats = SyntheticStats {
            opened: true,
            ..SyntheticStats::default()
        };
        self.pending.clear();
        self.queue.clear();
        Ok(CodecParams {
            frame_samples: self.behavior.frame_samples,
        })
    }

    fn send_frame(&mut self, frame: Option<FrameRef>) -> Result<(), CodecError> {
        if self.stats.end_of_stream {
            return Err(CodecError::EndOfStream);
        }
        let Some(frame) = frame else {
            self.stats.end_of_stream = true;
            while !self.pending.is_empty() {
                self.encode_oldest();
            }
            return Ok(());
        };

        self.stats.sends += 1;
        if self.behavior.fail_on_send == Some(self.stats.sends) {
            return Err(CodecError::Fatal(format!(
                "{} failed on send {}",
                self.name, self.stats.sends
            )));
        }
        let refused = self
            .behavior
            .refuse_every
            .is_some_and(|n| n > 0 && self.stats.sends % n == 0);
        if refused || self.queue.len() >= self.behavior.queue_limit {
            return Err(CodecError::TryAgain);
        }

        let checksum = frame
            .data()
            .iter()
            .fold(0u32, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as u32));
        let index = self.stats.frames_encoded + self.pending.len() as u64;
        self.pending.push_back(PendingFrame {
            index,
            pts: frame.pts(),
            duration: frame.samples() as i64,
            checksum,
        });
        if self.behavior.retain_input {
            self.retained = Some(frame);
        }

        while self.pending.len() > self.behavior.latency {
            self.encode_oldest();
        }
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), CodecError> {
        self.retained = None;
        self.stats.receives += 1;
        if self.behavior.fail_on_receive == Some(self.stats.receives) {
            return Err(CodecError::Fatal(format!(
                "{} failed on receive {}",
                self.name, self.stats.receives
            )));
        }

        match self.queue.pop_front() {
            Some((payload, pts, duration)) => {
                packet.clear();
                packet.set_data(&payload);
                packet.set_pts(Some(pts));
                packet.set_dts(Some(pts));
                packet.set_duration(duration);
                packet.set_keyframe(true);
                Ok(())
            }
            None if self.stats.end_of_stream => Err(CodecError::EndOfStream),
            None => Err(CodecError::TryAgain),
        }
    }
}

/// Index and part number encoded in a synthetic packet payload
pub fn decode_payload(payload: &[u8]) -> Option<(u32, u8)> {
    if payload.len() < 9 {
        return None;
    }
    let index = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    Some((index, payload[4]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawFrame;
    use crate::stream::FrameLayout;
    use std::sync::Arc;

    fn frame(pts: i64) -> FrameRef {
        let layout = FrameLayout {
            planes: vec![8],
            samples: 4,
            pts_step: 4,
        };
        let mut frame = RawFrame::allocate(&layout).unwrap();
        frame.fill(&[1; 8], pts);
        Arc::new(frame)
    }

    #[test]
    fn test_latency_holds_frames_until_flush() {
        let mut codec = SyntheticCodec::<AudioConfig>::aac().with_behavior(SyntheticBehavior {
            latency: 2,
            ..SyntheticBehavior::default()
        });
        codec.open(&AudioConfig::aac(44100, ChannelLayout::Stereo)).unwrap();
        let mut packet = Packet::new();

        codec.send_frame(Some(frame(0))).unwrap();
        codec.send_frame(Some(frame(4))).unwrap();
        assert_eq!(codec.receive_packet(&mut packet), Err(CodecError::TryAgain));

        codec.send_frame(Some(frame(8))).unwrap();
        codec.receive_packet(&mut packet).unwrap();
        assert_eq!(packet.pts(), Some(0));
        assert_eq!(decode_payload(packet.data()), Some((0, 0)));

        codec.send_frame(None).unwrap();
        codec.receive_packet(&mut packet).unwrap();
        codec.receive_packet(&mut packet).unwrap();
        assert_eq!(packet.pts(), Some(8));
        assert_eq!(codec.receive_packet(&mut packet), Err(CodecError::EndOfStream));
        assert_eq!(codec.send_frame(Some(frame(12))), Err(CodecError::EndOfStream));
    }

    #[test]
    fn test_retained_input_is_released_on_receive() {
        let mut codec = SyntheticCodec::<VideoConfig>::h264().with_behavior(SyntheticBehavior {
            retain_input: true,
            ..SyntheticBehavior::default()
        });
        let input = frame(0);
        codec.send_frame(Some(Arc::clone(&input))).unwrap();
        assert!(codec.holds_input());
        assert_eq!(Arc::strong_count(&input), 2);

        let mut packet = Packet::new();
        codec.receive_packet(&mut packet).unwrap();
        assert!(!codec.holds_input());
        assert_eq!(Arc::strong_count(&input), 1);
    }
}
