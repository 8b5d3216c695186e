//! Stream configurations for the audio and video encoder sessions
//!
//! Both configurations feed the same generic [`EncoderSession`]; they differ
//! only in what they ask the negotiator to check, how a raw frame is laid
//! out, and how far the presentation timestamp advances per frame.
//!
//! [`EncoderSession`]: crate::session::EncoderSession

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::negotiate::Requested;
use crate::types::{
    AacProfile, ChannelLayout, H264Profile, MediaType, PixelFormat, Rational, SampleFormat,
};

/// AAC encoders operate on 1024-sample frames unless the codec says otherwise
pub const DEFAULT_AAC_FRAME_SAMPLES: usize = 1024;

/// Byte layout of one raw input frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    /// Size of each plane, in submission order
    pub planes: Vec<usize>,
    /// Samples per channel (audio) or 1 (video)
    pub samples: usize,
    /// Presentation timestamp advance per submitted frame
    pub pts_step: i64,
}

impl FrameLayout {
    pub fn byte_len(&self) -> usize {
        self.planes.iter().sum()
    }
}

/// Behaviour a configuration must provide to drive an encoder session
pub trait StreamConfig: Clone + fmt::Debug {
    type Format: Copy + PartialEq + fmt::Debug + fmt::Display;
    type Rate: Copy + PartialEq + fmt::Debug + fmt::Display;
    type Profile: Copy + PartialEq + fmt::Debug + fmt::Display;

    const MEDIA: MediaType;

    /// Values checked against the codec's declared capabilities
    fn requested(&self) -> Requested<Self::Format, Self::Rate, Self::Profile>;

    /// Raw frame layout, given the frame size the opened codec reported
    fn frame_layout(&self, codec_frame_samples: Option<usize>) -> FrameLayout;

    fn time_base(&self) -> Rational;

    /// One-line description of the accepted configuration
    fn summary(&self) -> String;
}

/// Audio encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target bit rate in bits per second
    pub bit_rate: u64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,
    pub profile: AacProfile,
    /// Samples per channel per frame, used when the codec does not fix one
    pub frame_samples: usize,
}

impl AudioConfig {
    /// AAC-LC at 128 kbps with planar float input
    pub fn aac(sample_rate: u32, channel_layout: ChannelLayout) -> Self {
        Self {
            bit_rate: 128 * 1024,
            sample_rate,
            channel_layout,
            sample_format: SampleFormat::F32p,
            profile: AacProfile::Low,
            frame_samples: DEFAULT_AAC_FRAME_SAMPLES,
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: u64) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    pub fn with_profile(mut self, profile: AacProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_frame_samples(mut self, samples: usize) -> Self {
        self.frame_samples = samples;
        self
    }

    pub fn channels(&self) -> u16 {
        self.channel_layout.channels()
    }

    /// Raw bytes for `samples` samples per channel
    pub fn bytes_for(&self, samples: usize) -> usize {
        samples * self.channels() as usize * self.sample_format.bytes_per_sample()
    }
}

impl StreamConfig for AudioConfig {
    type Format = SampleFormat;
    type Rate = u32;
    type Profile = AacProfile;

    const MEDIA: MediaType = MediaType::Audio;

    fn requested(&self) -> Requested<SampleFormat, u32, AacProfile> {
        Requested {
            format: self.sample_format,
            rate: self.sample_rate,
            channel_layout: Some(self.channel_layout),
            profile: self.profile,
        }
    }

    fn frame_layout(&self, codec_frame_samples: Option<usize>) -> FrameLayout {
        let samples = codec_frame_samples
            .filter(|&n| n > 0)
            .unwrap_or(self.frame_samples);
        let channels = self.channels() as usize;
        let bps = self.sample_format.bytes_per_sample();
        let planes = if self.sample_format.is_planar() {
            vec![samples * bps; channels]
        } else {
            vec![samples * bps * channels]
        };
        FrameLayout {
            planes,
            samples,
            pts_step: samples as i64,
        }
    }

    fn time_base(&self) -> Rational {
        Rational::new(1, self.sample_rate as i32)
    }

    fn summary(&self) -> String {
        format!(
            "bit_rate:{}kbps sample_rate:{} sample_fmt:{} channel_layout:{} channels:{} profile:{}",
            self.bit_rate / 1024,
            self.sample_rate,
            self.sample_format,
            self.channel_layout,
            self.channels(),
            self.profile
        )
    }
}

/// Video encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Target bit rate in bits per second
    pub bit_rate: u64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub profile: H264Profile,
    /// Frames between forced keyframes
    pub gop_size: u32,
    pub max_b_frames: u32,
    pub frame_rate: Rational,
}

impl VideoConfig {
    /// Baseline H.264 at 400 kbps, I420 input, keyframe every 10 frames
    pub fn h264(width: u32, height: u32, frame_rate: Rational) -> Self {
        Self {
            bit_rate: 400 * 1024,
            width,
            height,
            frame_rate,
            pixel_format: PixelFormat::Yuv420p,
            profile: H264Profile::Baseline,
            gop_size: 10,
            max_b_frames: 0,
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: u64) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    pub fn with_profile(mut self, profile: H264Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_gop_size(mut self, frames: u32) -> Self {
        self.gop_size = frames;
        self
    }

    pub fn with_max_b_frames(mut self, frames: u32) -> Self {
        self.max_b_frames = frames;
        self
    }
}

impl StreamConfig for VideoConfig {
    type Format = PixelFormat;
    type Rate = Rational;
    type Profile = H264Profile;

    const MEDIA: MediaType = MediaType::Video;

    fn requested(&self) -> Requested<PixelFormat, Rational, H264Profile> {
        Requested {
            format: self.pixel_format,
            rate: self.frame_rate,
            channel_layout: None,
            profile: self.profile,
        }
    }

    fn frame_layout(&self, _codec_frame_samples: Option<usize>) -> FrameLayout {
        FrameLayout {
            planes: self.pixel_format.plane_sizes(self.width, self.height),
            samples: 1,
            pts_step: 1,
        }
    }

    fn time_base(&self) -> Rational {
        self.frame_rate.invert()
    }

    fn summary(&self) -> String {
        format!(
            "bit_rate:{}kbps resolution:{}x{} frame_rate:{} pixel_fmt:{} profile:{}",
            self.bit_rate / 1024,
            self.width,
            self.height,
            self.frame_rate,
            self.pixel_format,
            self.profile
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_audio_layout() {
        let config = AudioConfig::aac(44100, ChannelLayout::Stereo)
            .with_sample_format(SampleFormat::S16);
        let layout = config.frame_layout(Some(1024));
        assert_eq!(layout.planes, vec![1024 * 2 * 2]);
        assert_eq!(layout.pts_step, 1024);
        assert_eq!(layout.byte_len(), config.bytes_for(1024));
    }

    #[test]
    fn test_planar_audio_layout_has_plane_per_channel() {
        let config = AudioConfig::aac(48000, ChannelLayout::Surround5_1);
        let layout = config.frame_layout(Some(1024));
        assert_eq!(layout.planes.len(), 6);
        assert!(layout.planes.iter().all(|&p| p == 1024 * 4));
    }

    #[test]
    fn test_audio_layout_falls_back_when_codec_has_no_frame_size() {
        let config = AudioConfig::aac(48000, ChannelLayout::Mono).with_frame_samples(960);
        assert_eq!(config.frame_layout(None).samples, 960);
        assert_eq!(config.frame_layout(Some(0)).samples, 960);
    }

    #[test]
    fn test_video_layout_advances_pts_by_one() {
        let config = VideoConfig::h264(1280, 720, Rational::new(10, 1));
        let layout = config.frame_layout(None);
        assert_eq!(layout.byte_len(), 1280 * 720 * 3 / 2);
        assert_eq!(layout.pts_step, 1);
        assert_eq!(config.time_base(), Rational::new(1, 10));
    }

    #[test]
    fn test_summaries_name_every_field() {
        let audio = AudioConfig::aac(44100, ChannelLayout::Stereo).summary();
        assert!(audio.contains("sample_rate:44100"));
        assert!(audio.contains("profile:LC"));
        assert!(audio.contains("channels:2"));

        let video = VideoConfig::h264(640, 480, Rational::new(30, 1)).summary();
        assert!(video.contains("640x480"));
        assert!(video.contains("yuv420p"));
    }
}
