//! Synthetic raw frames for exercising sessions without hardware
//!
//! Audio is a 440 Hz sine at 0.3 amplitude, continuous across frames.
//! Video is a moving gradient, so consecutive frames differ.

use crate::capture::{write_samples, CaptureFeed};
use crate::errors::Result;
use crate::stream::{AudioConfig, VideoConfig};
use crate::types::PixelFormat;

const TONE_HZ: f64 = 440.0;
const TONE_AMPLITUDE: f64 = 0.3;

/// Interleaved float samples for frame `frame_number`, every channel equal
pub fn sine_samples(frame_number: u64, samples: usize, channels: usize, sample_rate: u32) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples * channels);
    for i in 0..samples {
        let t = (frame_number as f64 * samples as f64 + i as f64) / sample_rate as f64;
        let value = ((2.0 * std::f64::consts::PI * TONE_HZ * t).sin() * TONE_AMPLITUDE) as f32;
        out.extend(std::iter::repeat(value).take(channels));
    }
    out
}

/// One raw audio frame in the config's sample format
pub fn synthetic_audio_frame(config: &AudioConfig, frame_number: u64, samples: usize) -> Result<Vec<u8>> {
    let channels = config.channels() as usize;
    let pcm = sine_samples(frame_number, samples, channels, config.sample_rate);
    let mut out = vec![0u8; config.bytes_for(samples)];
    write_samples(&pcm, channels, config.sample_format, &mut out)?;
    Ok(out)
}

/// One raw video frame in the config's pixel format
pub fn synthetic_video_frame(config: &VideoConfig, frame_number: u64) -> Vec<u8> {
    let width = config.width as usize;
    let height = config.height as usize;
    let base = (frame_number % 256) as u8;
    let planes = config.pixel_format.plane_sizes(config.width, config.height);
    let mut data = Vec::with_capacity(planes.iter().sum());

    for y in 0..height {
        for x in 0..width {
            data.push(base.wrapping_add(((x + y) % 256) as u8));
        }
    }
    match config.pixel_format {
        PixelFormat::Nv12 => {
            for i in 0..planes[1] {
                data.push(if i % 2 == 0 { 128u8.wrapping_add(base / 4) } else { 128 });
            }
        }
        _ => {
            for (plane, &size) in planes.iter().enumerate().skip(1) {
                let value = if plane == 1 { 128u8.wrapping_add(base / 4) } else { 128 };
                data.extend(std::iter::repeat(value).take(size));
            }
        }
    }
    data
}

enum Source {
    Audio(AudioConfig),
    Video(VideoConfig),
}

/// Feed producing a fixed number of synthetic frames.
///
/// Audio frames are sized from the buffer handed in, so the feed follows
/// whatever frame size the codec settled on.
pub struct SyntheticFeed {
    source: Source,
    frames: u64,
    produced: u64,
}

impl SyntheticFeed {
    pub fn audio(config: &AudioConfig, frames: u64) -> Self {
        Self {
            source: Source::Audio(config.clone()),
            frames,
            produced: 0,
        }
    }

    pub fn video(config: &VideoConfig, frames: u64) -> Self {
        Self {
            source: Source::Video(config.clone()),
            frames,
            produced: 0,
        }
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl CaptureFeed for SyntheticFeed {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        if self.produced >= self.frames {
            return Ok(false);
        }
        match &self.source {
            Source::Audio(config) => {
                let samples = frame.len() / config.bytes_for(1).max(1);
                let data = synthetic_audio_frame(config, self.produced, samples)?;
                frame.copy_from_slice(&data);
            }
            Source::Video(config) => {
                let data = synthetic_video_frame(config, self.produced);
                frame.copy_from_slice(&data);
            }
        }
        self.produced += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelLayout, Rational, SampleFormat};

    #[test]
    fn test_sine_is_continuous_across_frames() {
        let a = sine_samples(0, 1024, 1, 48000);
        let b = sine_samples(1, 1024, 1, 48000);
        let joined = sine_samples(0, 2048, 1, 48000);
        assert_eq!(&joined[..1024], &a[..]);
        // frame 1 of 1024 starts where sample 1024 of a longer run would
        assert!((joined[1024] - b[0]).abs() < 1e-6);
        assert!(a.iter().all(|s| s.abs() <= 0.3 + 1e-6));
    }

    #[test]
    fn test_audio_frame_matches_layout() {
        let config = AudioConfig::aac(44100, ChannelLayout::Stereo)
            .with_sample_format(SampleFormat::S16);
        let frame = synthetic_audio_frame(&config, 3, 1024).unwrap();
        assert_eq!(frame.len(), 1024 * 2 * 2);
    }

    #[test]
    fn test_video_frames_differ() {
        let config = VideoConfig::h264(64, 48, Rational::new(30, 1));
        let a = synthetic_video_frame(&config, 0);
        let b = synthetic_video_frame(&config, 1);
        assert_eq!(a.len(), 64 * 48 * 3 / 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_feed_stops_after_count() {
        let config = VideoConfig::h264(16, 16, Rational::new(30, 1));
        let mut feed = SyntheticFeed::video(&config, 2);
        let mut frame = vec![0u8; 16 * 16 * 3 / 2];
        assert!(feed.read_frame(&mut frame).unwrap());
        assert!(feed.read_frame(&mut frame).unwrap());
        assert!(!feed.read_frame(&mut frame).unwrap());
        assert_eq!(feed.produced(), 2);
    }
}
