//! Testing utilities for capenc
//!
//! A scriptable codec plus synthetic audio and video, so sessions and
//! pipelines can be exercised offline without encoder libraries or
//! capture hardware.

pub mod codec;
pub mod synthetic_data;

pub use codec::{decode_payload, SyntheticBehavior, SyntheticCodec, SyntheticStats};
pub use synthetic_data::{
    sine_samples, synthetic_audio_frame, synthetic_video_frame, SyntheticFeed,
};
