//! capenc: capture-to-elementary-stream encoding
//!
//! Raw audio or video frames go in, encoded packets come out. The crate
//! drives any codec implementing [`Codec`] through a checked lifecycle
//! ([`EncoderSession`]), refuses configurations the codec does not declare
//! support for ([`negotiate`]), and frames raw AAC access units as ADTS
//! ([`adts`]).
//!
//! # Features
//! - `aac`: AAC-LC encoding through fdk-aac
//! - `h264`: H.264 encoding through openh264
//! - `capture`: live sound card input through cpal
//! - `camera`: live YUYV camera input through nokhwa
//!
//! # Usage
//! ```rust,ignore
//! use capenc::{AudioConfig, ChannelLayout, EncoderSession, SampleFormat};
//! use capenc::codec::aac::FdkAacCodec;
//!
//! let config = AudioConfig::aac(44100, ChannelLayout::Stereo)
//!     .with_sample_format(SampleFormat::S16);
//! let mut session = EncoderSession::open(FdkAacCodec::new(), config)?;
//! session.submit(&pcm)?;
//! while let capenc::Drained::Packet(packet) = session.drain()? {
//!     // write packet.data()
//! }
//! ```

pub mod adts;
pub mod capture;
pub mod codec;
pub mod config;
pub mod errors;
pub mod negotiate;
pub mod pipeline;
pub mod session;
pub mod stream;
pub mod types;

// Testing utilities - synthetic codec and data for offline testing
pub mod testing;

// Re-exports for convenience
pub use adts::{AdtsFrameInfo, AdtsFramer, AdtsHeader, BitstreamMode};
pub use codec::{Codec, CodecError, CodecParams, Packet};
pub use config::EncodeConfig;
pub use errors::{EncoderError, Result};
pub use negotiate::{negotiate, CapabilityError, CapabilityTable, Dimension, Negotiated};
pub use pipeline::{encode_stream, AdtsWriter, ElementaryStreamWriter, PacketSink, StreamStats};
pub use session::{DrainStatus, Drained, EncoderSession, SessionState};
pub use stream::{AudioConfig, StreamConfig, VideoConfig};
pub use types::{
    AacProfile, ChannelLayout, H264Profile, MediaType, PixelFormat, Rational, SampleFormat,
};

/// Initialize logging, defaulting to info for this crate
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "capenc=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Encoder backends compiled into this build
pub fn backends() -> Vec<&'static str> {
    let mut backends = Vec::new();
    if cfg!(feature = "aac") {
        backends.push("fdk-aac");
    }
    if cfg!(feature = "h264") {
        backends.push("openh264");
    }
    backends
}

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        backends: backends().into_iter().map(String::from).collect(),
        sound_card_capture: cfg!(feature = "capture"),
        camera_capture: cfg!(feature = "camera"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub backends: Vec<String>,
    pub sound_card_capture: bool,
    pub camera_capture: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "capenc");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert_eq!(info.backends.len(), backends().len());
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }
}
