//! ADTS framing for raw AAC access units
//!
//! Every AAC packet is prefixed with a 7-byte header (MPEG-4, layer 0, no
//! CRC) carrying the sampling frequency index, channel configuration, and
//! the total frame length, so that the stream decodes without a container.
//!
//! ```text
//! byte 0   1111 1111                 sync
//! byte 1   1111 0001                 sync, MPEG-4, layer 00, protection absent
//! byte 2   PPSS SS0C                 profile, frequency index, channel cfg msb
//! byte 3   CC00 00LL                 channel cfg low bits, frame length [12:11]
//! byte 4   LLLL LLLL                 frame length [10:3]
//! byte 5   LLLF FFFF                 frame length [2:0], buffer fullness [10:6]
//! byte 6   FFFF FF00                 buffer fullness [5:0], one raw data block
//! ```

use thiserror::Error;

use crate::stream::AudioConfig;
use crate::types::AacProfile;

/// Length of a header without CRC
pub const HEADER_LEN: usize = 7;

/// Largest value representable in the 13-bit frame length field
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// Largest payload that still fits the frame length field
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN;

/// Sampling frequencies indexed by their 4-bit ADTS code
pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

const VBR_FULLNESS: u16 = 0x7FF;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdtsError {
    #[error("sample rate {0} Hz has no ADTS sampling frequency index")]
    UnsupportedSampleRate(u32),

    #[error("channel configuration {0} is outside 1..=7")]
    InvalidChannelConfig(u8),

    #[error("payload of {0} bytes does not fit the 13-bit frame length (max {})", MAX_PAYLOAD_LEN)]
    PayloadTooLarge(usize),

    #[error("missing ADTS sync word")]
    BadSync,

    #[error("reserved sampling frequency index {0}")]
    ReservedSampleRateIndex(u8),

    #[error("truncated ADTS frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("frame length {0} is shorter than its header")]
    InvalidFrameLength(usize),
}

/// Whether the header advertises a variable bitrate stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitstreamMode {
    /// Buffer fullness 0
    #[default]
    Fixed,
    /// Buffer fullness 0x7FF, the VBR marker
    Variable,
}

/// Sampling frequency index for a rate, `None` if ADTS cannot express it
pub fn sample_rate_index(sample_rate: u32) -> Option<u8> {
    SAMPLE_RATES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|index| index as u8)
}

/// A complete 7-byte ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader([u8; HEADER_LEN]);

impl AdtsHeader {
    /// Build the header for one AAC packet of `payload_len` bytes.
    ///
    /// `channel_config` is the MPEG-4 channel configuration (1..=6 equal the
    /// channel count, 7 is 7.1).
    pub fn new(
        sample_rate: u32,
        channel_config: u8,
        profile: AacProfile,
        payload_len: usize,
        mode: BitstreamMode,
    ) -> Result<Self, AdtsError> {
        let freq_index =
            sample_rate_index(sample_rate).ok_or(AdtsError::UnsupportedSampleRate(sample_rate))?;
        if !(1..=7).contains(&channel_config) {
            return Err(AdtsError::InvalidChannelConfig(channel_config));
        }
        Self::build(
            profile.adts_object_type(),
            freq_index,
            channel_config,
            payload_len,
            mode,
        )
    }

    fn build(
        object_type: u8,
        freq_index: u8,
        channel_config: u8,
        payload_len: usize,
        mode: BitstreamMode,
    ) -> Result<Self, AdtsError> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(AdtsError::PayloadTooLarge(payload_len));
        }
        let frame_len = payload_len + HEADER_LEN;
        let fill = match mode {
            BitstreamMode::Fixed => 0x00,
            BitstreamMode::Variable => 0x1F,
        };
        let last = match mode {
            BitstreamMode::Fixed => 0x00,
            BitstreamMode::Variable => 0xFC,
        };

        Ok(Self([
            0xFF,
            0xF1,
            (object_type << 6) | (freq_index << 2) | (channel_config >> 2),
            ((channel_config & 0b11) << 6) | (frame_len >> 11) as u8,
            ((frame_len & 0x7FF) >> 3) as u8,
            (((frame_len & 0b111) as u8) << 5) | fill,
            last,
        ]))
    }

    pub fn as_bytes(&self) -> &[u8; HEADER_LEN] {
        &self.0
    }

    /// Decode the fixed and variable header fields from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<AdtsFrameInfo, AdtsError> {
        if bytes.len() < HEADER_LEN {
            return Err(AdtsError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }
        if bytes[0] != 0xFF || bytes[1] & 0xF0 != 0xF0 {
            return Err(AdtsError::BadSync);
        }

        let protection_absent = bytes[1] & 0x01 == 1;
        let header_len = if protection_absent { HEADER_LEN } else { HEADER_LEN + 2 };

        let freq_index = (bytes[2] >> 2) & 0x0F;
        let sample_rate = *SAMPLE_RATES
            .get(freq_index as usize)
            .ok_or(AdtsError::ReservedSampleRateIndex(freq_index))?;

        let frame_len = (((bytes[3] & 0b11) as usize) << 11)
            | ((bytes[4] as usize) << 3)
            | ((bytes[5] >> 5) as usize);
        if frame_len < header_len {
            return Err(AdtsError::InvalidFrameLength(frame_len));
        }

        Ok(AdtsFrameInfo {
            mpeg2: (bytes[1] >> 3) & 0x01 == 1,
            object_type: bytes[2] >> 6,
            sample_rate_index: freq_index,
            sample_rate,
            channel_config: ((bytes[2] & 0x01) << 2) | (bytes[3] >> 6),
            frame_len,
            header_len,
            buffer_fullness: (((bytes[5] & 0x1F) as u16) << 6) | (bytes[6] >> 2) as u16,
            raw_data_blocks: (bytes[6] & 0b11) + 1,
        })
    }
}

impl AsRef<[u8]> for AdtsHeader {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Fields recovered from an ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsFrameInfo {
    pub mpeg2: bool,
    /// Two-bit profile code (audio object type minus one)
    pub object_type: u8,
    pub sample_rate_index: u8,
    pub sample_rate: u32,
    pub channel_config: u8,
    /// Header plus payload
    pub frame_len: usize,
    pub header_len: usize,
    pub buffer_fullness: u16,
    pub raw_data_blocks: u8,
}

impl AdtsFrameInfo {
    pub fn payload_len(&self) -> usize {
        self.frame_len - self.header_len
    }

    pub fn profile(&self) -> Option<AacProfile> {
        AacProfile::from_adts_object_type(self.object_type)
    }

    pub fn mode(&self) -> BitstreamMode {
        if self.buffer_fullness == VBR_FULLNESS {
            BitstreamMode::Variable
        } else {
            BitstreamMode::Fixed
        }
    }
}

/// Per-stream header generator.
///
/// Validates the sample rate and channel configuration once, so each packet
/// only has its length checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsFramer {
    object_type: u8,
    freq_index: u8,
    channel_config: u8,
    mode: BitstreamMode,
}

impl AdtsFramer {
    pub fn new(
        sample_rate: u32,
        channel_config: u8,
        profile: AacProfile,
        mode: BitstreamMode,
    ) -> Result<Self, AdtsError> {
        // Reuse the header validation with an empty payload.
        AdtsHeader::new(sample_rate, channel_config, profile, 0, mode)?;
        Ok(Self {
            object_type: profile.adts_object_type(),
            freq_index: sample_rate_index(sample_rate)
                .ok_or(AdtsError::UnsupportedSampleRate(sample_rate))?,
            channel_config,
            mode,
        })
    }

    /// Framer matching an audio stream configuration
    pub fn for_config(config: &AudioConfig, mode: BitstreamMode) -> Result<Self, AdtsError> {
        let layout = config.channel_layout;
        let channel_config = layout
            .adts_channel_config()
            .ok_or(AdtsError::InvalidChannelConfig(layout.channels().min(255) as u8))?;
        Self::new(config.sample_rate, channel_config, config.profile, mode)
    }

    pub fn header(&self, payload_len: usize) -> Result<AdtsHeader, AdtsError> {
        AdtsHeader::build(
            self.object_type,
            self.freq_index,
            self.channel_config,
            payload_len,
            self.mode,
        )
    }

    pub fn mode(&self) -> BitstreamMode {
        self.mode
    }
}

/// Splits an ADTS byte stream into `(header fields, payload)` pairs.
///
/// Iteration stops after the first malformed frame.
pub struct AdtsFrames<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> AdtsFrames<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            failed: false,
        }
    }
}

impl<'a> Iterator for AdtsFrames<'a> {
    type Item = Result<(AdtsFrameInfo, &'a [u8]), AdtsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }

        let info = match AdtsHeader::parse(self.data) {
            Ok(info) => info,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        if self.data.len() < info.frame_len {
            self.failed = true;
            return Some(Err(AdtsError::Truncated {
                needed: info.frame_len,
                available: self.data.len(),
            }));
        }

        let (frame, rest) = self.data.split_at(info.frame_len);
        self.data = rest;
        Some(Ok((info, &frame[info.header_len..])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_44100_lc_variable_vector() {
        let header =
            AdtsHeader::new(44100, 2, AacProfile::Low, 200, BitstreamMode::Variable).unwrap();
        assert_eq!(
            header.as_bytes(),
            &[0xFF, 0xF1, 0x50, 0x80, 0x19, 0xFF, 0xFC]
        );
    }

    #[test]
    fn test_stereo_44100_lc_fixed_vector() {
        let header = AdtsHeader::new(44100, 2, AacProfile::Low, 200, BitstreamMode::Fixed).unwrap();
        assert_eq!(
            header.as_bytes(),
            &[0xFF, 0xF1, 0x50, 0x80, 0x19, 0xE0, 0x00]
        );
    }

    #[test]
    fn test_mono_48000_header() {
        let header = AdtsHeader::new(48000, 1, AacProfile::Low, 0, BitstreamMode::Fixed).unwrap();
        // frame length 7: 0b0_0000_0000_0111
        assert_eq!(
            header.as_bytes(),
            &[0xFF, 0xF1, 0x4C, 0x40, 0x00, 0xE0, 0x00]
        );
    }

    #[test]
    fn test_channel_config_seven_sets_high_bit_in_byte_two() {
        let header = AdtsHeader::new(48000, 7, AacProfile::Main, 10, BitstreamMode::Fixed).unwrap();
        let bytes = header.as_bytes();
        assert_eq!(bytes[2] & 0x01, 1);
        assert_eq!(bytes[3] >> 6, 0b11);
        assert_eq!(bytes[2] >> 6, 0);
    }

    #[test]
    fn test_max_payload_fills_frame_length() {
        let header =
            AdtsHeader::new(44100, 2, AacProfile::Low, MAX_PAYLOAD_LEN, BitstreamMode::Fixed)
                .unwrap();
        let info = AdtsHeader::parse(header.as_bytes()).unwrap();
        assert_eq!(info.frame_len, MAX_FRAME_LEN);
        assert_eq!(MAX_PAYLOAD_LEN, 8184);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let err = AdtsHeader::new(
            44100,
            2,
            AacProfile::Low,
            MAX_PAYLOAD_LEN + 1,
            BitstreamMode::Fixed,
        )
        .unwrap_err();
        assert_eq!(err, AdtsError::PayloadTooLarge(8185));
    }

    #[test]
    fn test_unknown_sample_rate_rejected() {
        let err = AdtsHeader::new(44000, 2, AacProfile::Low, 10, BitstreamMode::Fixed).unwrap_err();
        assert_eq!(err, AdtsError::UnsupportedSampleRate(44000));
    }

    #[test]
    fn test_invalid_channel_config_rejected() {
        for config in [0u8, 8, 255] {
            let err =
                AdtsHeader::new(44100, config, AacProfile::Low, 10, BitstreamMode::Fixed).unwrap_err();
            assert_eq!(err, AdtsError::InvalidChannelConfig(config));
        }
    }

    #[test]
    fn test_sample_rate_table() {
        assert_eq!(sample_rate_index(96000), Some(0));
        assert_eq!(sample_rate_index(44100), Some(4));
        assert_eq!(sample_rate_index(7350), Some(12));
        assert_eq!(sample_rate_index(0), None);
    }

    #[test]
    fn test_parse_recovers_fields() {
        let header =
            AdtsHeader::new(22050, 6, AacProfile::Ltp, 1234, BitstreamMode::Variable).unwrap();
        let info = AdtsHeader::parse(header.as_bytes()).unwrap();
        assert_eq!(info.sample_rate, 22050);
        assert_eq!(info.sample_rate_index, 7);
        assert_eq!(info.channel_config, 6);
        assert_eq!(info.profile(), Some(AacProfile::Ltp));
        assert_eq!(info.payload_len(), 1234);
        assert_eq!(info.mode(), BitstreamMode::Variable);
        assert_eq!(info.raw_data_blocks, 1);
        assert!(!info.mpeg2);
    }

    #[test]
    fn test_parse_rejects_bad_sync() {
        assert_eq!(
            AdtsHeader::parse(&[0xFF, 0xE1, 0, 0, 0, 0, 0]),
            Err(AdtsError::BadSync)
        );
        assert!(matches!(
            AdtsHeader::parse(&[0xFF, 0xF1]),
            Err(AdtsError::Truncated { needed: 7, available: 2 })
        ));
    }

    #[test]
    fn test_framer_matches_one_shot_header() {
        let framer = AdtsFramer::new(32000, 2, AacProfile::Low, BitstreamMode::Variable).unwrap();
        for len in [0usize, 1, 371, 4096] {
            assert_eq!(
                framer.header(len).unwrap(),
                AdtsHeader::new(32000, 2, AacProfile::Low, len, BitstreamMode::Variable).unwrap()
            );
        }
    }

    #[test]
    fn test_frames_iterator_splits_stream() {
        let framer = AdtsFramer::new(44100, 2, AacProfile::Low, BitstreamMode::Fixed).unwrap();
        let mut stream = Vec::new();
        for payload in [&b"abc"[..], &b""[..], &b"hello adts"[..]] {
            stream.extend_from_slice(framer.header(payload.len()).unwrap().as_bytes());
            stream.extend_from_slice(payload);
        }

        let payloads: Vec<&[u8]> = AdtsFrames::new(&stream)
            .map(|frame| frame.unwrap().1)
            .collect();
        assert_eq!(payloads, vec![&b"abc"[..], &b""[..], &b"hello adts"[..]]);
    }

    #[test]
    fn test_frames_iterator_reports_truncation_once() {
        let framer = AdtsFramer::new(44100, 2, AacProfile::Low, BitstreamMode::Fixed).unwrap();
        let mut stream = framer.header(20).unwrap().as_bytes().to_vec();
        stream.extend_from_slice(&[0u8; 5]);

        let results: Vec<_> = AdtsFrames::new(&stream).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(AdtsError::Truncated { needed: 27, .. })));
    }
}
