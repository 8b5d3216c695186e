//! AAC-LC backend using fdk-aac
//!
//! The encoder runs with raw transport, so every packet is a bare access
//! unit; ADTS headers are added by [`AdtsFramer`](crate::adts::AdtsFramer).

use std::collections::VecDeque;

use fdk_aac::enc::{AudioObjectType, BitRate, ChannelMode, Encoder, EncoderParams, Transport};

use super::{Codec, CodecError, CodecParams, FrameRef, Packet};
use crate::negotiate::{CapabilitiesOf, CapabilityTable};
use crate::stream::{AudioConfig, DEFAULT_AAC_FRAME_SAMPLES};
use crate::types::{AacProfile, ChannelLayout, SampleFormat};

/// Worst case AAC access unit is 6144 bits per channel
const MAX_UNIT_BYTES_PER_CHANNEL: usize = 768;

const MAX_QUEUED_UNITS: usize = 8;

const SUPPORTED_RATES: [u32; 12] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000,
];

/// fdk-aac encoder behind the [`Codec`] contract
pub struct FdkAacCodec {
    capabilities: CapabilitiesOf<AudioConfig>,
    encoder: Option<Encoder>,
    pcm: Vec<i16>,
    output: Vec<u8>,
    queue: VecDeque<Vec<u8>>,
    next_pts: i64,
    end_of_stream: bool,
}

impl FdkAacCodec {
    pub fn new() -> Self {
        let capabilities = CapabilityTable::unconstrained()
            .with_formats([SampleFormat::S16])
            .with_rates(SUPPORTED_RATES)
            .with_channel_layouts([ChannelLayout::Mono, ChannelLayout::Stereo])
            .with_profiles([AacProfile::Low]);

        Self {
            capabilities,
            encoder: None,
            pcm: Vec::new(),
            output: Vec::new(),
            queue: VecDeque::new(),
            next_pts: 0,
            end_of_stream: false,
        }
    }
}

impl Default for FdkAacCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for FdkAacCodec {
    type Config = AudioConfig;

    fn name(&self) -> &str {
        "fdk-aac"
    }

    fn capabilities(&self) -> &CapabilitiesOf<AudioConfig> {
        &self.capabilities
    }

    fn open(&mut self, config: &AudioConfig) -> Result<CodecParams, CodecError> {
        let channels = match config.channel_layout {
            ChannelLayout::Mono => ChannelMode::Mono,
            ChannelLayout::Stereo => ChannelMode::Stereo,
            other => {
                return Err(CodecError::Fatal(format!(
                    "fdk-aac cannot encode {} audio",
                    other
                )))
            }
        };
        let bit_rate = u32::try_from(config.bit_rate)
            .map_err(|_| CodecError::Fatal(format!("bit rate {} out of range", config.bit_rate)))?;

        let params = EncoderParams {
            bit_rate: BitRate::Cbr(bit_rate),
            sample_rate: config.sample_rate,
            transport: Transport::Raw,
            channels,
            audio_object_type: AudioObjectType::Mpeg4LowComplexity,
        };
        let encoder = Encoder::new(params)
            .map_err(|e| CodecError::Allocation(format!("fdk-aac encoder: {:?}", e)))?;

        self.encoder = Some(encoder);
        self.output = vec![0u8; MAX_UNIT_BYTES_PER_CHANNEL * config.channels() as usize];
        self.queue.clear();
        self.next_pts = 0;
        self.end_of_stream = false;

        Ok(CodecParams {
            frame_samples: Some(DEFAULT_AAC_FRAME_SAMPLES),
        })
    }

    fn send_frame(&mut self, frame: Option<FrameRef>) -> Result<(), CodecError> {
        if self.end_of_stream {
            return Err(CodecError::EndOfStream);
        }
        let Some(frame) = frame else {
            // The binding exposes no flush call; samples held as encoder delay are dropped
            self.end_of_stream = true;
            return Ok(());
        };
        if self.queue.len() >= MAX_QUEUED_UNITS {
            return Err(CodecError::TryAgain);
        }
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| CodecError::Fatal("encoder not opened".to_string()))?;

        self.pcm.clear();
        self.pcm.extend(
            frame
                .data()
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );

        let mut offset = 0;
        while offset < self.pcm.len() {
            let info = encoder
                .encode(&self.pcm[offset..], &mut self.output)
                .map_err(|e| CodecError::Fatal(format!("fdk-aac encode: {:?}", e)))?;
            if info.output_size > 0 {
                self.queue.push_back(self.output[..info.output_size].to_vec());
            }
            if info.input_consumed == 0 {
                break;
            }
            offset += info.input_consumed;
        }
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), CodecError> {
        match self.queue.pop_front() {
            Some(unit) => {
                let samples = DEFAULT_AAC_FRAME_SAMPLES as i64;
                packet.clear();
                packet.set_data(&unit);
                packet.set_pts(Some(self.next_pts));
                packet.set_dts(Some(self.next_pts));
                packet.set_duration(samples);
                packet.set_keyframe(true);
                self.next_pts += samples;
                Ok(())
            }
            None if self.end_of_stream => Err(CodecError::EndOfStream),
            None => Err(CodecError::TryAgain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declares_adts_compatible_capabilities() {
        let codec = FdkAacCodec::new();
        let caps = codec.capabilities();
        assert_eq!(caps.formats.as_deref(), Some(&[SampleFormat::S16][..]));
        let rates = caps.rates.as_deref().unwrap_or_default();
        assert!(rates
            .iter()
            .all(|&rate| crate::adts::sample_rate_index(rate).is_some()));
    }
}
