//! Sound card capture through cpal
//!
//! The device callback pushes interleaved f32 chunks into a bounded
//! channel; [`SoundCardFeed::read_frame`] re-chunks them into exact encoder
//! frames and converts to the session's sample format.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Stream;

use super::convert::write_samples;
use super::CaptureFeed;
use crate::errors::{EncoderError, Result};
use crate::stream::AudioConfig;
use crate::types::SampleFormat;

/// Device chunks buffered before the callback starts dropping input.
/// At 48 kHz with 10 ms callbacks this is roughly 2.5 seconds.
const MAX_BUFFER_CHUNKS: usize = 256;

/// How long a read waits for the device before giving up
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Live microphone / line-in capture
pub struct SoundCardFeed {
    stream: Option<Stream>,
    receiver: crossbeam_channel::Receiver<Vec<f32>>,
    is_running: Arc<AtomicBool>,
    dropped_chunks: Arc<AtomicU64>,
    pending: Vec<f32>,
    channels: usize,
    sample_format: SampleFormat,
    device_name: String,
}

impl SoundCardFeed {
    /// Open the named input device, or the system default for `None`.
    ///
    /// The device is opened at the session's sample rate and channel count;
    /// capture starts on [`start`](Self::start).
    pub fn open(device_name: Option<&str>, config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            None | Some("") | Some("default") => host
                .default_input_device()
                .ok_or_else(|| EncoderError::Capture("no default input device".to_string()))?,
            Some(name) => host
                .input_devices()
                .map_err(|e| EncoderError::Capture(format!("failed to enumerate devices: {}", e)))?
                .find(|d| d.name().ok().as_deref() == Some(name))
                .ok_or_else(|| EncoderError::Capture(format!("device not found: {}", name)))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let stream_config = cpal::StreamConfig {
            channels: config.channels(),
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = crossbeam_channel::bounded(MAX_BUFFER_CHUNKS);
        let is_running = Arc::new(AtomicBool::new(false));
        let dropped_chunks = Arc::new(AtomicU64::new(0));
        let running = Arc::clone(&is_running);
        let dropped = Arc::clone(&dropped_chunks);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    // Never block the device callback
                    if sender.try_send(data.to_vec()).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    log::error!("audio capture error: {}", err);
                },
                None,
            )
            .map_err(|e| EncoderError::Capture(format!("failed to build input stream: {}", e)))?;

        log::info!(
            "opened input device {}: {} Hz, {} channel(s)",
            device_name,
            config.sample_rate,
            config.channels()
        );

        Ok(Self {
            stream: Some(stream),
            receiver,
            is_running,
            dropped_chunks,
            pending: Vec::new(),
            channels: config.channels() as usize,
            sample_format: config.sample_format,
            device_name,
        })
    }

    /// Start capturing (idempotent)
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| EncoderError::Capture(format!("failed to start stream: {}", e)))?;
            self.is_running.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Stop capturing (idempotent). Buffered input can still be read.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| EncoderError::Capture(format!("failed to stop stream: {}", e)))?;
            self.is_running.store(false, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Device chunks lost because the consumer fell behind
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl CaptureFeed for SoundCardFeed {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        let wanted = frame.len() / self.sample_format.bytes_per_sample();
        while self.pending.len() < wanted {
            if !self.is_running() && self.receiver.is_empty() {
                return Ok(false);
            }
            match self.receiver.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    return Err(EncoderError::Capture(format!(
                        "no audio from {} for {:?}",
                        self.device_name, READ_TIMEOUT
                    )))
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return Ok(false),
            }
        }

        write_samples(
            &self.pending[..wanted],
            self.channels,
            self.sample_format,
            frame,
        )?;
        self.pending.drain(..wanted);
        Ok(true)
    }
}

impl Drop for SoundCardFeed {
    fn drop(&mut self) {
        let _ = self.stop();
        self.stream = None;
    }
}
