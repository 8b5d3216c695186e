//! Encoder lifecycle state machine
//!
//! ```text
//! open_codec ──> Opened ──allocate──> Ready ──submit──> Draining ──flush──> Flushing ──drain(EOS)──> Flushed
//!                  │                                       ▲  │                                        │
//!                  │                                       └──┘ submit / drain                         │
//!                  └──────────────────────── close (from any state, idempotent) ──────────────> Closed
//! ```
//!
//! [`EncoderSession::open`] runs `open_codec` and `allocate` back to back.
//!
//! A session owns one codec context, one reusable input frame, and one
//! reusable output packet. The frame is shared with the codec through an
//! [`Arc`]; a new submission is refused with [`EncoderError::BufferBusy`]
//! until the codec has let go of the previous one.

use std::fmt;
use std::sync::Arc;

use crate::codec::{Codec, CodecError, FrameRef, Packet, RawFrame};
use crate::errors::{EncoderError, Result};
use crate::negotiate::negotiate;
use crate::stream::{FrameLayout, StreamConfig};
use crate::types::Rational;

/// Lifecycle state of an [`EncoderSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Codec context created, buffers not yet allocated
    Opened,
    /// Accepting the first frame
    Ready,
    /// Frames submitted; packets may be pending
    Draining,
    /// End of stream signalled; remaining packets are being drained
    Flushing,
    /// All packets emitted
    Flushed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Opened => "opened",
            SessionState::Ready => "ready",
            SessionState::Draining => "draining",
            SessionState::Flushing => "flushing",
            SessionState::Flushed => "flushed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of a single [`EncoderSession::drain`] call
#[derive(Debug, PartialEq, Eq)]
pub enum Drained<'a> {
    /// A packet is ready; valid until the next session call
    Packet(&'a Packet),
    /// The codec needs another frame before it can emit more
    NeedsMoreInput,
    /// Every packet has been emitted
    EndOfStream,
}

/// How a [`EncoderSession::drain_with`] loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    NeedsMoreInput,
    EndOfStream,
}

// Fields drop in declaration order: frame, packet, then the codec context.
struct Resources<C> {
    buffers: Option<Buffers>,
    codec: C,
}

struct Buffers {
    frame: FrameRef,
    packet: Packet,
}

/// One encoder session over a codec `C`
pub struct EncoderSession<C: Codec> {
    config: C::Config,
    codec_name: String,
    layout: FrameLayout,
    resources: Option<Resources<C>>,
    state: SessionState,
    next_pts: i64,
    frames_submitted: u64,
    packets_emitted: u64,
}

impl<C: Codec> EncoderSession<C> {
    /// Negotiate `config` against the codec's capabilities, open the codec,
    /// and allocate the reusable frame and packet.
    ///
    /// Anything created before a failure is released before returning.
    pub fn open(codec: C, config: C::Config) -> Result<Self> {
        let mut session = Self::open_codec(codec, config)?;
        session.allocate()?;
        Ok(session)
    }

    /// Negotiate and open the codec without allocating any buffers. The
    /// session stays [`Opened`](SessionState::Opened) until
    /// [`allocate`](Self::allocate).
    pub fn open_codec(mut codec: C, config: C::Config) -> Result<Self> {
        let codec_name = codec.name().to_string();
        let config = negotiate(&codec_name, config, codec.capabilities())?.into_inner();

        let params = codec.open(&config).map_err(|e| match e {
            CodecError::Allocation(msg) => EncoderError::Allocation(msg),
            other => EncoderError::Encoding(format!("could not open {}: {}", codec_name, other)),
        })?;

        let layout = config.frame_layout(params.frame_samples);
        if layout.samples == 0 || layout.pts_step <= 0 || layout.byte_len() == 0 {
            return Err(EncoderError::Config(format!(
                "{} frame layout is empty: {} samples, {} bytes per frame",
                codec_name,
                layout.samples,
                layout.byte_len()
            )));
        }
        log::debug!("{} {}", codec_name, SessionState::Opened);

        Ok(Self {
            config,
            codec_name,
            layout,
            resources: Some(Resources {
                buffers: None,
                codec,
            }),
            state: SessionState::Opened,
            next_pts: 0,
            frames_submitted: 0,
            packets_emitted: 0,
        })
    }

    /// Allocate the reusable input frame and output packet
    pub fn allocate(&mut self) -> Result<()> {
        let state = self.state;
        let Some(resources) = self.resources.as_mut() else {
            return Err(EncoderError::Closed);
        };
        if state != SessionState::Opened {
            return Err(EncoderError::InvalidState {
                operation: "allocate",
                state,
            });
        }

        let packet = Packet::with_capacity(self.layout.byte_len())?;
        let frame = Arc::new(RawFrame::allocate(&self.layout)?);
        resources.buffers = Some(Buffers { frame, packet });
        self.state = SessionState::Ready;

        log::debug!(
            "{} {}: {} bytes per frame in {} plane(s), pts step {}",
            self.codec_name,
            SessionState::Ready,
            self.layout.byte_len(),
            self.layout.planes.len(),
            self.layout.pts_step
        );
        Ok(())
    }

    /// Copy one raw frame into the reusable buffer, stamp it, and hand it to
    /// the codec.
    ///
    /// The timestamp advances only when the codec accepts the frame, so a
    /// frame refused with a recoverable error can be resubmitted unchanged.
    pub fn submit(&mut self, raw: &[u8]) -> Result<()> {
        let state = self.state;
        let Some(resources) = self.resources.as_mut() else {
            return Err(EncoderError::Closed);
        };
        if !matches!(state, SessionState::Ready | SessionState::Draining) {
            return Err(EncoderError::InvalidState {
                operation: "submit",
                state,
            });
        }

        let expected = self.layout.byte_len();
        if raw.len() != expected {
            return Err(EncoderError::FrameSize {
                expected,
                actual: raw.len(),
            });
        }

        let Some(buffers) = resources.buffers.as_mut() else {
            return Err(EncoderError::InvalidState {
                operation: "submit",
                state,
            });
        };
        let frame = Arc::get_mut(&mut buffers.frame).ok_or(EncoderError::BufferBusy)?;
        frame.fill(raw, self.next_pts);

        match resources.codec.send_frame(Some(Arc::clone(&buffers.frame))) {
            Ok(()) => {
                log::trace!("{} accepted frame pts {}", self.codec_name, self.next_pts);
                self.next_pts += self.layout.pts_step;
                self.frames_submitted += 1;
                self.state = SessionState::Draining;
                Ok(())
            }
            Err(CodecError::TryAgain) => Err(EncoderError::RejectedFrame(format!(
                "{} cannot accept input until pending packets are drained",
                self.codec_name
            ))),
            Err(other) => Err(self.fail("send frame", other)),
        }
    }

    /// Pull the next packet from the codec.
    ///
    /// Once flushed, every further call reports end of stream.
    pub fn drain(&mut self) -> Result<Drained<'_>> {
        let state = self.state;
        match state {
            SessionState::Closed => return Err(EncoderError::Closed),
            SessionState::Flushed => return Ok(Drained::EndOfStream),
            SessionState::Draining | SessionState::Flushing => {}
            _ => {
                return Err(EncoderError::InvalidState {
                    operation: "drain",
                    state,
                })
            }
        }

        let status = match self.resources.as_mut() {
            Some(Resources {
                buffers: Some(buffers),
                codec,
            }) => codec.receive_packet(&mut buffers.packet),
            _ => return Err(EncoderError::Closed),
        };

        match status {
            Ok(()) => {
                self.packets_emitted += 1;
                match self.resources.as_ref().and_then(|r| r.buffers.as_ref()) {
                    Some(buffers) => Ok(Drained::Packet(&buffers.packet)),
                    None => Err(EncoderError::Closed),
                }
            }
            Err(CodecError::TryAgain) if state == SessionState::Draining => {
                Ok(Drained::NeedsMoreInput)
            }
            Err(CodecError::TryAgain) => Err(self.fail(
                "drain",
                CodecError::Fatal("codec asked for input after end of stream".to_string()),
            )),
            Err(CodecError::EndOfStream) if state == SessionState::Flushing => {
                self.state = SessionState::Flushed;
                log::info!(
                    "{} flushed: {} frames in, {} packets out",
                    self.codec_name,
                    self.frames_submitted,
                    self.packets_emitted
                );
                Ok(Drained::EndOfStream)
            }
            Err(CodecError::EndOfStream) => Err(self.fail(
                "drain",
                CodecError::Fatal("codec ended the stream before flush".to_string()),
            )),
            Err(other) => Err(self.fail("drain", other)),
        }
    }

    /// Drain until the codec needs input or the stream ends, handing each
    /// packet to `on_packet`.
    pub fn drain_with<F>(&mut self, mut on_packet: F) -> Result<DrainStatus>
    where
        F: FnMut(&Packet) -> Result<()>,
    {
        loop {
            match self.drain()? {
                Drained::Packet(packet) => on_packet(packet)?,
                Drained::NeedsMoreInput => return Ok(DrainStatus::NeedsMoreInput),
                Drained::EndOfStream => return Ok(DrainStatus::EndOfStream),
            }
        }
    }

    /// Signal end of stream to the codec
    pub fn flush(&mut self) -> Result<()> {
        let state = self.state;
        let Some(resources) = self.resources.as_mut() else {
            return Err(EncoderError::Closed);
        };
        if !matches!(state, SessionState::Ready | SessionState::Draining) {
            return Err(EncoderError::InvalidState {
                operation: "flush",
                state,
            });
        }

        match resources.codec.send_frame(None) {
            Ok(()) | Err(CodecError::EndOfStream) => {
                log::debug!("{} {}", self.codec_name, SessionState::Flushing);
                self.state = SessionState::Flushing;
                Ok(())
            }
            Err(CodecError::TryAgain) => Err(EncoderError::RejectedFrame(format!(
                "{} cannot accept end of stream until pending packets are drained",
                self.codec_name
            ))),
            Err(other) => Err(self.fail("flush", other)),
        }
    }

    /// Release the frame, the packet, and the codec context, in that order.
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(resources) = self.resources.take() {
            drop(resources);
            log::debug!(
                "{} closed after {} frames and {} packets",
                self.codec_name,
                self.frames_submitted,
                self.packets_emitted
            );
        }
        self.state = SessionState::Closed;
    }

    fn fail(&mut self, operation: &str, error: CodecError) -> EncoderError {
        log::error!("{} {} failed: {}", self.codec_name, operation, error);
        self.close();
        match error {
            CodecError::Allocation(msg) => EncoderError::Allocation(msg),
            other => EncoderError::Encoding(format!("{}: {}", operation, other)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.resources.is_none()
    }

    pub fn config(&self) -> &C::Config {
        &self.config
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// The codec, while the session is open
    pub fn codec(&self) -> Option<&C> {
        self.resources.as_ref().map(|r| &r.codec)
    }

    pub fn frame_layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Bytes [`submit`](Self::submit) expects per frame
    pub fn frame_len(&self) -> usize {
        self.layout.byte_len()
    }

    /// Samples per channel per frame (1 for video)
    pub fn frame_samples(&self) -> usize {
        self.layout.samples
    }

    pub fn time_base(&self) -> Rational {
        self.config.time_base()
    }

    /// Timestamp the next accepted frame will carry
    pub fn next_pts(&self) -> i64 {
        self.next_pts
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn packets_emitted(&self) -> u64 {
        self.packets_emitted
    }
}

impl<C: Codec> Drop for EncoderSession<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Codec> fmt::Debug for EncoderSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderSession")
            .field("codec", &self.codec_name)
            .field("state", &self.state)
            .field("next_pts", &self.next_pts)
            .field("frames_submitted", &self.frames_submitted)
            .field("packets_emitted", &self.packets_emitted)
            .finish()
    }
}
