//! Capture-to-stream plumbing
//!
//! [`encode_stream`] runs a session to completion: read a frame, submit it,
//! drain every ready packet into a [`PacketSink`], then flush and drain to
//! end of stream. [`CaptureThread`] moves a blocking capture source onto its
//! own thread behind a bounded channel.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, TrySendError};
use serde::{Deserialize, Serialize};

use crate::adts::AdtsFramer;
use crate::capture::CaptureFeed;
use crate::codec::{Codec, Packet};
use crate::errors::{EncoderError, Result};
use crate::session::{DrainStatus, EncoderSession, SessionState};

/// Destination for encoded packets
pub trait PacketSink {
    fn write_packet(&mut self, packet: &Packet) -> Result<()>;

    /// Called once after the last packet
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        (**self).write_packet(packet)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Collects packets in memory
impl PacketSink for Vec<Packet> {
    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.push(packet.clone());
        Ok(())
    }
}

/// Writes each AAC packet behind its ADTS header
pub struct AdtsWriter<W: Write> {
    inner: W,
    framer: AdtsFramer,
    frames_written: u64,
}

impl<W: Write> AdtsWriter<W> {
    pub fn new(inner: W, framer: AdtsFramer) -> Self {
        Self {
            inner,
            framer,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> PacketSink for AdtsWriter<W> {
    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let header = self.framer.header(packet.len())?;
        self.inner.write_all(header.as_bytes())?;
        self.inner.write_all(packet.data())?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Writes packets back to back, e.g. an Annex B H.264 stream
pub struct ElementaryStreamWriter<W: Write> {
    inner: W,
}

impl<W: Write> ElementaryStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> PacketSink for ElementaryStreamWriter<W> {
    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.inner.write_all(packet.data())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Totals for one [`encode_stream`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub frames: u64,
    pub packets: u64,
    /// Encoded payload bytes, excluding any framing
    pub bytes: u64,
    pub first_pts: Option<i64>,
    pub last_pts: Option<i64>,
}

impl StreamStats {
    fn record(&mut self, packet: &Packet) {
        self.packets += 1;
        self.bytes += packet.len() as u64;
        if let Some(pts) = packet.pts() {
            self.first_pts.get_or_insert(pts);
            self.last_pts = Some(pts);
        }
    }
}

/// Encode everything `feed` produces and write it to `sink`.
///
/// A frame refused with a recoverable error is retried once after the
/// pending packets have been drained.
pub fn encode_stream<C, F, S>(
    session: &mut EncoderSession<C>,
    feed: &mut F,
    sink: &mut S,
) -> Result<StreamStats>
where
    C: Codec,
    F: CaptureFeed + ?Sized,
    S: PacketSink + ?Sized,
{
    let mut stats = StreamStats::default();
    let mut frame = vec![0u8; session.frame_len()];

    while feed.read_frame(&mut frame)? {
        match session.submit(&frame) {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                log::debug!("{}; draining before resubmitting", e);
                if session.state() == SessionState::Draining {
                    drain_into(session, sink, &mut stats)?;
                }
                session.submit(&frame)?;
            }
            Err(e) => return Err(e),
        }
        stats.frames += 1;
        drain_into(session, sink, &mut stats)?;
    }

    session.flush()?;
    while drain_into(session, sink, &mut stats)? != DrainStatus::EndOfStream {}
    sink.finish()?;

    log::info!(
        "{} encoded {} frames into {} packets ({} bytes)",
        session.codec_name(),
        stats.frames,
        stats.packets,
        stats.bytes
    );
    Ok(stats)
}

fn drain_into<C, S>(
    session: &mut EncoderSession<C>,
    sink: &mut S,
    stats: &mut StreamStats,
) -> Result<DrainStatus>
where
    C: Codec,
    S: PacketSink + ?Sized,
{
    session.drain_with(|packet| {
        stats.record(packet);
        sink.write_packet(packet)
    })
}

/// What a capture thread does when the encoder falls behind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for room in the queue
    #[default]
    Block,
    /// Discard the frame just captured
    DropNewest,
}

/// A capture source running on its own thread.
///
/// Frames travel through a bounded queue to any number of [`ChannelFeed`]s.
/// A capture error is queued behind the frames captured before it, so the
/// consumer sees it in order.
pub struct CaptureThread {
    receiver: Receiver<Result<Vec<u8>>>,
    handle: Option<JoinHandle<Result<u64>>>,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    consumers: Arc<()>,
}

impl CaptureThread {
    /// Start reading `frame_len`-byte frames from `feed` into a queue of
    /// `capacity` frames.
    pub fn spawn<F>(
        name: &str,
        feed: F,
        frame_len: usize,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Result<Self>
    where
        F: CaptureFeed + Send + 'static,
    {
        Self::spawn_with(name, move || Ok(feed), frame_len, capacity, policy)
    }

    /// Like [`spawn`](Self::spawn), but the source is created on the capture
    /// thread by `open`. Device handles that cannot cross threads go here.
    pub fn spawn_with<O, F>(
        name: &str,
        open: O,
        frame_len: usize,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Result<Self>
    where
        O: FnOnce() -> Result<F> + Send + 'static,
        F: CaptureFeed + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));
        let thread_stop = Arc::clone(&stop);
        let thread_dropped = Arc::clone(&dropped);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || -> Result<u64> {
                let mut captured = 0u64;
                let outcome = open().and_then(|mut feed| {
                    while !thread_stop.load(Ordering::Relaxed) {
                        let mut frame = vec![0u8; frame_len];
                        if !feed.read_frame(&mut frame)? {
                            break;
                        }
                        captured += 1;
                        match policy {
                            OverflowPolicy::Block => {
                                if sender.send(Ok(frame)).is_err() {
                                    break;
                                }
                            }
                            OverflowPolicy::DropNewest => match sender.try_send(Ok(frame)) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    let total = thread_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                                    log::warn!(
                                        "{}: encoder behind, dropped {} frame(s)",
                                        thread_name,
                                        total
                                    );
                                }
                                Err(TrySendError::Disconnected(_)) => break,
                            },
                        }
                    }
                    Ok(())
                });

                match outcome {
                    Ok(()) => {
                        log::debug!("{}: capture finished after {} frames", thread_name, captured);
                        Ok(captured)
                    }
                    Err(e) => {
                        log::error!("{}: capture failed after {} frames: {}", thread_name, captured, e);
                        let message = e.to_string();
                        let _ = sender.send(Err(e));
                        Err(EncoderError::Capture(message))
                    }
                }
            })
            .map_err(|e| EncoderError::Capture(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            receiver,
            handle: Some(handle),
            stop,
            dropped,
            consumers: Arc::new(()),
        })
    }

    /// Consumer side of the queue; ends once the capture thread exits
    pub fn feed(&self) -> ChannelFeed {
        ChannelFeed {
            receiver: self.receiver.clone(),
            _consumer: Arc::clone(&self.consumers),
        }
    }

    /// Ask the capture thread to stop after its current frame
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait for the capture thread and return how many frames it captured.
    ///
    /// With no [`ChannelFeed`] left to read the queue, the thread is told to
    /// stop first.
    pub fn join(mut self) -> Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<u64> {
        let Some(handle) = self.handle.take() else {
            return Ok(0);
        };
        while !handle.is_finished() {
            if Arc::strong_count(&self.consumers) == 1 {
                self.stop();
            }
            // A blocked producer needs room in the queue to notice the stop flag
            if self.stop.load(Ordering::Relaxed) {
                while self.receiver.try_recv().is_ok() {}
            }
            thread::sleep(Duration::from_millis(1));
        }
        handle
            .join()
            .map_err(|_| EncoderError::Capture("capture thread panicked".to_string()))?
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.shutdown() {
            log::warn!("capture thread ended with error: {}", e);
        }
    }
}

/// [`CaptureFeed`] over a [`CaptureThread`] queue
pub struct ChannelFeed {
    receiver: Receiver<Result<Vec<u8>>>,
    _consumer: Arc<()>,
}

impl CaptureFeed for ChannelFeed {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        match self.receiver.recv() {
            Ok(Ok(captured)) => {
                if captured.len() != frame.len() {
                    return Err(EncoderError::FrameSize {
                        expected: frame.len(),
                        actual: captured.len(),
                    });
                }
                frame.copy_from_slice(&captured);
                Ok(true)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }
}
