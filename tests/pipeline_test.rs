//! End-to-end pipeline tests: feed -> session -> sink
//!
//! Uses the synthetic codec, so no encoder libraries are needed.
//!
//! Run with: cargo test --test pipeline_test

use std::cell::Cell;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, ErrorKind};
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use capenc::adts::AdtsFrames;
use capenc::capture::{CaptureFeed, RawReader};
use capenc::pipeline::{CaptureThread, OverflowPolicy};
use capenc::testing::{
    decode_payload, synthetic_audio_frame, SyntheticBehavior, SyntheticCodec, SyntheticFeed,
};
use capenc::{
    encode_stream, AacProfile, AdtsFramer, AdtsWriter, AudioConfig, BitstreamMode, ChannelLayout,
    ElementaryStreamWriter, EncoderError, EncoderSession, Packet, PacketSink, Rational,
    SampleFormat, SessionState, VideoConfig,
};

fn mono_session(behavior: SyntheticBehavior) -> EncoderSession<SyntheticCodec<AudioConfig>> {
    let codec = SyntheticCodec::aac().with_behavior(SyntheticBehavior {
        frame_samples: Some(1024),
        ..behavior
    });
    EncoderSession::open(codec, AudioConfig::aac(48000, ChannelLayout::Mono)).unwrap()
}

#[test]
fn test_adts_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.aac");

    let mut session = mono_session(SyntheticBehavior {
        latency: 1,
        ..SyntheticBehavior::default()
    });
    let framer = AdtsFramer::for_config(session.config(), BitstreamMode::Variable).unwrap();
    let mut sink = AdtsWriter::new(BufWriter::new(File::create(&path).unwrap()), framer);
    let mut feed = SyntheticFeed::audio(session.config(), 12);

    let stats = encode_stream(&mut session, &mut feed, &mut sink).unwrap();
    drop(sink);
    assert_eq!(session.state(), SessionState::Flushed);
    assert_eq!(stats.frames, 12);

    let bytes = fs::read(&path).unwrap();
    let frames: Vec<_> = AdtsFrames::new(&bytes).collect::<Result<_, _>>().unwrap();
    assert_eq!(frames.len(), 12);
    for (i, (info, payload)) in frames.iter().enumerate() {
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.channel_config, 1);
        assert_eq!(info.profile(), Some(AacProfile::Low));
        assert_eq!(info.mode(), BitstreamMode::Variable);
        assert_eq!(decode_payload(payload), Some((i as u32, 0)));
    }
    let payload_total: usize = frames.iter().map(|(_, p)| p.len()).sum();
    assert_eq!(payload_total as u64, stats.bytes);
}

#[test]
fn test_video_elementary_stream() {
    let config = VideoConfig::h264(64, 48, Rational::new(30, 1));
    let codec = SyntheticCodec::h264().with_behavior(SyntheticBehavior {
        latency: 2,
        ..SyntheticBehavior::default()
    });
    let mut session = EncoderSession::open(codec, config).unwrap();
    let mut feed = SyntheticFeed::video(session.config(), 6);
    let mut sink = ElementaryStreamWriter::new(Vec::new());

    let stats = encode_stream(&mut session, &mut feed, &mut sink).unwrap();
    assert_eq!(stats.frames, 6);
    assert_eq!(stats.packets, 6);
    assert_eq!(stats.first_pts, Some(0));
    assert_eq!(stats.last_pts, Some(5));
    assert_eq!(sink.into_inner().len() as u64, stats.bytes);
}

#[test]
fn test_fatal_codec_error_stops_the_stream() {
    let mut session = mono_session(SyntheticBehavior {
        fail_on_send: Some(3),
        ..SyntheticBehavior::default()
    });
    let mut feed = SyntheticFeed::audio(session.config(), 10);
    let mut packets: Vec<Packet> = Vec::new();

    let err = encode_stream(&mut session, &mut feed, &mut packets).unwrap_err();
    assert!(matches!(err, EncoderError::Encoding(_)));
    assert!(session.is_closed());
    assert_eq!(packets.len(), 2);
    assert_eq!(feed.produced(), 3);
}

#[test]
fn test_raw_reader_pads_short_tail() {
    let config = AudioConfig::aac(48000, ChannelLayout::Mono).with_sample_format(SampleFormat::S16);
    let codec = SyntheticCodec::new("pcm", capenc::CapabilityTable::unconstrained())
        .with_behavior(SyntheticBehavior {
            frame_samples: Some(1024),
            ..SyntheticBehavior::default()
        });
    let mut session = EncoderSession::open(codec, config).unwrap();
    assert_eq!(session.frame_len(), 2048);

    // two and a half frames of input
    let mut feed = RawReader::new(Cursor::new(vec![7u8; 2048 * 2 + 1024]));
    let mut packets: Vec<Packet> = Vec::new();
    let stats = encode_stream(&mut session, &mut feed, &mut packets).unwrap();
    assert_eq!(stats.frames, 3);
    assert_eq!(feed.frames_read(), 3);
    let pts: Vec<_> = packets.iter().map(|p| p.pts().unwrap()).collect();
    assert_eq!(pts, vec![0, 1024, 2048]);
}

#[test]
fn test_drop_newest_keeps_the_oldest_frames() {
    let config = AudioConfig::aac(48000, ChannelLayout::Mono).with_sample_format(SampleFormat::S16);
    let frame_len = config.bytes_for(1024);
    let source = SyntheticFeed::audio(&config, 50);

    let capture = CaptureThread::spawn(
        "test-capture",
        source,
        frame_len,
        2,
        OverflowPolicy::DropNewest,
    )
    .unwrap();
    let mut feed = capture.feed();

    let deadline = Instant::now() + Duration::from_secs(10);
    while capture.dropped_frames() < 48 {
        assert!(Instant::now() < deadline, "capture thread did not finish");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(capture.join().unwrap(), 50);

    let mut frame = vec![0u8; frame_len];
    for n in 0..2 {
        assert!(feed.read_frame(&mut frame).unwrap());
        assert_eq!(frame, synthetic_audio_frame(&config, n, 1024).unwrap());
    }
    assert!(!feed.read_frame(&mut frame).unwrap());
}

#[test]
fn test_blocking_capture_thread_loses_nothing() {
    let mut session = mono_session(SyntheticBehavior {
        latency: 4,
        ..SyntheticBehavior::default()
    });
    let source = SyntheticFeed::audio(session.config(), 40);
    let capture = CaptureThread::spawn(
        "test-capture",
        source,
        session.frame_len(),
        3,
        OverflowPolicy::Block,
    )
    .unwrap();
    let mut feed = capture.feed();
    let mut packets: Vec<Packet> = Vec::new();

    let stats = encode_stream(&mut session, &mut feed, &mut packets).unwrap();
    assert_eq!(capture.dropped_frames(), 0);
    assert_eq!(capture.join().unwrap(), 40);
    assert_eq!(stats.frames, 40);

    let indices: Vec<_> = packets
        .iter()
        .map(|p| decode_payload(p.data()).unwrap().0)
        .collect();
    assert_eq!(indices, (0..40).collect::<Vec<u32>>());
    assert!(packets.windows(2).all(|w| w[0].pts() < w[1].pts()));
}

/// Yields `remaining` silent frames, then fails like an unplugged device
struct UnpluggedFeed {
    remaining: usize,
}

impl CaptureFeed for UnpluggedFeed {
    fn read_frame(&mut self, frame: &mut [u8]) -> capenc::Result<bool> {
        if self.remaining == 0 {
            return Err(EncoderError::Capture("device unplugged".to_string()));
        }
        self.remaining -= 1;
        frame.fill(0);
        Ok(true)
    }
}

/// Refuses every packet
struct FullDisk;

impl PacketSink for FullDisk {
    fn write_packet(&mut self, _packet: &Packet) -> capenc::Result<()> {
        Err(std::io::Error::new(ErrorKind::Other, "no space left on device").into())
    }
}

fn join_within(capture: CaptureThread, limit: Duration) -> capenc::Result<u64> {
    let (done_tx, done_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = done_tx.send(capture.join());
    });
    done_rx
        .recv_timeout(limit)
        .expect("CaptureThread::join did not return")
}

#[test]
fn test_join_without_a_reader_stops_blocked_capture() {
    let config = AudioConfig::aac(48000, ChannelLayout::Mono).with_sample_format(SampleFormat::S16);
    let source = SyntheticFeed::audio(&config, 50);
    let capture = CaptureThread::spawn(
        "test-capture",
        source,
        config.bytes_for(1024),
        2,
        OverflowPolicy::Block,
    )
    .unwrap();

    let captured = join_within(capture, Duration::from_secs(10)).unwrap();
    assert!(captured < 50, "captured {captured} frames with nobody reading");
}

#[test]
fn test_join_after_encoder_gave_up() {
    let mut session = mono_session(SyntheticBehavior::default());
    let source = SyntheticFeed::audio(session.config(), 50);
    let capture = CaptureThread::spawn(
        "test-capture",
        source,
        session.frame_len(),
        2,
        OverflowPolicy::Block,
    )
    .unwrap();
    let mut feed = capture.feed();

    let err = encode_stream(&mut session, &mut feed, &mut FullDisk).unwrap_err();
    assert!(matches!(err, EncoderError::Io(_)));
    drop(feed);

    let captured = join_within(capture, Duration::from_secs(10)).unwrap();
    assert!(captured < 50);
}

#[test]
fn test_capture_error_reaches_the_encoder() {
    let mut session = mono_session(SyntheticBehavior::default());
    let capture = CaptureThread::spawn(
        "test-capture",
        UnpluggedFeed { remaining: 3 },
        session.frame_len(),
        4,
        OverflowPolicy::Block,
    )
    .unwrap();
    let mut feed = capture.feed();
    let mut packets: Vec<Packet> = Vec::new();

    let err = encode_stream(&mut session, &mut feed, &mut packets).unwrap_err();
    assert!(
        matches!(err, EncoderError::Capture(ref msg) if msg.contains("unplugged")),
        "{err}"
    );
    assert_eq!(packets.len(), 3);
    assert!(matches!(capture.join(), Err(EncoderError::Capture(_))));
}

/// Counts frames through an `Rc`, so it can never leave its thread
struct ThreadBoundFeed {
    counter: Rc<Cell<u8>>,
}

impl CaptureFeed for ThreadBoundFeed {
    fn read_frame(&mut self, frame: &mut [u8]) -> capenc::Result<bool> {
        let n = self.counter.get();
        if n == 2 {
            return Ok(false);
        }
        self.counter.set(n + 1);
        frame.fill(n + 1);
        Ok(true)
    }
}

#[test]
fn test_source_opened_on_the_capture_thread() {
    let capture = CaptureThread::spawn_with(
        "test-capture",
        || {
            Ok(ThreadBoundFeed {
                counter: Rc::new(Cell::new(0)),
            })
        },
        16,
        1,
        OverflowPolicy::Block,
    )
    .unwrap();
    let mut feed = capture.feed();
    let mut frame = [0u8; 16];
    assert!(feed.read_frame(&mut frame).unwrap());
    assert_eq!(frame, [1u8; 16]);
    assert!(feed.read_frame(&mut frame).unwrap());
    assert_eq!(frame, [2u8; 16]);
    assert!(!feed.read_frame(&mut frame).unwrap());
    assert_eq!(capture.join().unwrap(), 2);
}

#[test]
fn test_source_that_fails_to_open() {
    let capture = CaptureThread::spawn_with(
        "test-capture",
        || -> capenc::Result<RawReader<Cursor<Vec<u8>>>> {
            Err(EncoderError::Capture("no such device".to_string()))
        },
        16,
        1,
        OverflowPolicy::Block,
    )
    .unwrap();
    let mut feed = capture.feed();
    let mut frame = [0u8; 16];
    assert!(matches!(feed.read_frame(&mut frame), Err(EncoderError::Capture(_))));
    assert!(!feed.read_frame(&mut frame).unwrap());
    assert!(capture.join().is_err());
}
