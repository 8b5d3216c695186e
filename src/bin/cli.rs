use anyhow::{bail, Context, Result};
use capenc::adts::AdtsFrames;
use capenc::EncodeConfig;
use serde::Serialize;
use std::env;
use std::fs;
use std::path::PathBuf;

const USAGE: &str = "Usage: capenc-cli <command> [args]

Commands:
  info [--json]
  write-config [path]
  inspect <file.aac> [--json]
  encode-aac <input.pcm> <output.aac> [--config <path>]
  encode-h264 <input.yuv> <output.h264> [--config <path>] [--yuyv]
  record <output.aac> [--video <output.h264>] [--seconds <n>] [--config <path>]";

fn main() -> Result<()> {
    capenc::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "info" => cmd_info(&args),
        "write-config" => cmd_write_config(&args),
        "inspect" => cmd_inspect(&args),
        "encode-aac" => cmd_encode_aac(&args),
        "encode-h264" => cmd_encode_h264(&args),
        "record" => cmd_record(&args),
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

/// Positional arguments and flags after the command name
struct Args {
    positional: Vec<String>,
    config: Option<PathBuf>,
    video: Option<PathBuf>,
    seconds: Option<f64>,
    json: bool,
    yuyv: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        positional: Vec::new(),
        config: None,
        video: None,
        seconds: None,
        json: false,
        yuyv: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--video" => {
                i += 1;
                let path = args.get(i).context("--video needs a path")?;
                parsed.video = Some(PathBuf::from(path));
            }
            "--seconds" => {
                i += 1;
                let value = args.get(i).context("--seconds needs a value")?;
                parsed.seconds = Some(value.parse().context("invalid --seconds")?);
            }
            "--json" => parsed.json = true,
            "--yuyv" => parsed.yuyv = true,
            other => parsed.positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(parsed)
}

fn load_config(args: &Args) -> Result<EncodeConfig> {
    let path = args.config.clone().unwrap_or_else(EncodeConfig::default_path);
    Ok(EncodeConfig::load_from_file(path)?)
}

fn cmd_info(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;
    let info = capenc::get_info();
    if args.json {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!("{} {}", info.name, info.version);
        if info.backends.is_empty() {
            println!("backends: none (build with --features aac,h264)");
        } else {
            println!("backends: {}", info.backends.join(", "));
        }
        println!("sound card capture: {}", info.sound_card_capture);
        println!("camera capture: {}", info.camera_capture);
        #[cfg(feature = "camera")]
        match capenc::capture::list_cameras() {
            Ok(cameras) => {
                for camera in cameras {
                    println!("  camera {}: {}", camera.index, camera.name);
                }
            }
            Err(e) => println!("  cameras unavailable: {}", e),
        }
    }
    Ok(())
}

fn cmd_write_config(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;
    let path = args
        .positional
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(EncodeConfig::default_path);
    EncodeConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct FrameSummary {
    offset: usize,
    profile: String,
    sample_rate: u32,
    channel_config: u8,
    payload_len: usize,
    variable_rate: bool,
}

#[derive(Serialize)]
struct StreamSummary {
    frames: usize,
    payload_bytes: usize,
    duration_secs: f64,
    frame_list: Vec<FrameSummary>,
}

fn cmd_inspect(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;
    let Some(path) = args.positional.first() else {
        bail!("Usage: capenc-cli inspect <file.aac> [--json]");
    };
    let data = fs::read(path).with_context(|| format!("failed to read {}", path))?;

    let mut summary = StreamSummary {
        frames: 0,
        payload_bytes: 0,
        duration_secs: 0.0,
        frame_list: Vec::new(),
    };
    let mut offset = 0;
    for frame in AdtsFrames::new(&data) {
        let (info, payload) = frame.with_context(|| format!("bad ADTS frame at byte {}", offset))?;
        summary.frames += 1;
        summary.payload_bytes += payload.len();
        summary.duration_secs += 1024.0 * info.raw_data_blocks as f64 / info.sample_rate as f64;
        summary.frame_list.push(FrameSummary {
            offset,
            profile: info
                .profile()
                .map(|p| p.to_string())
                .unwrap_or_else(|| format!("object type {}", info.object_type)),
            sample_rate: info.sample_rate,
            channel_config: info.channel_config,
            payload_len: payload.len(),
            variable_rate: info.mode() == capenc::BitstreamMode::Variable,
        });
        offset += info.frame_len;
    }

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        for f in &summary.frame_list {
            println!(
                "@{:<8} {} {} Hz ch:{} payload:{}",
                f.offset, f.profile, f.sample_rate, f.channel_config, f.payload_len
            );
        }
        println!(
            "{} frames, {} payload bytes, {:.3} s",
            summary.frames, summary.payload_bytes, summary.duration_secs
        );
    }
    Ok(())
}

#[cfg(feature = "aac")]
fn cmd_encode_aac(args: &[String]) -> Result<()> {
    use capenc::capture::RawReader;
    use capenc::codec::aac::FdkAacCodec;
    use capenc::{encode_stream, AdtsFramer, AdtsWriter, EncoderSession};
    use std::fs::File;
    use std::io::{BufReader, BufWriter};

    let args = parse_args(args)?;
    let [input, output] = args.positional.as_slice() else {
        bail!("Usage: capenc-cli encode-aac <input.pcm> <output.aac> [--config <path>]");
    };
    let config = load_config(&args)?;

    let mut session = EncoderSession::open(FdkAacCodec::new(), config.audio.clone())?;
    let framer = AdtsFramer::for_config(session.config(), config.output.adts_mode)?;

    let reader = File::open(input).with_context(|| format!("failed to open {}", input))?;
    let mut feed = RawReader::new(BufReader::new(reader));
    let output = config.output_path(output);
    let writer = File::create(&output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut sink = AdtsWriter::new(BufWriter::new(writer), framer);

    let stats = encode_stream(&mut session, &mut feed, &mut sink)?;
    println!(
        "Encoded {} frames into {} ADTS frames ({} bytes) -> {}",
        stats.frames,
        stats.packets,
        stats.bytes,
        output.display()
    );
    Ok(())
}

#[cfg(not(feature = "aac"))]
fn cmd_encode_aac(_args: &[String]) -> Result<()> {
    bail!("capenc-cli was built without the `aac` feature")
}

#[cfg(feature = "h264")]
fn cmd_encode_h264(args: &[String]) -> Result<()> {
    use capenc::capture::{CaptureFeed, RawReader, Yuyv422Feed};
    use capenc::codec::h264::OpenH264Codec;
    use capenc::pipeline::{CaptureThread, OverflowPolicy};
    use capenc::{encode_stream, ElementaryStreamWriter, EncoderSession};
    use std::fs::File;
    use std::io::{BufReader, BufWriter};

    let args = parse_args(args)?;
    let [input, output] = args.positional.as_slice() else {
        bail!("Usage: capenc-cli encode-h264 <input.yuv> <output.h264> [--config <path>] [--yuyv]");
    };
    let config = load_config(&args)?;

    let mut session = EncoderSession::open(OpenH264Codec::new(), config.video.clone())?;

    let reader = RawReader::new(BufReader::new(
        File::open(input).with_context(|| format!("failed to open {}", input))?,
    ));
    let source: Box<dyn CaptureFeed + Send> = if args.yuyv {
        Box::new(Yuyv422Feed::new(reader, config.video.width, config.video.height))
    } else {
        Box::new(reader)
    };
    // Read ahead on a separate thread while the encoder works
    let reader_thread = CaptureThread::spawn(
        "capenc-reader",
        source,
        session.frame_len(),
        config.capture.queue_frames,
        OverflowPolicy::Block,
    )?;
    let mut feed = reader_thread.feed();

    let output = config.output_path(output);
    let writer = File::create(&output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut sink = ElementaryStreamWriter::new(BufWriter::new(writer));

    let stats = encode_stream(&mut session, &mut feed, &mut sink)?;
    reader_thread.join()?;
    println!(
        "Encoded {} frames into {} access units ({} bytes) -> {}",
        stats.frames,
        stats.packets,
        stats.bytes,
        output.display()
    );
    Ok(())
}

#[cfg(not(feature = "h264"))]
fn cmd_encode_h264(_args: &[String]) -> Result<()> {
    bail!("capenc-cli was built without the `h264` feature")
}

#[cfg(all(feature = "aac", feature = "capture"))]
fn cmd_record(args: &[String]) -> Result<()> {
    use capenc::capture::SoundCardFeed;
    use capenc::codec::aac::FdkAacCodec;
    use capenc::pipeline::CaptureThread;
    use capenc::{encode_stream, AdtsFramer, AdtsWriter, EncoderSession};
    use std::fs::File;
    use std::io::BufWriter;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    let args = parse_args(args)?;
    let Some(output) = args.positional.first() else {
        bail!("Usage: capenc-cli record <output.aac> [--video <output.h264>] [--seconds <n>] [--config <path>]");
    };
    let config = load_config(&args)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("failed to install Ctrl-C handler")?;
    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs_f64(s));

    // Camera and sound card each capture on their own thread
    let video = match &args.video {
        Some(path) => Some(spawn_video_recording(
            &config,
            config.output_path(path),
            Arc::clone(&interrupted),
            deadline,
        )?),
        None => None,
    };

    let mut session = EncoderSession::open(FdkAacCodec::new(), config.audio.clone())?;
    let framer = AdtsFramer::for_config(session.config(), config.output.adts_mode)?;

    let output = config.output_path(output);
    let writer = File::create(&output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut sink = AdtsWriter::new(BufWriter::new(writer), framer);

    let device = config.capture.audio_device.clone();
    let audio_config = session.config().clone();
    let sound_card = CaptureThread::spawn_with(
        "capenc-audio",
        move || {
            let mut feed = SoundCardFeed::open(Some(device.as_str()), &audio_config)?;
            feed.start()?;
            log::info!("recording audio from {}", feed.device_name());
            Ok(feed)
        },
        session.frame_len(),
        config.capture.queue_frames,
        config.capture.overflow,
    )?;
    println!("Recording (Ctrl-C to stop)");

    let mut feed = StopAt {
        inner: sound_card.feed(),
        interrupted: Arc::clone(&interrupted),
        deadline,
    };
    let audio = encode_stream(&mut session, &mut feed, &mut sink);
    if audio.is_err() {
        interrupted.store(true, Ordering::Relaxed);
    }
    drop(feed);
    sound_card.stop();
    let dropped = sound_card.dropped_frames();
    let captured = sound_card.join();

    let video = video
        .map(|handle| {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("video recording thread panicked"))?
        })
        .transpose();

    let stats = audio?;
    captured?;
    println!(
        "Recorded {} audio frames ({} dropped) into {} bytes -> {}",
        stats.frames,
        dropped,
        stats.bytes,
        output.display()
    );
    video?;
    Ok(())
}

#[cfg(all(feature = "aac", feature = "capture", feature = "h264", feature = "camera"))]
fn spawn_video_recording(
    config: &EncodeConfig,
    output: PathBuf,
    interrupted: std::sync::Arc<std::sync::atomic::AtomicBool>,
    deadline: Option<std::time::Instant>,
) -> Result<std::thread::JoinHandle<Result<capenc::StreamStats>>> {
    use capenc::capture::open_camera;
    use capenc::codec::h264::OpenH264Codec;
    use capenc::pipeline::CaptureThread;
    use capenc::{encode_stream, ElementaryStreamWriter, EncoderSession};
    use std::fs::File;
    use std::io::BufWriter;

    let video = config.video.clone();
    let camera_index = config.capture.camera_index;
    let queue_frames = config.capture.queue_frames;
    let overflow = config.capture.overflow;

    let handle = std::thread::Builder::new()
        .name("capenc-video".to_string())
        .spawn(move || -> Result<capenc::StreamStats> {
            let mut session = EncoderSession::open(OpenH264Codec::new(), video)?;
            let camera_config = session.config().clone();
            let camera = CaptureThread::spawn_with(
                "capenc-camera",
                move || open_camera(camera_index, &camera_config),
                session.frame_len(),
                queue_frames,
                overflow,
            )?;

            let writer = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            let mut sink = ElementaryStreamWriter::new(BufWriter::new(writer));
            let mut feed = StopAt {
                inner: camera.feed(),
                interrupted,
                deadline,
            };

            let stats = encode_stream(&mut session, &mut feed, &mut sink)?;
            drop(feed);
            camera.stop();
            let dropped = camera.dropped_frames();
            camera.join()?;
            println!(
                "Recorded {} video frames ({} dropped) into {} bytes -> {}",
                stats.frames,
                dropped,
                stats.bytes,
                output.display()
            );
            Ok(stats)
        })
        .context("failed to spawn video recording thread")?;
    Ok(handle)
}

#[cfg(all(
    feature = "aac",
    feature = "capture",
    not(all(feature = "h264", feature = "camera"))
))]
fn spawn_video_recording(
    _config: &EncodeConfig,
    _output: PathBuf,
    _interrupted: std::sync::Arc<std::sync::atomic::AtomicBool>,
    _deadline: Option<std::time::Instant>,
) -> Result<std::thread::JoinHandle<Result<capenc::StreamStats>>> {
    bail!("--video needs capenc-cli built with the `h264` and `camera` features")
}

/// Ends a feed on Ctrl-C or after a deadline
#[cfg(all(feature = "aac", feature = "capture"))]
struct StopAt<F> {
    inner: F,
    interrupted: std::sync::Arc<std::sync::atomic::AtomicBool>,
    deadline: Option<std::time::Instant>,
}

#[cfg(all(feature = "aac", feature = "capture"))]
impl<F: capenc::capture::CaptureFeed> capenc::capture::CaptureFeed for StopAt<F> {
    fn read_frame(&mut self, frame: &mut [u8]) -> capenc::Result<bool> {
        if self.interrupted.load(std::sync::atomic::Ordering::Relaxed)
            || self.deadline.is_some_and(|d| std::time::Instant::now() >= d)
        {
            return Ok(false);
        }
        self.inner.read_frame(frame)
    }
}

#[cfg(not(all(feature = "aac", feature = "capture")))]
fn cmd_record(_args: &[String]) -> Result<()> {
    bail!("capenc-cli was built without the `aac` and `capture` features")
}
