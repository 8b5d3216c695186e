//! Configuration management for capenc
//!
//! Encoder and capture settings are read from and written to TOML. A
//! missing file means defaults.

use crate::adts::{sample_rate_index, BitstreamMode};
use crate::errors::EncoderError;
use crate::pipeline::OverflowPolicy;
use crate::stream::{AudioConfig, VideoConfig};
use crate::types::{ChannelLayout, Rational, SampleFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeConfig {
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub output: OutputConfig,
    pub capture: CaptureConfig,
}

/// How encoded streams are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// ADTS buffer fullness signalling
    pub adts_mode: BitstreamMode,
    /// Directory relative output paths are resolved against
    pub output_directory: String,
}

/// Live capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Input device name; "default" for the system default
    pub audio_device: String,
    /// Camera index for video recording
    #[serde(default)]
    pub camera_index: u32,
    /// Frames buffered between capture thread and encoder
    pub queue_frames: usize,
    /// What to do when the encoder falls behind
    pub overflow: OverflowPolicy,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::aac(44100, ChannelLayout::Stereo)
                .with_sample_format(SampleFormat::S16),
            video: VideoConfig::h264(1280, 720, Rational::new(10, 1)),
            output: OutputConfig {
                adts_mode: BitstreamMode::Fixed,
                output_directory: ".".to_string(),
            },
            capture: CaptureConfig {
                audio_device: "default".to_string(),
                camera_index: 0,
                queue_frames: 32,
                overflow: OverflowPolicy::Block,
            },
        }
    }
}

impl EncodeConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EncoderError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| EncoderError::Config(format!("Failed to read config file: {}", e)))?;

        let config: EncodeConfig = toml::from_str(&contents)
            .map_err(|e| EncoderError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(EncoderError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EncoderError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EncoderError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| EncoderError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EncoderError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("capenc.toml")
    }

    /// Load from default location, falling back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Resolve `path` against the configured output directory
    pub fn output_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.output.output_directory).join(path)
        }
    }

    /// Validate configuration values.
    ///
    /// Codec support is left to negotiation; this only rejects values no
    /// codec could accept.
    pub fn validate(&self) -> Result<(), String> {
        let audio = &self.audio;
        if audio.bit_rate == 0 {
            return Err("Audio bit rate must be positive".to_string());
        }
        if sample_rate_index(audio.sample_rate).is_none() {
            return Err(format!(
                "Audio sample rate {} has no ADTS sampling frequency index",
                audio.sample_rate
            ));
        }
        if audio.frame_samples == 0 {
            return Err("Audio frame size must be positive".to_string());
        }

        let video = &self.video;
        if video.width == 0 || video.height == 0 {
            return Err("Invalid video resolution".to_string());
        }
        if video.frame_rate.num <= 0 || video.frame_rate.den <= 0 {
            return Err("Video frame rate must be a positive fraction".to_string());
        }
        if video.bit_rate == 0 {
            return Err("Video bit rate must be positive".to_string());
        }

        if self.capture.queue_frames == 0 {
            return Err("Capture queue must hold at least one frame".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AacProfile;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EncodeConfig::default();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.sample_format, SampleFormat::S16);
        assert_eq!(config.video.frame_rate, Rational::new(10, 1));
        assert_eq!(config.output.adts_mode, BitstreamMode::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad_rate = EncodeConfig::default();
        bad_rate.audio.sample_rate = 44000;
        assert!(bad_rate.validate().is_err());

        let mut bad_video = EncodeConfig::default();
        bad_video.video.width = 0;
        assert!(bad_video.validate().is_err());

        let mut bad_fps = EncodeConfig::default();
        bad_fps.video.frame_rate = Rational::new(0, 1);
        assert!(bad_fps.validate().is_err());

        let mut bad_queue = EncodeConfig::default();
        bad_queue.capture.queue_frames = 0;
        assert!(bad_queue.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("capenc.toml");

        let mut config = EncodeConfig::default();
        config.audio.profile = AacProfile::Main;
        config.output.adts_mode = BitstreamMode::Variable;
        config.capture.overflow = OverflowPolicy::DropNewest;
        config.save_to_file(&path).unwrap();

        let loaded = EncodeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_camera_index_is_optional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("older.toml");
        let text = toml::to_string_pretty(&EncodeConfig::default())
            .unwrap()
            .lines()
            .filter(|line| !line.starts_with("camera_index"))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&path, text).unwrap();

        let loaded = EncodeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.capture.camera_index, 0);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = EncodeConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, EncodeConfig::default());
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[audio]\nsample_rate = \"fast\"\n").unwrap();
        let err = EncodeConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, EncoderError::Config(_)));
    }

    #[test]
    fn test_output_path_resolution() {
        let mut config = EncodeConfig::default();
        config.output.output_directory = "out".to_string();
        assert_eq!(config.output_path("a.aac"), PathBuf::from("out/a.aac"));
    }
}
