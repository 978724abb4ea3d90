// Configuration management for Lenscast
//
// Loaded once at startup and immutable afterwards. Every field has a serde default, so a
// partial (or empty) config.toml is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::encoding::ContainerFormat;

/// Error type for config validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid resolution '{0}', expected WIDTHxHEIGHT")]
    BadResolution(String),

    #[error("Resolution and fps must be non-zero")]
    ZeroFormat,

    #[error("Staging is enabled but staging_root is empty")]
    EmptyStagingRoot,

    #[error("Capture device and virtual device are both {0}")]
    DeviceLoop(String),

    #[error("preview_quality must be 1..=100, got {0}")]
    PreviewQuality(u8),

    #[error("preview_fps must be non-zero and preview_resolutions non-empty without zero sizes")]
    PreviewRate,
}

/// Frame size, written as `1280x720` in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::BadResolution(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(bad)?;
        Ok(Self {
            width: w.trim().parse().map_err(|_| bad())?,
            height: h.trim().parse().map_err(|_| bad())?,
        })
    }
}

impl TryFrom<String> for Resolution {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Resolution> for String {
    fn from(r: Resolution) -> String {
        r.to_string()
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Capture and output frame size
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,

    /// Target frame rate for capture, relay and recording
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Physical camera
    #[serde(default = "default_camera_device")]
    pub camera_device: String,

    /// Virtual camera the relay writes to and the encoder reads from
    #[serde(default = "default_virtual_device")]
    pub virtual_device: String,

    /// Encoder executable
    #[serde(default = "default_encoder_program")]
    pub encoder_program: String,

    /// Codec name passed to the encoder (`-c:v`)
    #[serde(default = "default_encoder_codec")]
    pub encoder_codec: String,

    /// Bitrate passed to the encoder (`-b:v`)
    #[serde(default = "default_encoder_bitrate")]
    pub encoder_bitrate: String,

    /// Recording container
    #[serde(default)]
    pub container: ContainerFormat,

    /// Record to local scratch first, then move to `output_root`
    /// (for slow or removable output drives)
    #[serde(default)]
    pub staging_enabled: bool,

    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,

    /// Root of the videos/ and pictures/ tree
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// JPEG quality for preview and pictures (1-100)
    #[serde(default = "default_preview_quality")]
    pub preview_quality: u8,

    #[serde(default = "default_fps")]
    pub preview_fps: u32,

    /// Sizes the preview can be stepped through at runtime; the first is used at startup
    #[serde(default = "default_preview_resolutions")]
    pub preview_resolutions: Vec<Resolution>,

    /// Consecutive read failures before the camera counts as lost
    #[serde(default = "default_max_failed_reads")]
    pub max_failed_reads: u32,

    /// Seconds between probes while waiting for a camera
    #[serde(default = "default_recovery_poll_secs")]
    pub recovery_poll_secs: u64,

    /// `/dev/video0..N` probed during recovery
    #[serde(default = "default_probe_device_count")]
    pub probe_device_count: u32,

    /// Seconds to wait for the encoder after SIGTERM before killing it
    #[serde(default = "default_encoder_stop_timeout_secs")]
    pub encoder_stop_timeout_secs: u64,

    /// Show resolution / disk / memory on the overlay at startup
    #[serde(default)]
    pub show_stats_overlay: bool,

    /// How long transient overlay messages stay up
    #[serde(default = "default_message_duration_secs")]
    pub message_duration_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            fps: default_fps(),
            camera_device: default_camera_device(),
            virtual_device: default_virtual_device(),
            encoder_program: default_encoder_program(),
            encoder_codec: default_encoder_codec(),
            encoder_bitrate: default_encoder_bitrate(),
            container: ContainerFormat::default(),
            staging_enabled: false,
            staging_root: default_staging_root(),
            output_root: default_output_root(),
            preview_quality: default_preview_quality(),
            preview_fps: default_fps(),
            preview_resolutions: default_preview_resolutions(),
            max_failed_reads: default_max_failed_reads(),
            recovery_poll_secs: default_recovery_poll_secs(),
            probe_device_count: default_probe_device_count(),
            encoder_stop_timeout_secs: default_encoder_stop_timeout_secs(),
            show_stats_overlay: false,
            message_duration_secs: default_message_duration_secs(),
        }
    }
}

impl Config {
    /// Load config from disk or return default
    pub fn load_or_default(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        log::warn!("Failed to parse config {}: {}", config_path.display(), e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read config file {}: {}", config_path.display(), e);
                }
            }
        } else {
            log::info!("No config at {}, using defaults", config_path.display());
        }

        Self::default()
    }

    /// Save config to disk
    pub fn save(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(config_path, contents)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution.width == 0 || self.resolution.height == 0 || self.fps == 0 {
            return Err(ConfigError::ZeroFormat);
        }
        if self.staging_enabled && self.staging_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStagingRoot);
        }
        if self.camera_device == self.virtual_device {
            return Err(ConfigError::DeviceLoop(self.camera_device.clone()));
        }
        if !(1..=100).contains(&self.preview_quality) {
            return Err(ConfigError::PreviewQuality(self.preview_quality));
        }
        let zero_preview = self
            .preview_resolutions
            .iter()
            .any(|r| r.width == 0 || r.height == 0);
        if self.preview_fps == 0 || self.preview_resolutions.is_empty() || zero_preview {
            return Err(ConfigError::PreviewRate);
        }
        Ok(())
    }

    /// Staging directory when staging is on
    pub fn staging_dir(&self) -> Option<PathBuf> {
        self.staging_enabled.then(|| self.staging_root.clone())
    }
}

/// Get the config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lenscast")
        .join("config.toml")
}

fn default_resolution() -> Resolution {
    Resolution::new(1280, 720)
}

fn default_fps() -> u32 {
    30
}

fn default_camera_device() -> String {
    "/dev/video0".to_string()
}

fn default_virtual_device() -> String {
    "/dev/video40".to_string()
}

fn default_encoder_program() -> String {
    "ffmpeg".to_string()
}

fn default_encoder_codec() -> String {
    "libx264".to_string()
}

fn default_encoder_bitrate() -> String {
    "2048k".to_string()
}

fn default_staging_root() -> PathBuf {
    std::env::temp_dir().join("lenscast")
}

/// Get the default output root for recordings and pictures
fn default_output_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lenscast")
}

fn default_preview_quality() -> u8 {
    25
}

fn default_preview_resolutions() -> Vec<Resolution> {
    vec![
        Resolution::new(640, 360),
        Resolution::new(960, 540),
        Resolution::new(1280, 720),
    ]
}

fn default_max_failed_reads() -> u32 {
    10
}

fn default_recovery_poll_secs() -> u64 {
    2
}

fn default_probe_device_count() -> u32 {
    10
}

fn default_encoder_stop_timeout_secs() -> u64 {
    10
}

fn default_message_duration_secs() -> u64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.resolution, Resolution::new(1280, 720));
        assert_eq!(config.fps, 30);
        assert_eq!(config.encoder_codec, "libx264");
        assert_eq!(config.preview_quality, 25);
        assert_eq!(config.max_failed_reads, 10);
        assert_eq!(config.container, ContainerFormat::Avi);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_some_fields() {
        let config: Config = toml::from_str(
            r#"
            resolution = "640x480"
            staging_enabled = true
            container = "mkv"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolution, Resolution::new(640, 480));
        assert!(config.staging_dir().is_some());
        assert_eq!(config.container, ContainerFormat::Mkv);
        assert_eq!(config.virtual_device, "/dev/video40");
        assert_eq!(config.preview_resolutions[0], Resolution::new(640, 360));
    }

    #[test]
    fn preview_resolutions_parse_from_strings() {
        let config: Config =
            toml::from_str(r#"preview_resolutions = ["320x180", "640x360"]"#).unwrap();
        assert_eq!(
            config.preview_resolutions,
            vec![Resolution::new(320, 180), Resolution::new(640, 360)]
        );
    }

    #[test]
    fn bad_resolution_fails_to_parse() {
        assert!(toml::from_str::<Config>("resolution = \"wide\"").is_err());
        assert!("1920X1080".parse::<Resolution>().is_ok());
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = Config::default();
        config.virtual_device = config.camera_device.clone();
        assert!(matches!(config.validate(), Err(ConfigError::DeviceLoop(_))));

        let mut config = Config::default();
        config.preview_quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::PreviewQuality(0))));

        let mut config = Config::default();
        config.preview_resolutions.clear();
        assert!(matches!(config.validate(), Err(ConfigError::PreviewRate)));

        let mut config = Config::default();
        config.staging_enabled = true;
        config.staging_root = PathBuf::new();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyStagingRoot)));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.fps = 15;
        config.save(&path).unwrap();

        let loaded = Config::load_or_default(&path);
        assert_eq!(loaded.fps, 15);
        assert_eq!(loaded.resolution, config.resolution);
    }

    #[test]
    fn unreadable_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fps = \"fast\"").unwrap();
        assert_eq!(Config::load_or_default(&path).fps, 30);
    }
}
