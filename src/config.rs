//! Configuration management for the MJPEG streamer

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::capture::PixelFormat;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete streamer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub wifi: WifiConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// TCP port to listen on (0 = ephemeral, handy for tests)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_ip: default_bind_ip(),
        }
    }
}

/// Capture backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic gradient frames, no hardware required
    #[default]
    Pattern,
    /// GStreamer camera pipeline (requires the `gst` feature)
    Gst,
}

/// Frame source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraConfig {
    /// Which capture backend produces frames
    #[serde(default)]
    pub source: SourceKind,

    /// Camera device path for the gst backend (empty = platform default)
    #[serde(default)]
    pub device: String,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Frames per second requested from the capture pipeline
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Pixel format the source produces; anything but "jpeg" goes through
    /// the software transform on every frame
    #[serde(default = "default_format")]
    pub format: PixelFormat,

    /// JPEG quality for the transform path (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Frame buffer slots; the capture contract requires exactly one
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Pattern,
            device: String::new(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            format: default_format(),
            quality: default_quality(),
            buffer_count: default_buffer_count(),
        }
    }
}

/// Stream session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StreamConfig {
    /// Frames discarded at the start of every session while the
    /// capture pipeline settles
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,

    /// Fixed buffer size for the rendered per-part header
    #[serde(default = "default_header_buf_bytes")]
    pub header_buf_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            warmup_frames: default_warmup_frames(),
            header_buf_bytes: default_header_buf_bytes(),
        }
    }
}

/// Wireless link supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WifiConfig {
    /// Bring the wireless link up before serving
    #[serde(default)]
    pub enabled: bool,

    /// Network name
    #[serde(default)]
    pub ssid: String,

    /// Network passphrase
    #[serde(default)]
    pub passphrase: String,

    /// Wireless interface name (empty = let the driver pick)
    #[serde(default)]
    pub interface: String,

    /// Reconnect attempts before the link is declared failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bound on the bootstrap wait in seconds; absent = wait indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_secs: Option<u64>,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ssid: String::new(),
            passphrase: String::new(),
            interface: String::new(),
            max_retries: default_max_retries(),
            wait_timeout_secs: None,
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    80
}
fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_width() -> u32 {
    320
}
fn default_height() -> u32 {
    240
}
fn default_fps() -> u32 {
    15
}
fn default_format() -> PixelFormat {
    PixelFormat::Jpeg
}
fn default_quality() -> u8 {
    40
}
fn default_buffer_count() -> u32 {
    1
}
fn default_warmup_frames() -> u32 {
    3
}
fn default_header_buf_bytes() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;

        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid(
                "camera: width and height must be > 0".to_string(),
            ));
        }

        if cam.width % 8 != 0 || cam.height % 8 != 0 {
            return Err(ConfigError::Invalid(format!(
                "camera: width and height must be multiples of 8, got {}x{}",
                cam.width, cam.height
            )));
        }

        if cam.width > 4096 || cam.height > 4096 {
            return Err(ConfigError::Invalid(format!(
                "camera: maximum supported dimensions are 4096x4096, got {}x{}",
                cam.width, cam.height
            )));
        }

        if cam.fps == 0 || cam.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "camera: fps must be between 1 and 120, got {}",
                cam.fps
            )));
        }

        if cam.quality == 0 || cam.quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "camera: quality must be between 1 and 100, got {}",
                cam.quality
            )));
        }

        // The capture contract exposes exactly one in-flight buffer; more
        // slots would silently break the single-handle ownership model.
        if cam.buffer_count != 1 {
            return Err(ConfigError::Invalid(format!(
                "camera: buffer-count must be 1, got {}",
                cam.buffer_count
            )));
        }

        // 48 bytes is the smallest buffer the part header template fits in.
        let hdr = self.stream.header_buf_bytes;
        if hdr < 48 || hdr > 1024 {
            return Err(ConfigError::Invalid(format!(
                "stream: header-buf-bytes must be between 48 and 1024, got {}",
                hdr
            )));
        }

        if self.wifi.enabled && self.wifi.ssid.is_empty() {
            return Err(ConfigError::Invalid(
                "wifi: ssid must be set when wifi is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Saves configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 80);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.format, PixelFormat::Jpeg);
        assert_eq!(config.stream.warmup_frames, 3);
        assert_eq!(config.stream.header_buf_bytes, 64);
        assert_eq!(config.wifi.max_retries, 5);
        assert!(config.wifi.wait_timeout_secs.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[server]
port = 8080
bind-ip = "127.0.0.1"

[camera]
source = "pattern"
width = 640
height = 480
fps = 30
format = "rgb565"
quality = 80

[stream]
warmup-frames = 5
header-buf-bytes = 128

[wifi]
enabled = true
ssid = "lab-net"
passphrase = "hunter2"
max-retries = 8
wait-timeout-secs = 30
        "#;

        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_ip, "127.0.0.1");
        assert_eq!(config.camera.source, SourceKind::Pattern);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.format, PixelFormat::Rgb565);
        assert_eq!(config.camera.quality, 80);
        assert_eq!(config.stream.warmup_frames, 5);
        assert_eq!(config.stream.header_buf_bytes, 128);
        assert!(config.wifi.enabled);
        assert_eq!(config.wifi.ssid, "lab-net");
        assert_eq!(config.wifi.max_retries, 8);
        assert_eq!(config.wifi.wait_timeout_secs, Some(30));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.server.port, 80);
        assert_eq!(config.camera.buffer_count, 1);
        assert!(!config.wifi.enabled);
    }

    #[test]
    fn test_invalid_quality() {
        let toml = r#"
[camera]
quality = 0
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let toml = r#"
[camera]
width = 8192
height = 240
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_buffer_count_must_be_one() {
        let toml = r#"
[camera]
buffer-count = 2
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_header_buf_too_small() {
        let toml = r#"
[stream]
header-buf-bytes = 16
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_wifi_requires_ssid() {
        let toml = r#"
[wifi]
enabled = true
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.camera.width, config.camera.width);
        assert_eq!(loaded.stream.header_buf_bytes, config.stream.header_buf_bytes);
        assert_eq!(loaded.wifi.max_retries, config.wifi.max_retries);
    }
}
