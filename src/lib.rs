//! Single-client MJPEG-over-HTTP streaming with supervised WiFi bring-up
//!
//! This library turns a single-slot frame source into a
//! `multipart/x-mixed-replace` HTTP stream:
//! - Borrow-checked acquire/release of the one in-flight frame buffer
//! - Zero-copy passthrough for frames already in the JPEG wire format
//! - A pure, bounded-retry state machine supervising the wireless link
//! - Blocking per-client session loop, throttled only by the client
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_httpd::capture::{CaptureConfig, PatternSource};
//! use mjpeg_httpd::config::Config;
//! use mjpeg_httpd::server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let camera = PatternSource::new(&CaptureConfig::from(&config.camera))?;
//!     server::run_server(&config, Box::new(camera)).await
//! }
//! ```

pub mod capture;
pub mod config;
pub mod encode;
pub mod server;
pub mod stream;
pub mod wifi;

// Re-exports for convenience
pub use capture::{CaptureConfig, CaptureError, Frame, FrameSource, PatternSource, PixelFormat};
pub use config::Config;
pub use encode::{EncodeError, EncodedImage, JpegEncoder};
pub use stream::{ChunkSink, SessionCamera, SessionConfig, SessionOutcome, StreamSession};
pub use wifi::{LinkError, LinkEvent, LinkOutcome, LinkState, WifiDriver, WifiManager};
