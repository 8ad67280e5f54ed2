//! Frame acquisition from a single-slot source

mod pattern;

#[cfg(feature = "gst")]
mod gst;

pub use pattern::PatternSource;

#[cfg(feature = "gst")]
pub use gst::GstSource;

use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use crate::config::CameraConfig;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame source failed to initialize: {0}")]
    Init(String),

    #[error("no frame available from the source")]
    NoFrame,

    #[cfg(feature = "gst")]
    #[error("GStreamer error: {0}")]
    Gst(#[from] gstreamer::glib::Error),

    #[cfg(feature = "gst")]
    #[error("GStreamer bool error: {0}")]
    GstBool(#[from] gstreamer::glib::BoolError),

    #[cfg(feature = "gst")]
    #[error("state change error: {0}")]
    StateChange(String),

    #[cfg(feature = "gst")]
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

/// Pixel format tag carried by every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Already in the wire format; streamed without re-encoding
    Jpeg,
    /// 16-bit RGB, big-endian words
    Rgb565,
    /// Packed 4:2:2 YUV (Y0 U Y1 V)
    Yuyv,
    /// 8-bit grayscale
    Gray,
}

/// Capture configuration, derived from the `[camera]` config section
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub quality: u8,
}

impl From<&CameraConfig> for CaptureConfig {
    fn from(cam: &CameraConfig) -> Self {
        Self {
            device: cam.device.clone(),
            width: cam.width,
            height: cam.height,
            fps: cam.fps,
            format: cam.format,
            quality: cam.quality,
        }
    }
}

/// A frame borrowed from a source's buffer slot.
///
/// The handle is the ownership token for the slot: dropping it is the
/// release, so acquire and release stay paired on every code path.
/// Payload bytes are valid for the lifetime of the handle.
pub trait Frame {
    /// Raw payload bytes
    fn payload(&self) -> &[u8];

    /// Pixel format of the payload
    fn format(&self) -> PixelFormat;

    /// Moment the frame was acquired
    fn timestamp(&self) -> Instant;

    /// Payload length in bytes
    fn len(&self) -> usize {
        self.payload().len()
    }

    fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }
}

/// A frame producer exposing exactly one reusable buffer slot.
///
/// `acquire` hands the slot out as a guard that borrows the source
/// mutably, so a second acquire while a frame is outstanding does not
/// compile. The borrow checker carries the single-handle rule; no
/// runtime locking is involved.
pub trait FrameSource {
    /// Frame handle tied to the source's buffer slot
    type Frame<'a>: Frame
    where
        Self: 'a;

    /// Borrows the next frame from the slot, blocking briefly on
    /// hardware readiness.
    fn acquire(&mut self) -> Result<Self::Frame<'_>, CaptureError>;
}
