//! GStreamer camera backend

use std::marker::PhantomData;
use std::time::Instant;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info};

use super::{CaptureConfig, CaptureError, Frame, FrameSource, PixelFormat};

/// How long one acquire waits on the pipeline before giving up
const ACQUIRE_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(2);

/// Host platform, as far as pipeline construction cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    MacOs,
    RaspberryPi,
    Linux,
}

fn detect_platform() -> Platform {
    match std::env::consts::OS {
        "macos" => Platform::MacOs,
        "linux" if is_raspberry_pi() => Platform::RaspberryPi,
        _ => Platform::Linux,
    }
}

fn is_raspberry_pi() -> bool {
    std::fs::read_to_string("/proc/device-tree/model")
        .map(|model| model.contains("Raspberry Pi"))
        .unwrap_or(false)
}

/// Camera-backed frame source pulling wire-ready JPEG frames from a
/// GStreamer appsink.
///
/// The appsink is capped at one queued buffer with drop enabled, so
/// the pipeline keeps only the newest frame instead of building a
/// backlog behind a slow client.
pub struct GstSource {
    pipeline: gst::Pipeline,
    app_sink: gst_app::AppSink,
}

impl GstSource {
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        if config.format != PixelFormat::Jpeg {
            return Err(CaptureError::Init(format!(
                "gst backend delivers jpeg only, camera.format is {:?}",
                config.format
            )));
        }

        gst::init()?;

        let desc = build_pipeline_string(config, detect_platform());
        debug!(pipeline = %desc, "Creating GStreamer pipeline");

        let pipeline = gst::parse::launch(&desc)?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| CaptureError::Pipeline("not a pipeline".to_string()))?;

        let app_sink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Pipeline("no appsink found".to_string()))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| CaptureError::Pipeline("not an appsink".to_string()))?;

        // One buffer slot, newest frame wins.
        app_sink.set_property("max-buffers", 1u32);
        app_sink.set_property("drop", true);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::StateChange(format!("{e:?}")))?;

        info!(
            resolution = %format!("{}x{}", config.width, config.height),
            fps = %config.fps,
            quality = %config.quality,
            "GStreamer capture started"
        );

        Ok(Self { pipeline, app_sink })
    }
}

impl FrameSource for GstSource {
    type Frame<'a> = GstFrame<'a> where Self: 'a;

    fn acquire(&mut self) -> Result<GstFrame<'_>, CaptureError> {
        let sample = self
            .app_sink
            .try_pull_sample(ACQUIRE_TIMEOUT)
            .ok_or(CaptureError::NoFrame)?;

        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| CaptureError::Pipeline("sample without buffer".to_string()))?;

        let mapped = buffer
            .into_mapped_buffer_readable()
            .map_err(|_| CaptureError::Pipeline("buffer not readable".to_string()))?;

        Ok(GstFrame {
            mapped,
            timestamp: Instant::now(),
            _slot: PhantomData,
        })
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Slot handle for [`GstSource`]; dropping it unmaps and returns the
/// pipeline buffer
pub struct GstFrame<'a> {
    mapped: gst::buffer::MappedBuffer<gst::buffer::Readable>,
    timestamp: Instant,
    // Ties the handle to the source borrow so the single-slot rule
    // holds for this backend too.
    _slot: PhantomData<&'a mut GstSource>,
}

impl Frame for GstFrame<'_> {
    fn payload(&self) -> &[u8] {
        self.mapped.as_slice()
    }

    fn format(&self) -> PixelFormat {
        PixelFormat::Jpeg
    }

    fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

fn build_pipeline_string(config: &CaptureConfig, platform: Platform) -> String {
    let source = match platform {
        Platform::MacOs => format!("avfvideosrc device-index={}", device_or(config, "0")),
        Platform::RaspberryPi => {
            if config.device.is_empty() {
                "libcamerasrc".to_string()
            } else {
                format!("libcamerasrc camera-name=\"{}\"", config.device)
            }
        }
        Platform::Linux => format!("v4l2src device={}", device_or(config, "/dev/video0")),
    };

    format!(
        "{source} ! video/x-raw,width={},height={},framerate={}/1 \
         ! videoconvert ! jpegenc quality={} ! appsink name=sink",
        config.width, config.height, config.fps, config.quality
    )
}

fn device_or<'a>(config: &'a CaptureConfig, fallback: &'a str) -> &'a str {
    if config.device.is_empty() {
        fallback
    } else {
        &config.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CaptureConfig {
        CaptureConfig {
            device: String::new(),
            width: 320,
            height: 240,
            fps: 15,
            format: PixelFormat::Jpeg,
            quality: 40,
        }
    }

    #[test]
    fn test_pi_pipeline_uses_libcamera() {
        let desc = build_pipeline_string(&config(), Platform::RaspberryPi);
        assert!(desc.starts_with("libcamerasrc"));
        assert!(desc.contains("width=320,height=240,framerate=15/1"));
        assert!(desc.contains("jpegenc quality=40"));
        assert!(desc.ends_with("appsink name=sink"));
    }

    #[test]
    fn test_linux_pipeline_defaults_device() {
        let desc = build_pipeline_string(&config(), Platform::Linux);
        assert!(desc.starts_with("v4l2src device=/dev/video0"));
    }

    #[test]
    fn test_explicit_device_is_kept() {
        let mut cfg = config();
        cfg.device = "/dev/video3".to_string();
        let desc = build_pipeline_string(&cfg, Platform::Linux);
        assert!(desc.starts_with("v4l2src device=/dev/video3"));
    }
}
