//! Synthetic frame source for hardware-free operation

use std::time::Instant;

use bytes::Bytes;
use jpeg_encoder::{ColorType, Encoder};
use tracing::info;

use super::{CaptureConfig, CaptureError, Frame, FrameSource, PixelFormat};

/// Number of distinct frames in the repeating pattern cycle
const PATTERN_CYCLE: usize = 8;

/// Deterministic software frame producer.
///
/// Pre-renders a short cycle of scrolling gradient frames at
/// construction time and hands them out round-robin, honoring the same
/// acquire/release contract as a real camera. With `format = "jpeg"`
/// the frames are already in the wire format; raw formats exercise the
/// software transform on every acquire.
pub struct PatternSource {
    frames: Vec<Bytes>,
    format: PixelFormat,
    cursor: usize,
}

impl PatternSource {
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let (w, h) = (config.width, config.height);

        let mut frames = Vec::with_capacity(PATTERN_CYCLE);
        for step in 0..PATTERN_CYCLE {
            let payload = match config.format {
                PixelFormat::Jpeg => {
                    let rgb = render_rgb(w, h, step);
                    encode_jpeg(&rgb, w, h, config.quality)?
                }
                PixelFormat::Rgb565 => render_rgb565(w, h, step),
                PixelFormat::Yuyv => render_yuyv(w, h, step),
                PixelFormat::Gray => render_gray(w, h, step),
            };
            frames.push(Bytes::from(payload));
        }

        info!(
            resolution = %format!("{}x{}", w, h),
            format = ?config.format,
            "Pattern source ready"
        );

        Ok(Self {
            frames,
            format: config.format,
            cursor: 0,
        })
    }
}

impl FrameSource for PatternSource {
    type Frame<'a> = PatternFrame<'a> where Self: 'a;

    fn acquire(&mut self) -> Result<PatternFrame<'_>, CaptureError> {
        let idx = self.cursor;
        self.cursor = (self.cursor + 1) % self.frames.len();

        Ok(PatternFrame {
            payload: &self.frames[idx],
            format: self.format,
            timestamp: Instant::now(),
        })
    }
}

/// Slot handle for [`PatternSource`]; dropping it recycles the slot
pub struct PatternFrame<'a> {
    payload: &'a [u8],
    format: PixelFormat,
    timestamp: Instant,
}

impl Frame for PatternFrame<'_> {
    fn payload(&self) -> &[u8] {
        self.payload
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

/// Renders one 8-bit RGB gradient frame, scrolled by `step`
fn render_rgb(width: u32, height: u32, step: usize) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let shift = step * w / PATTERN_CYCLE;

    let mut rgb = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let sx = (x + shift) % w;
            rgb.push((sx * 255 / w) as u8);
            rgb.push((y * 255 / h.max(1)) as u8);
            rgb.push(((sx + y) * 255 / (w + h)) as u8);
        }
    }
    rgb
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut out = Vec::new();
    let encoder = Encoder::new(&mut out, quality);
    encoder
        .encode(rgb, width as u16, height as u16, ColorType::Rgb)
        .map_err(|e| CaptureError::Init(format!("pattern prerender failed: {e}")))?;
    Ok(out)
}

/// Same gradient packed as big-endian RGB565 words
fn render_rgb565(width: u32, height: u32, step: usize) -> Vec<u8> {
    let rgb = render_rgb(width, height, step);
    let mut out = Vec::with_capacity(rgb.len() / 3 * 2);
    for px in rgb.chunks_exact(3) {
        let word = (((px[0] as u16) >> 3) << 11) | (((px[1] as u16) >> 2) << 5) | ((px[2] as u16) >> 3);
        out.extend_from_slice(&word.to_be_bytes());
    }
    out
}

/// Luma gradient with neutral chroma, packed as YUYV pairs
fn render_yuyv(width: u32, height: u32, step: usize) -> Vec<u8> {
    let gray = render_gray(width, height, step);
    let mut out = Vec::with_capacity(gray.len() * 2);
    for pair in gray.chunks_exact(2) {
        out.extend_from_slice(&[pair[0], 128, pair[1], 128]);
    }
    out
}

fn render_gray(width: u32, height: u32, step: usize) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let shift = step * w / PATTERN_CYCLE;

    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            out.push((((x + shift) % w) * 255 / w) as u8);
        }
    }
    out
}
