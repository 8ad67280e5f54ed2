//! Frame-to-wire-format conversion

use bytes::Bytes;
use jpeg_encoder::{ColorType, Encoder};
use thiserror::Error;

use crate::capture::{Frame, PixelFormat};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] jpeg_encoder::EncodingError),

    #[error("frame payload is {got} bytes, which is not {width}x{height} {format:?}")]
    Geometry {
        got: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

/// Wire-format image handed to the stream loop.
///
/// `Aliased` borrows the frame payload when it is already JPEG: the
/// bytes are never copied and there is nothing separate to free, and
/// the borrow keeps the image from outliving its frame. `Owned` is a
/// fresh allocation from the transform path with a lifetime of its
/// own, released independently of the frame it came from.
#[derive(Debug)]
pub enum EncodedImage<'a> {
    Aliased(&'a [u8]),
    Owned(Bytes),
}

impl EncodedImage<'_> {
    pub fn payload(&self) -> &[u8] {
        match self {
            EncodedImage::Aliased(bytes) => bytes,
            EncodedImage::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }
}

/// Converts raw frames into JPEG, passing frames already in the wire
/// format through untouched.
#[derive(Debug, Clone)]
pub struct JpegEncoder {
    width: u32,
    height: u32,
    quality: u8,
}

impl JpegEncoder {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality,
        }
    }

    /// Brings one frame into the wire format.
    ///
    /// The frame stays untouched either way; the caller releases it as
    /// usual once the returned image has been written out.
    pub fn encode<'a, F>(&self, frame: &'a F) -> Result<EncodedImage<'a>, EncodeError>
    where
        F: Frame + ?Sized,
    {
        let payload = frame.payload();

        match frame.format() {
            PixelFormat::Jpeg => Ok(EncodedImage::Aliased(payload)),
            PixelFormat::Rgb565 => {
                self.check_geometry(payload, 2, PixelFormat::Rgb565)?;
                self.compress(&rgb565_to_rgb(payload), ColorType::Rgb)
            }
            PixelFormat::Yuyv => {
                self.check_geometry(payload, 2, PixelFormat::Yuyv)?;
                self.compress(&yuyv_to_rgb(payload), ColorType::Rgb)
            }
            PixelFormat::Gray => {
                self.check_geometry(payload, 1, PixelFormat::Gray)?;
                self.compress(payload, ColorType::Luma)
            }
        }
    }

    fn check_geometry(
        &self,
        payload: &[u8],
        bytes_per_px: usize,
        format: PixelFormat,
    ) -> Result<(), EncodeError> {
        let want = self.width as usize * self.height as usize * bytes_per_px;
        if payload.len() != want {
            return Err(EncodeError::Geometry {
                got: payload.len(),
                width: self.width,
                height: self.height,
                format,
            });
        }
        Ok(())
    }

    fn compress(
        &self,
        pixels: &[u8],
        color: ColorType,
    ) -> Result<EncodedImage<'static>, EncodeError> {
        let mut out = Vec::new();
        let encoder = Encoder::new(&mut out, self.quality);
        encoder.encode(pixels, self.width as u16, self.height as u16, color)?;
        Ok(EncodedImage::Owned(Bytes::from(out)))
    }
}

/// Expands big-endian RGB565 words into 8-bit RGB triplets
fn rgb565_to_rgb(payload: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(payload.len() / 2 * 3);
    for px in payload.chunks_exact(2) {
        let word = u16::from_be_bytes([px[0], px[1]]);
        let r = ((word >> 11) & 0x1f) as u8;
        let g = ((word >> 5) & 0x3f) as u8;
        let b = (word & 0x1f) as u8;
        // Stretch 5/6-bit channels to full 8-bit range.
        rgb.push((r << 3) | (r >> 2));
        rgb.push((g << 2) | (g >> 4));
        rgb.push((b << 3) | (b >> 2));
    }
    rgb
}

/// Expands packed YUYV (4:2:2) into 8-bit RGB triplets, BT.601
fn yuyv_to_rgb(payload: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(payload.len() / 2 * 3);
    for quad in payload.chunks_exact(4) {
        push_yuv_px(&mut rgb, quad[0], quad[1], quad[3]);
        push_yuv_px(&mut rgb, quad[2], quad[1], quad[3]);
    }
    rgb
}

fn push_yuv_px(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = y + ((351 * v) >> 8);
    let g = y - ((179 * v + 86 * u) >> 8);
    let b = y + ((443 * u) >> 8);
    out.push(r.clamp(0, 255) as u8);
    out.push(g.clamp(0, 255) as u8);
    out.push(b.clamp(0, 255) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct TestFrame {
        payload: Vec<u8>,
        format: PixelFormat,
        at: Instant,
    }

    impl TestFrame {
        fn new(payload: Vec<u8>, format: PixelFormat) -> Self {
            Self {
                payload,
                format,
                at: Instant::now(),
            }
        }
    }

    impl Frame for TestFrame {
        fn payload(&self) -> &[u8] {
            &self.payload
        }

        fn format(&self) -> PixelFormat {
            self.format
        }

        fn timestamp(&self) -> Instant {
            self.at
        }
    }

    #[test]
    fn test_jpeg_passthrough_aliases_payload() {
        let frame = TestFrame::new(vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9], PixelFormat::Jpeg);
        let encoder = JpegEncoder::new(320, 240, 40);

        let image = encoder.encode(&frame).unwrap();
        match image {
            EncodedImage::Aliased(bytes) => {
                assert_eq!(bytes.as_ptr(), frame.payload.as_ptr());
                assert_eq!(bytes.len(), 6);
            }
            EncodedImage::Owned(_) => panic!("passthrough must not allocate"),
        }
    }

    #[test]
    fn test_gray_transform_produces_owned_jpeg() {
        let frame = TestFrame::new(vec![0x80; 16 * 16], PixelFormat::Gray);
        let encoder = JpegEncoder::new(16, 16, 40);

        let image = encoder.encode(&frame).unwrap();
        match &image {
            EncodedImage::Owned(bytes) => {
                assert_eq!(&bytes[..2], &[0xFF, 0xD8], "missing SOI");
                assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9], "missing EOI");
            }
            EncodedImage::Aliased(_) => panic!("transform must allocate"),
        }
    }

    #[test]
    fn test_rgb565_transform_produces_owned_jpeg() {
        // Solid red: 0xF800 big-endian.
        let mut payload = Vec::with_capacity(16 * 16 * 2);
        for _ in 0..16 * 16 {
            payload.extend_from_slice(&[0xF8, 0x00]);
        }
        let frame = TestFrame::new(payload, PixelFormat::Rgb565);
        let encoder = JpegEncoder::new(16, 16, 90);

        let image = encoder.encode(&frame).unwrap();
        assert!(matches!(image, EncodedImage::Owned(_)));
        assert_eq!(&image.payload()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_geometry_mismatch_is_rejected() {
        let frame = TestFrame::new(vec![0u8; 100], PixelFormat::Rgb565);
        let encoder = JpegEncoder::new(320, 240, 40);

        let err = encoder.encode(&frame).unwrap_err();
        assert!(matches!(err, EncodeError::Geometry { got: 100, .. }));
    }

    #[test]
    fn test_rgb565_channel_expansion() {
        // Red, green, blue, white pixels in big-endian 565.
        let rgb = rgb565_to_rgb(&[0xF8, 0x00, 0x07, 0xE0, 0x00, 0x1F, 0xFF, 0xFF]);
        assert_eq!(rgb, vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_neutral_gray() {
        // Y=128 with centered chroma decodes to mid gray.
        let rgb = yuyv_to_rgb(&[128, 128, 128, 128]);
        assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
    }
}
