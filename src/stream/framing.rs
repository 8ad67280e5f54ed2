//! Multipart wire framing

use once_cell::sync::Lazy;
use std::io::{Cursor, Write};
use thiserror::Error;

/// Boundary token separating stream parts
pub const BOUNDARY: &str = "123456789000000000000987654321";

/// Content type announced before the first part
pub static STREAM_CONTENT_TYPE: Lazy<String> =
    Lazy::new(|| format!("multipart/x-mixed-replace; boundary={BOUNDARY}"));

/// Marker written ahead of every part
pub static STREAM_BOUNDARY: Lazy<String> = Lazy::new(|| format!("\r\n--{BOUNDARY}\r\n"));

/// Rendered part header did not fit its fixed-size buffer
#[derive(Error, Debug)]
#[error("part header for a {payload_len}-byte payload overflows the header buffer")]
pub struct HeaderOverflow {
    pub payload_len: usize,
}

/// Renders the per-part header into `buf`, returning the rendered
/// length.
///
/// The buffer is fixed-size on purpose: a header that does not fit is
/// a framing bug and comes back as an error instead of a silently
/// truncated Content-Length.
pub fn render_part_header(buf: &mut [u8], payload_len: usize) -> Result<usize, HeaderOverflow> {
    let mut cursor = Cursor::new(buf);
    write!(
        cursor,
        "Content-Type: image/jpeg\r\nContent-Length: {payload_len}\r\n\r\n"
    )
    .map_err(|_| HeaderOverflow { payload_len })?;
    Ok(cursor.position() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_embeds_boundary() {
        assert_eq!(
            STREAM_CONTENT_TYPE.as_str(),
            "multipart/x-mixed-replace; boundary=123456789000000000000987654321"
        );
    }

    #[test]
    fn test_boundary_marker_bytes() {
        assert_eq!(
            STREAM_BOUNDARY.as_bytes(),
            b"\r\n--123456789000000000000987654321\r\n"
        );
    }

    #[test]
    fn test_header_renders_exact_bytes() {
        let mut buf = [0u8; 64];
        let n = render_part_header(&mut buf, 1500).unwrap();
        assert_eq!(
            &buf[..n],
            b"Content-Type: image/jpeg\r\nContent-Length: 1500\r\n\r\n"
        );
    }

    #[test]
    fn test_header_length_tracks_digits() {
        let mut buf = [0u8; 64];
        let short = render_part_header(&mut buf, 1).unwrap();
        let long = render_part_header(&mut buf, 123_456).unwrap();
        assert_eq!(long, short + 5);
    }

    #[test]
    fn test_overflow_is_reported_not_truncated() {
        let mut buf = [0u8; 16];
        let err = render_part_header(&mut buf, 1500).unwrap_err();
        assert_eq!(err.payload_len, 1500);
    }

    #[test]
    fn test_exact_fit_succeeds() {
        // 47 bytes of template plus one digit.
        let mut buf = [0u8; 47];
        let n = render_part_header(&mut buf, 7).unwrap();
        assert_eq!(n, 47);
        assert!(render_part_header(&mut [0u8; 46], 7).is_err());
    }
}
