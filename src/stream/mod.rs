//! Per-client streaming loop

mod framing;

pub use framing::{render_part_header, HeaderOverflow, BOUNDARY, STREAM_BOUNDARY, STREAM_CONTENT_TYPE};

use thiserror::Error;
use tracing::{debug, warn};

use crate::capture::{Frame, FrameSource};
use crate::config::StreamConfig;
use crate::encode::JpegEncoder;

/// Transport failure reported by a sink
#[derive(Error, Debug)]
#[error("sink: {0}")]
pub struct SinkError(pub String);

/// Receives the session's bytes in order.
///
/// Writes block until the transport has taken the bytes or is known to
/// be gone; that blocking is the only pacing the session has, so a
/// slow client directly throttles frame acquisition.
pub trait ChunkSink {
    /// Announces the response content type, once, before any part is
    /// written.
    fn set_content_type(&mut self, content_type: &str) -> Result<(), SinkError>;

    /// Hands one chunk to the transport.
    fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError>;
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The transport rejected a write; the viewer went away
    ClientDisconnected,
    /// The source stopped producing frames
    CaptureFailed,
    /// A frame could not be brought into the wire format
    EncodeFailed,
}

/// Session knobs, derived from the `[stream]` config section
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Frames discarded unconditionally at the start of the session
    pub warmup_frames: u32,
    /// Fixed size of the part header render buffer
    pub header_buf_bytes: usize,
}

impl From<&StreamConfig> for SessionConfig {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            warmup_frames: cfg.warmup_frames,
            header_buf_bytes: cfg.header_buf_bytes,
        }
    }
}

/// One client's streaming loop.
///
/// Pulls frames from the source, encodes them into the wire format and
/// writes boundary-framed parts to the sink until something breaks.
/// Every acquired frame is released exactly once on every exit path,
/// and an owned encoded image is freed independently of its frame;
/// both fall out of scope-based drop rather than manual bookkeeping.
pub struct StreamSession<'s, S: FrameSource> {
    source: &'s mut S,
    encoder: JpegEncoder,
    config: SessionConfig,
}

impl<'s, S: FrameSource> StreamSession<'s, S> {
    pub fn new(source: &'s mut S, encoder: JpegEncoder, config: SessionConfig) -> Self {
        Self {
            source,
            encoder,
            config,
        }
    }

    /// Runs the loop to its terminal outcome.
    pub fn run<W: ChunkSink + ?Sized>(self, sink: &mut W) -> SessionOutcome {
        if sink.set_content_type(&STREAM_CONTENT_TYPE).is_err() {
            return SessionOutcome::ClientDisconnected;
        }

        let mut header_buf = vec![0u8; self.config.header_buf_bytes];
        let mut warmup_left = self.config.warmup_frames;
        let mut frames_sent: u64 = 0;

        loop {
            let frame = match self.source.acquire() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "Frame acquisition failed, ending session");
                    return SessionOutcome::CaptureFailed;
                }
            };

            // The frame guard dies at the end of each arm below,
            // releasing the slot exactly once however the iteration
            // ends.

            if warmup_left > 0 {
                warmup_left -= 1;
                continue;
            }

            if frame.is_empty() {
                debug!("Zero-length frame skipped");
                continue;
            }

            let image = match self.encoder.encode(&frame) {
                Ok(image) => image,
                Err(err) => {
                    warn!(error = %err, "Frame encode failed, ending session");
                    return SessionOutcome::EncodeFailed;
                }
            };

            // Render before writing anything, so a header that cannot
            // be framed aborts the part without a byte on the wire.
            let header_len = match render_part_header(&mut header_buf, image.len()) {
                Ok(len) => len,
                Err(err) => {
                    warn!(error = %err, "Part header overflow, ending session");
                    return SessionOutcome::EncodeFailed;
                }
            };

            let wrote = sink
                .write(STREAM_BOUNDARY.as_bytes())
                .and_then(|()| sink.write(&header_buf[..header_len]))
                .and_then(|()| sink.write(image.payload()));

            let latency_ms = frame.timestamp().elapsed().as_millis() as u64;

            // Image before frame: the alias must not outlive what it
            // borrows.
            drop(image);
            drop(frame);

            if wrote.is_err() {
                debug!(frames = frames_sent, "Client disconnected");
                return SessionOutcome::ClientDisconnected;
            }

            frames_sent += 1;
            if frames_sent % 100 == 0 {
                debug!(frames = frames_sent, latency_ms, "Streaming");
            }
        }
    }
}

/// Object-safe entry point for running sessions over any frame source.
///
/// Keeps the serving layer free of the source's frame lifetime
/// parameter; holding a boxed camera is enough to start sessions.
pub trait SessionCamera: Send {
    fn stream_session(
        &mut self,
        encoder: JpegEncoder,
        config: SessionConfig,
        sink: &mut dyn ChunkSink,
    ) -> SessionOutcome;
}

impl<S> SessionCamera for S
where
    S: FrameSource + Send,
{
    fn stream_session(
        &mut self,
        encoder: JpegEncoder,
        config: SessionConfig,
        sink: &mut dyn ChunkSink,
    ) -> SessionOutcome {
        StreamSession::new(self, encoder, config).run(sink)
    }
}
