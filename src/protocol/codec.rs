//! ndjson line framing for the messaging process streams.
//!
//! Byte-level newline framing with a maximum line length, so a misbehaving
//! process cannot make the bridge buffer an unterminated line without bound.
//! The same codec frames the stderr diagnostic stream and the host's stdin.
//!
//! A bad line never surfaces as a decoder error: `FramedRead` stops yielding
//! after the first error, which would end the stream for every later line.
//! Oversized and non-UTF-8 lines are reported as [`Frame`] variants instead,
//! and decoding continues with the next line.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Maximum line length accepted on inbound streams: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete UTF-8 line, without its terminator.
    Line(String),
    /// A line that was not valid UTF-8, rendered lossily.
    Invalid(String),
    /// A line longer than the limit; its bytes were discarded.
    Oversized,
}

/// Newline-delimited framing for bridge streams.
///
/// Through a `FramedRead`, an oversized line yields one [`Frame::Oversized`]
/// once its terminator arrives (or at EOF) and a non-UTF-8 line yields
/// [`Frame::Invalid`]; the lines after either keep decoding normally.
/// Errors come only from the underlying reader.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    next_index: usize,
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec rejecting lines longer than `max_length` bytes.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    fn take_line(&mut self, src: &mut BytesMut, len: usize, terminated: bool) -> Frame {
        let raw = src.split_to(len);
        if terminated {
            src.advance(1);
        }
        self.next_index = 0;
        let bytes = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
        match std::str::from_utf8(bytes) {
            Ok(text) => Frame::Line(text.to_owned()),
            Err(_) => Frame::Invalid(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            if self.discarding {
                self.next_index = 0;
                return Ok(match newline {
                    Some(idx) => {
                        src.advance(idx + 1);
                        self.discarding = false;
                        Some(Frame::Oversized)
                    }
                    None => {
                        src.clear();
                        None
                    }
                });
            }

            match newline {
                Some(idx) if idx <= self.max_length => {
                    return Ok(Some(self.take_line(src, idx, true)));
                }
                Some(_) => self.discarding = true,
                None if src.len() > self.max_length => self.discarding = true,
                None => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(Some(Frame::Oversized));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let len = src.len();
        Ok(Some(self.take_line(src, len, false)))
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
