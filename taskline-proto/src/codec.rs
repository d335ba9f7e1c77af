//! Terminator-based framing for responses (and, on the peer side, requests).
//!
//! A frame is everything before the first [`TERMINATOR`] in the stream. The
//! [`FrameAccumulator`] is fed raw chunks as they arrive and yields the frame
//! once the terminator shows up. If the stream ends first, [`finish`]
//! returns whatever was gathered with [`Frame::terminated`] set to `false`,
//! leaving it to the caller to log the anomaly.
//!
//! [`finish`]: FrameAccumulator::finish

use crate::command::TERMINATOR;

/// A decoded frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Text before the first terminator (or all text, if none arrived).
    pub payload: String,
    /// `false` when the stream ended before a terminator was seen.
    pub terminated: bool,
}

/// Incremental frame decoder over a byte stream.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
}

impl FrameAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes buffered so far.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends a chunk and returns the frame if the terminator is now present.
    ///
    /// Bytes after the terminator are ignored; the protocol carries one frame
    /// per connection.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Frame> {
        // Only the tail of the old buffer can start a terminator that
        // completes in this chunk.
        let start = self.buf.len().saturating_sub(TERMINATOR.len() - 1);
        self.buf.extend_from_slice(chunk);
        let end = find(&self.buf[start..], TERMINATOR.as_bytes())? + start;
        Some(Frame {
            payload: String::from_utf8_lossy(&self.buf[..end]).into_owned(),
            terminated: true,
        })
    }

    /// Consumes the accumulator at end of stream.
    ///
    /// Returns the full buffered text, unterminated.
    #[must_use]
    pub fn finish(self) -> Frame {
        Frame {
            payload: String::from_utf8_lossy(&self.buf).into_owned(),
            terminated: false,
        }
    }
}

/// Decodes a complete response text in one go.
#[must_use]
pub fn decode(text: &str) -> Frame {
    text.find(TERMINATOR).map_or_else(
        || Frame {
            payload: text.to_string(),
            terminated: false,
        },
        |end| Frame {
            payload: text[..end].to_string(),
            terminated: true,
        },
    )
}

/// Appends the terminator to a response payload.
#[must_use]
pub fn frame(payload: &str) -> String {
    format!("{payload}{TERMINATOR}")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
