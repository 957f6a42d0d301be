//! # Line Framer
//!
//! Reassembles an arbitrary byte stream into newline-delimited lines.
//!
//! Reads from the transport can split a line anywhere, so the framer keeps the
//! unterminated tail of each chunk and prepends it to the next one. The tail is
//! capped at `max_line_bytes`: when a device never sends a terminator the buffered
//! bytes are dropped, reported as [`Frame::Overflow`], and everything up to the
//! next terminator is skipped so the stream resynchronises on a line boundary.
//!
//! ## Usage
//!
//! ```
//! use sensor_datalogger::protocol::framer::{Frame, LineFramer};
//!
//! let mut framer = LineFramer::new(4096);
//! assert!(framer.feed(b"10,1,2,3,4").is_empty());
//!
//! let frames = framer.feed(b"\n20,1,2,3,4\n");
//! assert_eq!(frames, vec![
//!     Frame::Line("10,1,2,3,4".to_string()),
//!     Frame::Line("20,1,2,3,4".to_string()),
//! ]);
//! ```

use bytes::BytesMut;
use tracing::warn;

/// Line terminator used by the device
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default maximum number of buffered bytes for one line
pub const DEFAULT_MAX_LINE_BYTES: usize = 4096;

/// Output of [`LineFramer::feed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line with the terminator stripped
    Line(String),
    /// An over-long line was discarded; carries the number of bytes dropped
    Overflow(usize),
}

/// Splits a byte stream on [`LINE_TERMINATOR`], buffering partial tails across calls.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_line_bytes: usize,
    /// Set after an overflow until the next terminator is seen.
    discarding: bool,
    /// Bytes dropped since the current over-long line started.
    discarded: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineFramer {
    /// Creates a framer that keeps at most `max_line_bytes` of an unterminated line.
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_line_bytes.min(DEFAULT_MAX_LINE_BYTES)),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
            discarded: 0,
        }
    }

    /// Feeds one chunk read from the transport.
    ///
    /// Returns every line completed by this chunk, in stream order. A chunk with
    /// no terminator returns nothing and only extends the buffered tail.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while !rest.is_empty() {
            let terminator = rest.iter().position(|&b| b == LINE_TERMINATOR);

            if self.discarding {
                match terminator {
                    Some(pos) => {
                        self.discarded += pos;
                        frames.push(Frame::Overflow(self.discarded));
                        self.discarding = false;
                        self.discarded = 0;
                        rest = &rest[pos + 1..];
                    }
                    None => {
                        self.discarded += rest.len();
                        rest = &[];
                    }
                }
                continue;
            }

            match terminator {
                Some(pos) => {
                    self.buffer.extend_from_slice(&rest[..pos]);
                    if self.buffer.len() > self.max_line_bytes {
                        let dropped = self.buffer.len();
                        self.buffer.clear();
                        warn!("Discarded over-long line ({} bytes)", dropped);
                        frames.push(Frame::Overflow(dropped));
                    } else {
                        let line = self.buffer.split();
                        frames.push(Frame::Line(String::from_utf8_lossy(&line).into_owned()));
                    }
                    rest = &rest[pos + 1..];
                }
                None => {
                    self.buffer.extend_from_slice(rest);
                    rest = &[];
                    if self.buffer.len() > self.max_line_bytes {
                        warn!(
                            "No line terminator within {} bytes, discarding until next line",
                            self.max_line_bytes
                        );
                        self.discarded = self.buffer.len();
                        self.buffer.clear();
                        self.discarding = true;
                    }
                }
            }
        }

        frames
    }

    /// Number of bytes held for the current unterminated line.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any buffered partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
        self.discarded = 0;
    }
}
