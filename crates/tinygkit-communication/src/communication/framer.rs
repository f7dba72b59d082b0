//! Newline framer for the inbound byte stream
//!
//! Raw chunks from the serial port are split on `\n` into lines. Bytes are
//! passed through verbatim; no control-character filtering happens here.
//! The accumulator is bounded: a line longer than the limit is discarded along
//! with everything up to the next newline, and framing resumes after it.

use tinygkit_core::ProtocolError;

/// Incremental line framer
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_line_length: usize,
    /// Set after an overflow until the next newline is seen
    discarding: bool,
    overflows: u64,
}

impl LineFramer {
    /// Create a framer that accepts lines of at most `max_line_length` bytes
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_line_length.min(4096)),
            max_line_length,
            discarding: false,
            overflows: 0,
        }
    }

    /// Feed a chunk, handing each complete non-empty line to `sink`
    pub fn feed<F>(&mut self, chunk: &[u8], mut sink: F)
    where
        F: FnMut(String),
    {
        for &byte in chunk {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                if !self.buf.is_empty() {
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    sink(line);
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.buf.len() >= self.max_line_length {
                let err = ProtocolError::LineOverflow {
                    limit: self.max_line_length,
                };
                tracing::warn!("{}; discarding until next newline", err);
                self.overflows += 1;
                self.buf.clear();
                self.discarding = true;
                continue;
            }

            self.buf.push(byte);
        }
    }

    /// Feed a chunk and collect the complete lines
    pub fn feed_collect(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        self.feed(chunk, |line| lines.push(line));
        lines
    }

    /// Drop any partial line (used when a session ends)
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Bytes of the current partial line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Number of lines rejected for length
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }
}
