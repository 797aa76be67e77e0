//! Newline framing for the request byte stream.
//!
//! Each connection owns one [`LineFramer`]. Reads are fed in as they arrive;
//! the framer hands back every complete line and keeps the undelimited tail
//! for the next read. Emitted frames exclude the delimiter.

use thiserror::Error;

/// Byte separating frames on the wire.
pub const DELIMITER: u8 = b'\n';

/// Errors raised while reassembling frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A frame grew past the configured limit before its delimiter arrived.
    #[error("request too large: {size} bytes exceeds {limit} byte limit")]
    Oversized {
        /// Bytes buffered when the limit was crossed.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Accumulates stream chunks and yields complete newline-delimited frames.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    // Bytes at the front of `buffer` already known to contain no delimiter.
    scanned: usize,
    limit: Option<usize>,
}

impl LineFramer {
    /// Creates a framer without a size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a framer that rejects frames longer than `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self::with_optional_limit(Some(limit))
    }

    /// Creates a framer with an optional size limit.
    #[must_use]
    pub fn with_optional_limit(limit: Option<usize>) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    /// Appends a chunk and returns an iterator over the frames it completed.
    ///
    /// Frames are yielded lazily in arrival order. Anything after the last
    /// delimiter stays buffered. After an [`FrameError::Oversized`] item the
    /// buffer is discarded and the iterator ends.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.push(chunk);
        Frames { framer: self }
    }

    /// Appends a chunk without extracting frames.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extracts the next complete frame, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Oversized`] when the next frame, complete or not,
    /// is longer than the configured limit. The buffer is cleared.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let start = self.scanned;
        match self.buffer[start..].iter().position(|byte| *byte == DELIMITER) {
            Some(offset) => {
                let end = start + offset;
                self.scanned = 0;
                self.enforce_limit(end)?;
                let mut frame: Vec<u8> = self.buffer.drain(..=end).collect();
                frame.pop();
                Ok(Some(frame))
            }
            None => {
                self.scanned = self.buffer.len();
                self.enforce_limit(self.buffer.len())?;
                Ok(None)
            }
        }
    }

    /// Number of bytes waiting for a delimiter.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn enforce_limit(&mut self, size: usize) -> Result<(), FrameError> {
        match self.limit {
            Some(limit) if size > limit => {
                self.buffer.clear();
                self.scanned = 0;
                Err(FrameError::Oversized { size, limit })
            }
            _ => Ok(()),
        }
    }
}

/// Iterator over the frames completed by a [`LineFramer::feed`] call.
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Vec<u8>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_frame().transpose()
    }
}
