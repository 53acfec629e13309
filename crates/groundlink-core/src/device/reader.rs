//! Line framing over a byte stream
//!
//! Splits any `Read` into `\n`-terminated lines. Bytes that arrive without a
//! terminator stay buffered across read timeouts until the rest of the line
//! shows up.

use std::io::{self, Read};

use super::{DeviceError, LineSource, MAX_LINE_LEN};
use crate::frame::RawLine;

const READ_CHUNK: usize = 512;

/// Line-buffered reader over a byte stream with read timeouts
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    /// Wrap a byte stream
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Bytes received but not yet terminated by a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Read the next complete line
    ///
    /// Returns `Ok(None)` when the stream timed out before a full line was
    /// available. End of stream and other I/O errors end the session; a
    /// trailing unterminated line is still returned before the
    /// [`DeviceError::Disconnected`].
    pub fn next_line(&mut self) -> Result<Option<RawLine>, DeviceError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.eof {
                return Err(DeviceError::Disconnected);
            }

            match self.inner.read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DeviceError::Io(e)),
            }
        }
    }

    fn take_line(&mut self) -> Option<RawLine> {
        let end = match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            // Flush whatever is left: an over-long line, or the tail at EOF
            None if self.pending.len() >= MAX_LINE_LEN => MAX_LINE_LEN,
            None if self.eof && !self.pending.is_empty() => self.pending.len(),
            None => return None,
        };

        let bytes: Vec<u8> = self.pending.drain(..end).collect();
        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim_end_matches(['\n', '\r']);
        Some(RawLine::new(text))
    }
}

impl<R: Read + Send> LineSource for LineReader<R> {
    fn read_line(&mut self) -> Result<Option<RawLine>, DeviceError> {
        self.next_line()
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
