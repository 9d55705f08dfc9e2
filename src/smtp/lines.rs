//! Line framing for the inbound connection
//!
//! Lines are CRLF terminated on the wire, but a bare LF is accepted too.
//! Multi-line data blocks end with a lone `.` and have their leading dot
//! removed, the way RFC 5321 section 4.5.2 transparency expects. Block lines
//! stay raw bytes so 8-bit message content is relayed unchanged.

use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;

use std::io::{BufRead, Read, Write};

use tracing::trace;

/// Reads lines from a buffered stream
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one line as bytes with its terminator removed.
    ///
    /// At most `TEXT_LINE_MAX_LENGTH` bytes are buffered; a longer line is
    /// `LineTooLong`. A final unterminated line is returned as-is and the
    /// read after it reports `ConnectionClosed`.
    pub fn read_raw_line(&mut self) -> Result<Vec<u8>, SmtpError> {
        let max = SmtpLimits::TEXT_LINE_MAX_LENGTH;
        let mut line = Vec::new();
        if (&mut self.inner).take(max as u64).read_until(b'\n', &mut line)? == 0 {
            return Err(SmtpError::ConnectionClosed);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        } else if line.len() >= max {
            return Err(SmtpError::LineTooLong { max });
        }

        trace!(direction = "incoming", "{}", String::from_utf8_lossy(&line));
        Ok(line)
    }

    /// Read one command line.
    ///
    /// Invalid UTF-8 is replaced; command keywords are ASCII either way.
    pub fn read_line(&mut self) -> Result<String, SmtpError> {
        let line = self.read_raw_line()?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Read a dot-terminated block, excluding the terminator.
    ///
    /// Stream end before the terminator is an error and the partial block
    /// is discarded, as is a block larger than `MAX_DATA_SIZE`.
    pub fn read_dot_lines(&mut self) -> Result<Vec<Vec<u8>>, SmtpError> {
        let mut lines = Vec::new();
        let mut size = 0;
        loop {
            let mut line = self.read_raw_line()?;
            if line == b"." {
                return Ok(lines);
            }

            size += line.len() + 2; // +2 for CRLF
            if size > SmtpLimits::MAX_DATA_SIZE {
                return Err(SmtpError::TooMuchData {
                    max: SmtpLimits::MAX_DATA_SIZE,
                });
            }

            if line.first() == Some(&b'.') {
                line.remove(0);
            }
            lines.push(line);
        }
    }
}

/// Writes reply lines to a stream
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write a reply and flush it
    pub fn write_response(&mut self, response: &SmtpResponse) -> Result<(), SmtpError> {
        let mut formatted = response.format();
        if formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
            formatted = SmtpResponse::new(&response.code, "Response too long (truncated)").format();
        }

        trace!(direction = "outgoing", "{}", formatted.trim_end());
        self.inner.write_all(formatted.as_bytes())?;
        self.inner.flush()?;
        Ok(())
    }
}
