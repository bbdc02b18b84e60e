//! The extractor's status/size frame.
//!
//! A frame is one decimal line on the extractor's stdout. A non-negative
//! value announces the uncompressed size of the payload that follows; a
//! negative value is a failure status and nothing follows it.

use std::io::{self, Write};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Status reported when the archive or the entry does not exist.
pub const STATUS_ENTRY_NOT_FOUND: u32 = 2;

/// Longest accepted frame line, newline included.
const MAX_FRAME_LINE: u64 = 24;

/// Errors produced while decoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame line is not an integer: {0:?}")]
    Invalid(String),

    #[error("frame line is missing or unterminated")]
    Truncated,

    #[error("IO error reading frame: {0}")]
    Io(#[from] io::Error),
}

/// One decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Payload of this many bytes follows.
    Size(u64),
    /// Extraction failed with this status; no payload.
    Status(u32),
}

impl Frame {
    /// Render the frame line, newline included.
    pub fn encode(&self) -> String {
        match self {
            Frame::Size(size) => format!("{size}\n"),
            Frame::Status(code) => format!("-{code}\n"),
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.encode().as_bytes())?;
        out.flush()
    }

    /// Parse one frame line. The trailing newline is optional.
    pub fn parse_line(line: &str) -> Result<Frame, FrameError> {
        let trimmed = line.strip_suffix('\n').unwrap_or(line);
        let invalid = || FrameError::Invalid(trimmed.to_string());

        match trimmed.strip_prefix('-') {
            Some(code) => {
                let code: u32 = code.parse().map_err(|_| invalid())?;
                if code == 0 {
                    return Err(invalid());
                }
                Ok(Frame::Status(code))
            }
            None => {
                if trimmed.starts_with('+') {
                    return Err(invalid());
                }
                trimmed.parse().map(Frame::Size).map_err(|_| invalid())
            }
        }
    }

    /// Read exactly one frame line, leaving the payload unread in `reader`.
    pub async fn read_from<R>(reader: &mut R) -> Result<Frame, FrameError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::with_capacity(MAX_FRAME_LINE as usize);
        let mut limited = (&mut *reader).take(MAX_FRAME_LINE);
        limited.read_until(b'\n', &mut line).await?;

        if line.last() != Some(&b'\n') {
            return Err(FrameError::Truncated);
        }
        let line = String::from_utf8(line).map_err(|e| {
            FrameError::Invalid(String::from_utf8_lossy(e.as_bytes()).into_owned())
        })?;
        Frame::parse_line(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_boundary_values() {
        assert_eq!(Frame::Size(0).encode(), "0\n");
        assert_eq!(Frame::Size(17).encode(), "17\n");
        assert_eq!(Frame::Size(u64::MAX).encode(), "18446744073709551615\n");
        assert_eq!(Frame::Status(STATUS_ENTRY_NOT_FOUND).encode(), "-2\n");
    }

    #[test]
    fn parses_boundary_values() {
        assert_eq!(Frame::parse_line("0\n").unwrap(), Frame::Size(0));
        assert_eq!(Frame::parse_line("-2\n").unwrap(), Frame::Status(2));
        assert_eq!(
            Frame::parse_line("18446744073709551615").unwrap(),
            Frame::Size(u64::MAX)
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in ["", "-", "-0", "+5", "12a", " 3", "18446744073709551616", "-x"] {
            assert!(
                matches!(Frame::parse_line(line), Err(FrameError::Invalid(_))),
                "accepted {line:?}"
            );
        }
    }

    #[tokio::test]
    async fn read_leaves_payload_in_reader() {
        let mut input: &[u8] = b"5\nhello";
        let frame = Frame::read_from(&mut input).await.unwrap();
        assert_eq!(frame, Frame::Size(5));
        assert_eq!(input, b"hello");
    }

    #[tokio::test]
    async fn read_status_frame() {
        let mut input: &[u8] = b"-2\n";
        assert_eq!(Frame::read_from(&mut input).await.unwrap(), Frame::Status(2));
        assert!(input.is_empty());
    }

    #[tokio::test]
    async fn read_requires_terminated_line() {
        let mut empty: &[u8] = b"";
        assert!(matches!(
            Frame::read_from(&mut empty).await,
            Err(FrameError::Truncated)
        ));

        let mut endless: &[u8] = b"1234567890123456789012345678901234567890";
        assert!(matches!(
            Frame::read_from(&mut endless).await,
            Err(FrameError::Truncated)
        ));
    }
}
