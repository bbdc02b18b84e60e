//! Random access to an archive served over HTTP.
//!
//! Zip readers seek to the end of the archive for the central directory and
//! then jump to a single entry. `HttpRangeReader` turns those seeks into
//! `Range` requests so only the touched windows are transferred.

use std::io::{self, Read, Seek, SeekFrom};

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use url::Url;

/// Bytes fetched per range request.
const WINDOW_SIZE: u64 = 256 * 1024;

/// Error opening a remote archive.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("archive not found at {0}")]
    NotFound(Url),

    #[error("archive at {0} did not report a content length")]
    UnknownLength(Url),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A `Read + Seek` view over a remote file.
pub struct HttpRangeReader {
    client: Client,
    url: Url,
    len: u64,
    pos: u64,
    window: Vec<u8>,
    window_start: u64,
}

impl HttpRangeReader {
    /// Learn the remote file's length from a one-byte ranged GET. Signed
    /// object URLs often allow nothing but GET, so no HEAD is sent.
    pub fn open(url: Url) -> Result<Self, RemoteError> {
        let client = Client::builder().build()?;
        let response = client.get(url.clone()).header(RANGE, "bytes=0-0").send()?;

        let len = match response.status() {
            StatusCode::NOT_FOUND => return Err(RemoteError::NotFound(url)),
            // Only an empty file cannot satisfy `bytes=0-0`.
            StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(complete_length),
            StatusCode::OK => response.content_length(),
            _ => {
                response.error_for_status()?;
                None
            }
        }
        .ok_or_else(|| RemoteError::UnknownLength(url.clone()))?;

        tracing::debug!(url = %url, len, "Opened remote archive");

        Ok(Self {
            client,
            url,
            len,
            pos: 0,
            window: Vec::new(),
            window_start: 0,
        })
    }

    /// Total length of the remote file.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn window_contains(&self, pos: u64) -> bool {
        pos >= self.window_start && pos < self.window_start + self.window.len() as u64
    }

    fn fill_window(&mut self, start: u64) -> io::Result<()> {
        let end = (start + WINDOW_SIZE).min(self.len) - 1;
        let response = self
            .client
            .get(self.url.clone())
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .map_err(io::Error::other)?;

        let status = response.status();
        let whole_body = status == StatusCode::OK && start == 0;
        if status != StatusCode::PARTIAL_CONTENT && !whole_body {
            return Err(io::Error::other(format!(
                "range request for bytes {start}-{end} returned {status}"
            )));
        }

        let bytes = response.bytes().map_err(io::Error::other)?;
        if bytes.is_empty() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        self.window = bytes.to_vec();
        self.window_start = start;
        Ok(())
    }
}

impl Read for HttpRangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        if !self.window_contains(self.pos) {
            self.fill_window(self.pos)?;
        }

        let offset = (self.pos - self.window_start) as usize;
        let n = buf.len().min(self.window.len() - offset);
        buf[..n].copy_from_slice(&self.window[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeReader {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        self.pos = target;
        Ok(target)
    }
}

/// The total in `bytes 0-0/1234` or `bytes */0`.
fn complete_length(content_range: &str) -> Option<u64> {
    let (_, total) = content_range.strip_prefix("bytes ")?.rsplit_once('/')?;
    total.parse().ok()
}
