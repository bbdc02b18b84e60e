//! Locating one entry inside a zip archive and streaming it out framed.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::PathBuf;

use thiserror::Error;
use url::Url;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::archive::frame::{Frame, STATUS_ENTRY_NOT_FOUND};
use crate::archive::remote::HttpRangeReader;

/// Errors from a single extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("open {archive:?}: {reason}")]
    ArchiveUnavailable { archive: String, reason: String },

    #[error("find {entry:?} in {archive:?}: not found")]
    EntryNotFound { archive: String, entry: String },

    #[error("open {entry:?} in {archive:?}: {source}")]
    EntryUnreadable {
        archive: String,
        entry: String,
        #[source]
        source: ZipError,
    },

    #[error("write file size: {0}")]
    Frame(#[source] io::Error),

    #[error("write {entry:?} from {archive:?} to stdout: {source}")]
    Transfer {
        archive: String,
        entry: String,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    /// The archive or the entry is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExtractError::ArchiveUnavailable { .. } | ExtractError::EntryNotFound { .. }
        )
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_not_found() {
            STATUS_ENTRY_NOT_FOUND as i32
        } else {
            1
        }
    }
}

/// Where an archive lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    Local(PathBuf),
    Remote(Url),
}

impl ArchiveSource {
    /// `http://` and `https://` addresses are remote, anything else is a path.
    pub fn parse(archive: &str) -> Self {
        match Url::parse(archive) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => ArchiveSource::Remote(url),
            _ => ArchiveSource::Local(PathBuf::from(archive)),
        }
    }
}

/// Write the frame for `entry` in `archive` followed by its decompressed
/// bytes. Returns the number of payload bytes written.
///
/// When the archive cannot be opened or the entry is absent, the
/// not-found status frame is written before the error is returned.
pub fn cat_entry<W: Write>(archive: &str, entry: &str, out: &mut W) -> Result<u64, ExtractError> {
    let result = match ArchiveSource::parse(archive) {
        ArchiveSource::Local(path) => match File::open(&path) {
            Ok(file) => cat_from(BufReader::new(file), archive, entry, out),
            Err(e) => Err(unavailable(archive, e)),
        },
        ArchiveSource::Remote(url) => match HttpRangeReader::open(url) {
            Ok(reader) => cat_from(reader, archive, entry, out),
            Err(e) => Err(unavailable(archive, e)),
        },
    };

    if let Err(e) = &result {
        if e.is_not_found() {
            Frame::Status(STATUS_ENTRY_NOT_FOUND)
                .write_to(out)
                .map_err(ExtractError::Frame)?;
        }
    }
    result
}

fn unavailable(archive: &str, reason: impl std::fmt::Display) -> ExtractError {
    ExtractError::ArchiveUnavailable {
        archive: archive.to_string(),
        reason: reason.to_string(),
    }
}

fn cat_from<R, W>(reader: R, archive: &str, entry: &str, out: &mut W) -> Result<u64, ExtractError>
where
    R: Read + Seek,
    W: Write,
{
    let mut zip = ZipArchive::new(reader).map_err(|e| unavailable(archive, e))?;

    let index = find_entry(&mut zip, entry).ok_or_else(|| ExtractError::EntryNotFound {
        archive: archive.to_string(),
        entry: entry.to_string(),
    })?;

    let mut file = zip.by_index(index).map_err(|source| ExtractError::EntryUnreadable {
        archive: archive.to_string(),
        entry: entry.to_string(),
        source,
    })?;

    Frame::Size(file.size())
        .write_to(out)
        .map_err(ExtractError::Frame)?;

    let written = io::copy(&mut file, out).map_err(|source| ExtractError::Transfer {
        archive: archive.to_string(),
        entry: entry.to_string(),
        source,
    })?;
    out.flush().map_err(|source| ExtractError::Transfer {
        archive: archive.to_string(),
        entry: entry.to_string(),
        source,
    })?;

    Ok(written)
}

/// Exact-name scan of the central directory. First match wins.
fn find_entry<R: Read + Seek>(zip: &mut ZipArchive<R>, entry: &str) -> Option<usize> {
    (0..zip.len()).find(|&i| {
        zip.by_index_raw(i)
            .map(|file| file.name() == entry)
            .unwrap_or(false)
    })
}
