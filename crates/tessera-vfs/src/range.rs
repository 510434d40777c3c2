use std::fmt;
use std::io;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::file::File;

/// A half-open `[from, to)` window over a file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    from: u64,
    to: u64,
}

impl ByteRange {
    pub fn new(from: u64, to: u64) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from_offset(&self) -> u64 {
        self.from
    }

    pub fn to_offset(&self) -> u64 {
        self.to
    }

    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Returns whether `[offset, offset + count)` overlaps this window.
    pub fn intersects(&self, offset: u64, count: u64) -> bool {
        offset < self.to && offset.saturating_add(count) > self.from
    }

    /// Parses `"<from><sep><to>"`, e.g. `"10;20"` or `"10:20"`.
    pub fn parse_with(input: &str, sep: char) -> Option<Self> {
        let (from, to) = input.split_once(sep)?;
        let from = from.trim().parse().ok()?;
        let to = to.trim().parse().ok()?;
        Self::new(from, to).ok()
    }

    /// Maps a window-relative `(pos, len)` onto absolute inner offsets, clamped to the window.
    fn clamp(&self, pos: u64, len: usize) -> (u64, usize) {
        let start = self.from.saturating_add(pos).min(self.to);
        let end = start.saturating_add(len as u64).min(self.to);
        (start, (end - start) as usize)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.from, self.to)
    }
}

impl FromStr for ByteRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with(s, ';').ok_or_else(|| Error::MalformedUri {
            uri: s.to_string(),
            reason: "expected `<from>;<to>`",
        })
    }
}

/// A [`File`] restricted and re-based to a [`ByteRange`] of an inner file.
///
/// All offsets are relative to the start of the range; reads and writes never touch inner bytes
/// at or beyond the end of the range. The inner handle is owned and dropped with the wrapper.
pub struct RangedFile {
    inner: Box<dyn File>,
    range: ByteRange,
}

impl RangedFile {
    pub fn new(inner: Box<dyn File>, range: ByteRange) -> Self {
        Self { inner, range }
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn into_inner(self) -> Box<dyn File> {
        self.inner
    }
}

impl fmt::Debug for RangedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangedFile")
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl File for RangedFile {
    fn read(&mut self, pos: u64, len: usize) -> io::Result<Vec<u8>> {
        let (start, len) = self.range.clamp(pos, len);
        if len == 0 {
            return Ok(Vec::new());
        }
        self.inner.read(start, len)
    }

    fn write(&mut self, pos: u64, data: &[u8]) -> io::Result<usize> {
        let (start, len) = self.range.clamp(pos, data.len());
        if len == 0 {
            return Ok(0);
        }
        self.inner.write(start, &data[..len])
    }

    fn len(&self) -> Option<u64> {
        Some(self.range.len())
    }
}
